//! Lifecycle state-transition graph (STG) of a watch face engine.
//!
//! The transition table is fixed: user and system events move the watch face
//! between six states, and each transition names the engine or service
//! callbacks the framework invokes on the way. An [`Stg`] binds the table to
//! one engine class by resolving every callback to the method implementing it.

use crate::analysis::flow::FlowSummary;
use crate::analysis::{Analyzer, Lookup};
use crate::error::AnalysisResult;
use crate::framework_catalog::{
    self, ENGINE_ON_CREATE, ENGINE_ON_DESTROY, ON_AMBIENT_MODE_CHANGED, ON_DRAW, ON_VISIBILITY_CHANGED,
    SERVICE_ON_CREATE, SERVICE_ON_DESTROY,
};
use crate::program::{ClassId, MethodId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

// ============================================================================
// States, events, callbacks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Null,
    Interactive,
    Ambient,
    InvisibleAppList,
    InvisibleNotification,
    InvisiblePicker,
}

impl State {
    pub const ALL: [State; 6] = [
        State::Interactive,
        State::Null,
        State::Ambient,
        State::InvisiblePicker,
        State::InvisibleAppList,
        State::InvisibleNotification,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            State::Null => "Null",
            State::Interactive => "Interactive",
            State::Ambient => "Ambient",
            State::InvisibleAppList => "Invisible AppList",
            State::InvisibleNotification => "Invisible Notification",
            State::InvisiblePicker => "Invisible WFPicker",
        }
    }

    fn dot_id(self) -> String {
        format!("node_{}", self.as_str().replace(' ', "_"))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    PressSideButton,
    SwipeRight,
    SwipeLeft,
    SwipeUp,
    SwipeDown,
    TapScreenCenter,
    Standby,
    Select,
    Deselect,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::PressSideButton => "PRESS_SIDE_BUTTON",
            Event::SwipeRight => "SWIPE_RIGHT",
            Event::SwipeLeft => "SWIPE_LEFT",
            Event::SwipeUp => "SWIPE_UP",
            Event::SwipeDown => "SWIPE_DOWN",
            Event::TapScreenCenter => "TAP_SCREEN_CENTER",
            Event::Standby => "STANDBY",
            Event::Select => "SELECT",
            Event::Deselect => "DESELECT",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A framework callback, with the boolean argument it receives when it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Callback {
    ServiceOnCreate,
    ServiceOnCreateEngine,
    ServiceOnDestroy,
    OnCreate,
    OnDestroy,
    OnVisibilityChanged(bool),
    OnAmbientModeChanged(bool),
    OnDraw,
}

impl Callback {
    /// Value injected for the ambient/visibility state while analyzing it.
    pub fn hypothesis(self) -> Option<bool> {
        match self {
            Callback::OnVisibilityChanged(v) | Callback::OnAmbientModeChanged(v) => Some(v),
            _ => None,
        }
    }

    /// Whether a redraw follows the callback under the same hypothesis.
    pub fn redraws(self) -> bool {
        matches!(
            self,
            Callback::OnAmbientModeChanged(_) | Callback::OnVisibilityChanged(true)
        )
    }
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::ServiceOnCreate => f.write_str("WatchFaceService.onCreate()"),
            Callback::ServiceOnCreateEngine => f.write_str("WatchFaceService.onCreateEngine()"),
            Callback::ServiceOnDestroy => f.write_str("WatchFaceService.onDestroy()"),
            Callback::OnCreate => f.write_str("onCreate()"),
            Callback::OnDestroy => f.write_str("onDestroy()"),
            Callback::OnVisibilityChanged(v) => write!(f, "onVisibilityChanged({v})"),
            Callback::OnAmbientModeChanged(v) => write!(f, "onAmbientModeChanged({v})"),
            Callback::OnDraw => f.write_str("onDraw()"),
        }
    }
}

// ============================================================================
// Transition table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub source: State,
    pub event: Event,
    pub target: State,
    pub callbacks: &'static [Callback],
}

const fn t(source: State, event: Event, target: State, callbacks: &'static [Callback]) -> Transition {
    Transition {
        source,
        event,
        target,
        callbacks,
    }
}

use Callback::{OnAmbientModeChanged as Amb, OnVisibilityChanged as Vis};

pub static TRANSITIONS: [Transition; 17] = [
    t(State::Interactive, Event::Standby, State::Ambient, &[Amb(true)]),
    t(State::Interactive, Event::PressSideButton, State::InvisibleAppList, &[Vis(false)]),
    t(State::Interactive, Event::SwipeUp, State::InvisibleNotification, &[Vis(false)]),
    t(State::Interactive, Event::SwipeLeft, State::InvisiblePicker, &[Vis(false)]),
    t(State::Interactive, Event::SwipeRight, State::InvisiblePicker, &[Vis(false)]),
    t(State::Ambient, Event::PressSideButton, State::Interactive, &[Amb(false)]),
    t(State::Ambient, Event::TapScreenCenter, State::Interactive, &[Amb(false)]),
    t(State::InvisibleAppList, Event::SwipeRight, State::Interactive, &[Vis(true)]),
    t(State::InvisibleAppList, Event::PressSideButton, State::Interactive, &[Vis(true)]),
    t(State::InvisibleAppList, Event::Standby, State::Ambient, &[Amb(true), Vis(true)]),
    t(State::InvisibleNotification, Event::SwipeDown, State::Interactive, &[Vis(true)]),
    t(State::InvisibleNotification, Event::PressSideButton, State::Interactive, &[Vis(true)]),
    t(State::InvisibleNotification, Event::Standby, State::Ambient, &[Amb(true), Vis(true)]),
    t(State::InvisiblePicker, Event::PressSideButton, State::Interactive, &[Vis(true)]),
    t(State::InvisiblePicker, Event::Standby, State::Interactive, &[Vis(true)]),
    t(
        State::InvisiblePicker,
        Event::Deselect,
        State::Null,
        &[Callback::OnDestroy, Callback::ServiceOnDestroy],
    ),
    t(
        State::Null,
        Event::Select,
        State::Interactive,
        &[
            Callback::ServiceOnCreate,
            Callback::ServiceOnCreateEngine,
            Callback::OnCreate,
            Vis(true),
        ],
    ),
];

pub fn transitions_from(state: State) -> impl Iterator<Item = &'static Transition> {
    TRANSITIONS.iter().filter(move |t| t.source == state)
}

/// Visit every transition path of length `1..=max_len` starting at `start`,
/// prefixes included. States may repeat within a path.
pub fn forward_traversal(start: State, max_len: usize, mut visitor: impl FnMut(&[&'static Transition])) {
    let mut path = Vec::with_capacity(max_len);
    for first in transitions_from(start) {
        path.push(first);
        extend(&mut path, max_len, &mut visitor);
        path.pop();
    }
}

fn extend(path: &mut Vec<&'static Transition>, max_len: usize, visitor: &mut impl FnMut(&[&'static Transition])) {
    if path.len() > max_len {
        return;
    }
    visitor(path);
    let Some(last) = path.last() else {
        return;
    };
    for next in transitions_from(last.target) {
        path.push(next);
        extend(path, max_len, visitor);
        path.pop();
    }
}

/// Every path of length `1..=max_len` from `start`, in traversal order.
pub fn paths_from(start: State, max_len: usize) -> Vec<Vec<&'static Transition>> {
    let mut paths = Vec::new();
    forward_traversal(start, max_len, |p| paths.push(p.to_vec()));
    paths
}

/// Graphviz rendering of the table, one edge per (source, target) pair.
pub fn to_dot() -> String {
    let mut edges: BTreeMap<(State, State), Vec<&Transition>> = BTreeMap::new();
    for transition in &TRANSITIONS {
        edges
            .entry((transition.source, transition.target))
            .or_default()
            .push(transition);
    }
    let mut out = String::from("digraph g {\n\trankdir=LR;\n\n");
    for state in State::ALL {
        let _ = writeln!(
            out,
            "\t{} [shape=oval,label=\"{}\"];",
            state.dot_id(),
            state.as_str().replace(' ', "\\n")
        );
    }
    out.push('\n');
    for ((source, target), transitions) in edges {
        let label = transitions
            .iter()
            .map(|t| {
                let callbacks = t.callbacks.iter().map(ToString::to_string).collect::<Vec<_>>().join(",<BR/>");
                format!(
                    "{}<BR/><FONT FACE=\"Courier\">[{callbacks}]</FONT>",
                    t.event.as_str().to_ascii_lowercase()
                )
            })
            .collect::<Vec<_>>()
            .join("<BR/>");
        let _ = writeln!(
            out,
            "\t{} -> {} [fontcolor=darkslategrey,label=<{label}>];",
            source.dot_id(),
            target.dot_id()
        );
    }
    out.push_str("}\n");
    out
}

// ============================================================================
// Per-engine graph
// ============================================================================

/// The STG of one engine class.
#[derive(Debug)]
pub struct Stg {
    engine: ClassId,
    callbacks: BTreeMap<Callback, MethodId>,
    summaries: BTreeMap<Callback, FlowSummary>,
}

impl Stg {
    /// Resolve the callbacks of `engine`, analyzing each one when `lookup_api` is set.
    pub fn construct(analyzer: &mut Analyzer<'_>, engine: ClassId, lookup_api: bool) -> AnalysisResult<Self> {
        let mut stg = Self {
            engine,
            callbacks: resolve_callbacks(analyzer, engine),
            summaries: BTreeMap::new(),
        };
        if lookup_api {
            let callbacks: Vec<Callback> = stg.callbacks.keys().copied().collect();
            for callback in callbacks {
                if let Some(summary) = stg.lookup_api(analyzer, callback, false)? {
                    stg.summaries.insert(callback, summary);
                }
            }
        }
        Ok(stg)
    }

    pub fn engine(&self) -> ClassId {
        self.engine
    }

    pub fn callback_method(&self, callback: Callback) -> Option<MethodId> {
        self.callbacks.get(&callback).copied()
    }

    pub fn callbacks(&self) -> impl Iterator<Item = (Callback, MethodId)> + '_ {
        self.callbacks.iter().map(|(c, m)| (*c, *m))
    }

    /// Summary stored by [`Stg::construct`].
    pub fn summary(&self, callback: Callback) -> Option<&FlowSummary> {
        self.summaries.get(&callback)
    }

    /// Analyze one callback now. `None` when the engine does not implement it.
    pub fn lookup_api(
        &self,
        analyzer: &mut Analyzer<'_>,
        callback: Callback,
        retain: bool,
    ) -> AnalysisResult<Option<FlowSummary>> {
        let Some(method) = self.callback_method(callback) else {
            return Ok(None);
        };
        let mut lookup = Lookup::plain(method).retaining(retain);
        if let Some(value) = callback.hypothesis() {
            lookup = lookup.with_hypothesis(value);
            if callback.redraws() {
                lookup = lookup.then_draw(self.callback_method(Callback::OnDraw));
            }
        }
        analyzer.lookup(lookup).map(Some)
    }
}

/// Map each callback to the method implementing it for `engine`.
fn resolve_callbacks(analyzer: &Analyzer<'_>, engine: ClassId) -> BTreeMap<Callback, MethodId> {
    let program = analyzer.program();
    let mut map = BTreeMap::new();
    let bind = |map: &mut BTreeMap<Callback, MethodId>, callbacks: &[Callback], method: MethodId| {
        for callback in callbacks {
            if let Some(previous) = map.insert(*callback, method) {
                tracing::warn!(
                    %callback,
                    previous = %program.signature(previous),
                    using = %program.signature(method),
                    "callback matched more than once"
                );
            }
        }
    };

    for &method in program.methods_of(engine) {
        let callbacks: &[Callback] = match program.method(method).sub_signature().as_str() {
            ENGINE_ON_CREATE => &[Callback::OnCreate],
            ENGINE_ON_DESTROY => &[Callback::OnDestroy],
            ON_VISIBILITY_CHANGED => &[Vis(true), Vis(false)],
            ON_AMBIENT_MODE_CHANGED => &[Amb(true), Amb(false)],
            ON_DRAW => &[Callback::OnDraw],
            _ => &[],
        };
        bind(&mut map, callbacks, method);
    }

    let create_engine = framework_catalog::on_create_engine(&program.class(engine).name);
    for service in program.application_classes() {
        if !framework_catalog::is_watch_face_service(analyzer.hierarchy(), service) {
            continue;
        }
        let Some(factory) = program.declared_method(service, &create_engine) else {
            continue;
        };
        bind(&mut map, &[Callback::ServiceOnCreateEngine], factory);
        for (sub_signature, callback) in [
            (SERVICE_ON_CREATE, Callback::ServiceOnCreate),
            (SERVICE_ON_DESTROY, Callback::ServiceOnDestroy),
        ] {
            if let Some(method) = program.declared_method(service, sub_signature) {
                bind(&mut map, &[callback], method);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_seventeen_transitions_over_twelve_edges() {
        let edges: std::collections::BTreeSet<_> = TRANSITIONS.iter().map(|t| (t.source, t.target)).collect();
        assert_eq!(TRANSITIONS.len(), 17);
        assert_eq!(edges.len(), 12);
    }

    #[test]
    fn single_step_from_null_is_select() {
        let paths = paths_from(State::Null, 1);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0][0].event, Event::Select);
        assert_eq!(paths[0][0].target, State::Interactive);
    }

    #[test]
    fn traversal_includes_prefixes_and_repeats_states() {
        let paths = paths_from(State::Null, 2);
        // SELECT, then SELECT followed by each of the five Interactive transitions.
        assert_eq!(paths.len(), 6);
        assert!(paths.iter().all(|p| p[0].event == Event::Select));

        let ambient_round_trip = paths_from(State::Interactive, 2)
            .into_iter()
            .any(|p| p.len() == 2 && p[0].target == State::Ambient && p[1].target == State::Interactive);
        assert!(ambient_round_trip);
    }

    #[test]
    fn only_select_then_standby_reaches_ambient_in_two_steps() {
        let to_ambient: Vec<Vec<Event>> = paths_from(State::Null, 2)
            .into_iter()
            .filter(|p| p.last().is_some_and(|t| t.target == State::Ambient))
            .map(|p| p.iter().map(|t| t.event).collect())
            .collect();
        assert_eq!(to_ambient, vec![vec![Event::Select, Event::Standby]]);
    }

    #[test]
    fn callbacks_know_their_hypothesis() {
        assert_eq!(Callback::OnAmbientModeChanged(true).hypothesis(), Some(true));
        assert_eq!(Callback::OnCreate.hypothesis(), None);
        assert!(Callback::OnVisibilityChanged(true).redraws());
        assert!(!Callback::OnVisibilityChanged(false).redraws());
        assert_eq!(Callback::OnAmbientModeChanged(false).to_string(), "onAmbientModeChanged(false)");
    }

    #[test]
    fn dot_groups_parallel_transitions() {
        let dot = to_dot();
        assert!(dot.starts_with("digraph g {"));
        assert_eq!(dot.matches(" -> ").count(), 12);
        assert!(dot.contains("standby"));
    }
}
