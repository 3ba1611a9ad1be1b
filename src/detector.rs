//! Leak and ambient-display checks over the lifecycle of each engine class.
//!
//! Leak check: every STG path from `Null` of at most `path_length` events that
//! ends in `Null` or `Ambient` is replayed. The confirmed releases and exposed
//! acquires of each callback on the path are folded into a per-listener
//! register set. Anything still registered at the end is a leak, unless it is
//! a benign sensor kept on in ambient mode or the listener releases it from
//! its own `onSensorChanged`.
//!
//! Color check: the opaque colors drawn when entering ambient mode are compared
//! with those drawn when leaving it.

use crate::analysis::{Analyzer, Lookup};
use crate::analysis::flow::FlowSummary;
use crate::analysis::label::ObjectId;
use crate::color;
use crate::diagnostics::{AntiAliasFinding, ColorFinding, DetectorReport, LeakFinding, LeakedListener};
use crate::error::{AnalysisError, AnalysisResult};
use crate::framework_catalog::{self, CANVAS_ENGINE, GLES2_ENGINE, ON_SENSOR_CHANGED, Resource};
use crate::instrument_block;
use crate::program::ClassId;
use crate::stg::{self, Callback, State, Stg, Transition};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_PATH_LENGTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorSettings {
    /// Longest event sequence replayed from `Null`.
    pub path_length: usize,
    pub allowed_ambient_colors: Vec<String>,
    /// Sensor types allowed to stay registered in ambient mode.
    pub benign_ambient_sensors: Vec<i32>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            path_length: DEFAULT_PATH_LENGTH,
            allowed_ambient_colors: color::DEFAULT_AMBIENT_ALLOWED.iter().map(|c| (*c).to_string()).collect(),
            benign_ambient_sensors: vec![framework_catalog::SENSOR_TYPE_STEP_COUNTER],
        }
    }
}

/// Listener classes mapped to the objects they still have registered.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Registrations {
    live: BTreeMap<(Resource, ClassId), BTreeSet<ObjectId>>,
}

impl Registrations {
    /// Apply one callback: its releases first, then its acquires.
    fn apply(&mut self, analyzer: &Analyzer<'_>, summary: &FlowSummary) {
        for label in summary.releases.iter().map(|id| analyzer.label(*id)) {
            let key = (label.name.resource, label.listener.class());
            match label.object {
                ObjectId::Any => {
                    self.live.remove(&key);
                }
                object => {
                    if let Some(objects) = self.live.get_mut(&key) {
                        objects.remove(&object);
                    }
                }
            }
        }
        for label in summary.acquires.iter().map(|id| analyzer.label(*id)) {
            self.live
                .entry((label.name.resource, label.listener.class()))
                .or_default()
                .insert(label.object);
        }
        self.live.retain(|_, objects| !objects.is_empty());
    }

    fn remove_benign(&mut self, benign: &[i32]) {
        for ((resource, _), objects) in &mut self.live {
            if *resource == Resource::Sensor {
                objects.retain(|o| !matches!(o, ObjectId::Id(id) if benign.contains(id)));
            }
        }
        self.live.retain(|_, objects| !objects.is_empty());
    }

    fn remove_explained(&mut self, explained: &BTreeMap<ClassId, BTreeSet<ObjectId>>) {
        for ((resource, listener), objects) in &mut self.live {
            if *resource != Resource::Sensor {
                continue;
            }
            let Some(released) = explained.get(listener) else {
                continue;
            };
            if released.contains(&ObjectId::Any) {
                objects.clear();
            } else {
                objects.retain(|o| !released.contains(o));
            }
        }
        self.live.retain(|_, objects| !objects.is_empty());
    }
}

pub struct Detector<'a, 'p> {
    analyzer: &'a mut Analyzer<'p>,
    settings: DetectorSettings,
}

impl<'a, 'p> Detector<'a, 'p> {
    pub fn new(analyzer: &'a mut Analyzer<'p>, settings: DetectorSettings) -> Self {
        Self { analyzer, settings }
    }

    /// Run every check on every engine class of the program.
    pub fn run(&mut self) -> AnalysisResult<DetectorReport> {
        if self.settings.path_length == 0 {
            return Err(AnalysisError::config("path length must be at least 1"));
        }
        let engines = self.engine_classes()?;
        tracing::info!(engines = engines.len(), "watch face engines found");

        let explained = self.on_sensor_changed_releases()?;
        let mut report = DetectorReport::default();
        for engine in engines {
            let stg = Stg::construct(self.analyzer, engine, false)?;
            let leaks = instrument_block!("detector::leaks", { self.leaks(&stg, &explained) })?;
            report.leaks.extend(leaks);
            instrument_block!("detector::colors", { self.colors(&stg, &mut report) })?;
        }
        Ok(report)
    }

    /// Application engine classes, sorted by name.
    fn engine_classes(&self) -> AnalysisResult<Vec<ClassId>> {
        let program = self.analyzer.program();
        let present = [CANVAS_ENGINE, GLES2_ENGINE]
            .iter()
            .filter_map(|name| program.class_by_name(name))
            .any(|class| !program.class(class).is_phantom());
        if !present {
            return Err(AnalysisError::obfuscated(format!(
                "neither {CANVAS_ENGINE} nor {GLES2_ENGINE} is resolvable"
            )));
        }
        let mut engines: Vec<ClassId> = program
            .application_classes()
            .filter(|c| framework_catalog::is_watch_face_engine(self.analyzer.hierarchy(), *c))
            .collect();
        engines.sort_by(|a, b| program.class(*a).name.cmp(&program.class(*b).name));
        Ok(engines)
    }

    /// Sensors each listener class releases from its own `onSensorChanged`.
    fn on_sensor_changed_releases(&mut self) -> AnalysisResult<BTreeMap<ClassId, BTreeSet<ObjectId>>> {
        let program = self.analyzer.program();
        let handlers: Vec<_> = program
            .application_classes()
            .filter_map(|class| program.declared_method(class, ON_SENSOR_CHANGED))
            .collect();
        let mut explained: BTreeMap<ClassId, BTreeSet<ObjectId>> = BTreeMap::new();
        for handler in handlers {
            let summary = self.analyzer.lookup(Lookup::plain(handler))?;
            for label in summary.releases.iter().map(|id| self.analyzer.label(*id)) {
                if label.name.resource == Resource::Sensor {
                    explained.entry(label.listener.class()).or_default().insert(label.object);
                }
            }
        }
        tracing::debug!(listeners = explained.len(), "onSensorChanged releases collected");
        Ok(explained)
    }

    fn leaks(
        &mut self,
        stg: &Stg,
        explained: &BTreeMap<ClassId, BTreeSet<ObjectId>>,
    ) -> AnalysisResult<Vec<LeakFinding>> {
        let paths: Vec<Vec<&'static Transition>> = stg::paths_from(State::Null, self.settings.path_length)
            .into_iter()
            .filter(|path| {
                path.last()
                    .is_some_and(|t| matches!(t.target, State::Null | State::Ambient))
            })
            .collect();
        tracing::info!(
            engine = %self.analyzer.program().class(stg.engine()).name,
            paths = paths.len(),
            "replaying lifecycle paths"
        );

        let mut findings = Vec::new();
        for path in paths {
            if let Some(finding) = self.replay(stg, &path, explained)? {
                findings.push(finding);
            }
        }
        Ok(findings)
    }

    fn replay(
        &mut self,
        stg: &Stg,
        path: &[&'static Transition],
        explained: &BTreeMap<ClassId, BTreeSet<ObjectId>>,
    ) -> AnalysisResult<Option<LeakFinding>> {
        // Every path starts from the interactive drawing state.
        self.analyzer.clear_context();
        stg.lookup_api(self.analyzer, Callback::OnAmbientModeChanged(false), true)?;

        let mut registrations = Registrations::default();
        for transition in path {
            for callback in transition.callbacks {
                if let Some(summary) = stg.lookup_api(self.analyzer, *callback, true)? {
                    registrations.apply(self.analyzer, &summary);
                }
            }
        }

        let Some(end_state) = path.last().map(|t| t.target) else {
            return Ok(None);
        };
        if end_state == State::Ambient {
            registrations.remove_benign(&self.settings.benign_ambient_sensors);
        }
        registrations.remove_explained(explained);
        if registrations.live.is_empty() {
            return Ok(None);
        }

        let program = self.analyzer.program();
        let finding = LeakFinding {
            engine: program.class(stg.engine()).name.clone(),
            events: path.iter().map(|t| t.event).collect(),
            end_state,
            listeners: registrations
                .live
                .into_iter()
                .map(|((resource, listener), objects)| LeakedListener {
                    resource,
                    listener: program.class(listener).name.clone(),
                    objects: objects.into_iter().collect(),
                })
                .collect(),
        };
        tracing::info!(engine = %finding.engine, path = %finding.event_path(), "leak found");
        Ok(Some(finding))
    }

    fn colors(&mut self, stg: &Stg, report: &mut DetectorReport) -> AnalysisResult<()> {
        self.analyzer.clear_context();
        let Some(ambient) = stg.lookup_api(self.analyzer, Callback::OnAmbientModeChanged(true), false)? else {
            return Ok(());
        };
        let Some(interactive) = stg.lookup_api(self.analyzer, Callback::OnAmbientModeChanged(false), false)? else {
            return Ok(());
        };
        let engine = self.analyzer.program().class(stg.engine()).name.clone();

        let ambient_names = self.disallowed_names(&ambient);
        let interactive_names = self.disallowed_names(&interactive);
        let equal = ambient_names == interactive_names;
        tracing::debug!(
            %engine,
            ambient = ?ambient_names,
            interactive = ?interactive_names,
            "ambient colors compared"
        );
        if !equal && ambient_names.len() > 1 {
            report.colors.push(ColorFinding {
                engine: engine.clone(),
                ambient: ambient_names,
                interactive: interactive_names,
                equal,
            });
        }

        if ambient.all_anti_alias().contains(&1) {
            report.anti_alias.push(AntiAliasFinding {
                engine,
                callback: Callback::OnAmbientModeChanged(true).to_string(),
            });
        }
        Ok(())
    }

    fn disallowed_names(&self, summary: &FlowSummary) -> BTreeSet<String> {
        summary
            .all_colors()
            .into_iter()
            .filter(|c| color::is_opaque(*c))
            .map(color::color_name)
            .filter(|name| !self.settings.allowed_ambient_colors.iter().any(|a| a.eq_ignore_ascii_case(name)))
            .collect()
    }
}

/// Run the detector with a fresh analyzer context.
pub fn detect(analyzer: &mut Analyzer<'_>, settings: DetectorSettings) -> AnalysisResult<DetectorReport> {
    Detector::new(analyzer, settings).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(class: u32) -> (Resource, ClassId) {
        (Resource::Sensor, ClassId(class))
    }

    #[test]
    fn benign_sensors_are_dropped_only_for_sensors() {
        let mut regs = Registrations::default();
        regs.live.insert(key(0), BTreeSet::from([ObjectId::Id(19), ObjectId::Id(21)]));
        regs.live
            .insert((Resource::Location, ClassId(1)), BTreeSet::from([ObjectId::Any]));
        regs.remove_benign(&[19]);
        assert_eq!(regs.live[&key(0)], BTreeSet::from([ObjectId::Id(21)]));
        assert!(regs.live.contains_key(&(Resource::Location, ClassId(1))));
    }

    #[test]
    fn wildcard_on_sensor_changed_release_explains_everything() {
        let mut regs = Registrations::default();
        regs.live.insert(key(0), BTreeSet::from([ObjectId::Id(1), ObjectId::Any]));
        regs.live.insert(key(1), BTreeSet::from([ObjectId::Id(1), ObjectId::Id(2)]));
        let explained = BTreeMap::from([
            (ClassId(0), BTreeSet::from([ObjectId::Any])),
            (ClassId(1), BTreeSet::from([ObjectId::Id(2)])),
        ]);
        regs.remove_explained(&explained);
        assert!(!regs.live.contains_key(&key(0)));
        assert_eq!(regs.live[&key(1)], BTreeSet::from([ObjectId::Id(1)]));
    }
}
