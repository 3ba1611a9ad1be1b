//! Interprocedural flow analysis.
//!
//! One run starts at a root method and walks its control-flow graph with a
//! FIFO worklist. Conditional branches whose operands both resolve to
//! constants follow only the taken successor; every other branch explores
//! both. Visited statements are appended to a shared slice, assignments feed
//! the alias and constant trackers, and calls are either recorded (modeled
//! framework APIs) or descended into (application code, via CHA for virtual
//! calls).

use super::alias::{AliasTarget, operand_constant};
use super::constant::Lattice;
use super::label::{Label, LabelId, LabelInterner, LabelKind, LabelName, ObjectId};
use super::{AnalysisSettings, BranchResolution, Context};
use crate::analysis_bail;
use crate::color;
use crate::error::{AnalysisError, AnalysisResult};
use crate::flow_graph::{FlowGraph, FlowNode, Operation};
use crate::framework_catalog::{self, ApiKind, ModeledApi, is_state_accessor};
use crate::hierarchy::Hierarchy;
use crate::program::{
    Body, IdentitySource, InvokeExpr, MethodId, Operand, Program, Rvalue, Slot, Stmt, StmtRef,
};
use petgraph::graph::NodeIndex;
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// A call from `site` into `callee`, as taken during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallEdge {
    pub site: StmtRef,
    pub callee: MethodId,
}

/// Everything one lookup observed.
#[derive(Debug, Clone, Default)]
pub struct FlowSummary {
    /// Methods the runs started from, in order.
    pub roots: Vec<MethodId>,
    /// Visited statements in visiting order; a method analyzed twice appears twice.
    pub slice: Vec<StmtRef>,
    pub call_edges: BTreeSet<CallEdge>,
    /// Every label recorded, before refinement.
    pub labels: BTreeSet<LabelId>,
    /// Acquires still exposed at the end of the callback.
    pub acquires: BTreeSet<LabelId>,
    /// Releases executed on every path through the callback.
    pub releases: BTreeSet<LabelId>,
    /// Colors passed to `setColor`/`drawColor`, per receiver.
    pub colors: BTreeMap<Slot, BTreeSet<i32>>,
    /// Flags passed to `setAntiAlias`, per receiver.
    pub anti_alias: BTreeMap<Slot, BTreeSet<i32>>,
}

impl FlowSummary {
    pub fn all_colors(&self) -> BTreeSet<i32> {
        self.colors.values().flatten().copied().collect()
    }

    pub fn all_anti_alias(&self) -> BTreeSet<i32> {
        self.anti_alias.values().flatten().copied().collect()
    }

    pub fn contains(&self, site: StmtRef) -> bool {
        self.slice.contains(&site)
    }
}

/// A single lookup's mutable view of the analyzer.
pub struct FlowAnalysis<'a, 'p> {
    pub(super) program: &'p Program,
    pub(super) hierarchy: &'a Hierarchy<'p>,
    pub(super) flow_graph: &'a OnceCell<FlowGraph>,
    pub(super) context: &'a mut Context,
    pub(super) labels: &'a mut LabelInterner,
    pub(super) settings: AnalysisSettings,
    /// Injected result of `isInAmbientMode()`/`isVisible()`.
    pub(super) hypothesis: Option<bool>,
    pub(super) summary: &'a mut FlowSummary,
}

#[derive(Clone, Copy)]
struct CallSite<'p> {
    site: StmtRef,
    invoke: &'p InvokeExpr,
}

/// State of one run from one root.
#[derive(Default)]
struct RunState {
    visits: HashMap<MethodId, usize>,
}

impl<'a, 'p> FlowAnalysis<'a, 'p> {
    fn graph(&self) -> &'a FlowGraph {
        let hierarchy = self.hierarchy;
        self.flow_graph.get_or_init(|| FlowGraph::build(hierarchy))
    }

    fn mode(&self) -> BranchResolution {
        self.settings.branch_resolution
    }

    /// Analyze `root`, seeding its boolean parameter with the hypothesis.
    pub fn analyze_root(&mut self, root: MethodId) -> AnalysisResult<()> {
        self.summary.roots.push(root);
        if let Some(value) = self.hypothesis {
            self.seed_parameter(root, value)?;
        }
        let mut state = RunState::default();
        self.run(&mut state, root, None)
    }

    fn seed_parameter(&mut self, root: MethodId, value: bool) -> AnalysisResult<()> {
        let method = self.program.method(root);
        if method.params.first().map(String::as_str) != Some("boolean") {
            return Ok(());
        }
        let Some(body) = method.body.as_ref() else {
            return Ok(());
        };
        let Some((_, local)) = body.identity_for(IdentitySource::Param(0)) else {
            analysis_bail!(
                "{} takes a boolean but has no identity statement binding it",
                self.program.signature(root)
            );
        };
        let slot = Slot::Local(root, local);
        let injected = i32::from(value);
        self.context.constants.set(slot, Lattice::Const(injected));
        self.context.aliases.of(slot).only_to(AliasTarget::Const(injected));
        Ok(())
    }

    fn run(&mut self, state: &mut RunState, callee: MethodId, call: Option<CallSite<'p>>) -> AnalysisResult<()> {
        let program = self.program;
        if let Some(call) = call {
            if let Some(api) = framework_catalog::lookup(&program.signature(callee)) {
                return self.record_api(call, api);
            }
        }
        let declaring = program.method(callee).class;
        if !program.class(declaring).is_application() {
            return Ok(());
        }
        if call.is_some_and(|c| c.site.method == callee) {
            return Ok(());
        }
        let visits = state.visits.entry(callee).or_insert(0);
        if *visits > self.settings.recursion_cap {
            tracing::debug!(method = %program.signature(callee), "recursion cap reached");
            return Ok(());
        }
        *visits += 1;

        let Some(body) = program.body(callee) else {
            tracing::debug!(method = %program.signature(callee), "no body, branch terminated");
            return Ok(());
        };
        if let Some(call) = call {
            self.flow_at_call(callee, body, call)?;
        }
        for idx in self.propagate(callee, body) {
            let site = StmtRef::new(callee, idx);
            self.summary.slice.push(site);
            if let Some(invoke) = body.stmt(idx).and_then(Stmt::invoke) {
                self.dispatch(state, CallSite { site, invoke })?;
            }
        }
        Ok(())
    }

    /// Bind actual arguments of `call` to the formals of `callee`.
    fn flow_at_call(&mut self, callee: MethodId, body: &Body, call: CallSite<'_>) -> AnalysisResult<()> {
        let caller = call.site.method;
        let mut bindings: Vec<(IdentitySource, Operand)> = Vec::new();
        if !self.program.method(callee).is_static {
            if let Some(receiver) = call.invoke.receiver {
                bindings.push((IdentitySource::This, Operand::Local(receiver)));
            }
        }
        for (i, arg) in call.invoke.args.iter().enumerate() {
            bindings.push((IdentitySource::Param(i as u32), arg.clone()));
        }
        for (source, actual) in bindings {
            let Some((_, formal)) = body.identity_for(source) else {
                return Err(AnalysisError::consistency(format!(
                    "{} has no identity statement for {source:?} at call {}",
                    self.program.signature(callee),
                    call.site
                )));
            };
            let formal = Slot::Local(callee, formal);
            self.context.constants.record_binding(formal, caller, &actual);
            if let Some(target) = AliasTarget::from_operand(caller, &actual) {
                self.context.aliases.of(formal).to(target);
            }
        }
        Ok(())
    }

    /// Worklist walk over one body; returns visited statement indices in order.
    fn propagate(&mut self, method: MethodId, body: &Body) -> Vec<u32> {
        let cfg = body.cfg();
        let mut worklist: VecDeque<u32> = cfg.heads().into();
        let mut visited = HashSet::new();
        let mut slice = Vec::new();
        while let Some(idx) = worklist.pop_front() {
            if !visited.insert(idx) {
                continue;
            }
            let Some(stmt) = body.stmt(idx) else {
                continue;
            };
            self.handle_assignment(method, stmt);
            slice.push(idx);
            match stmt {
                Stmt::If { lhs, cmp, rhs, target } => {
                    let mode = self.mode();
                    let v1 = self.context.solve_operand(mode, method, lhs);
                    let v2 = self.context.solve_operand(mode, method, rhs);
                    match (v1, v2) {
                        (Some(a), Some(b)) if cmp.eval(i64::from(a), i64::from(b)) => worklist.push_back(*target),
                        (Some(_), Some(_)) => {
                            if (idx as usize + 1) < body.stmts.len() {
                                worklist.push_back(idx + 1);
                            }
                        }
                        _ => worklist.extend(cfg.succs(idx)),
                    }
                }
                Stmt::Return(_) => {}
                _ => worklist.extend(cfg.succs(idx)),
            }
        }
        slice
    }

    fn handle_assignment(&mut self, method: MethodId, stmt: &Stmt) {
        let Stmt::Assign { lhs, rhs } = stmt else {
            return;
        };
        let lhs = lhs.slot(method);
        if let (Some(value), Rvalue::Invoke(invoke)) = (self.hypothesis, rhs) {
            if is_state_accessor(&self.program.method(invoke.method).sub_signature()) {
                let injected = i32::from(value);
                self.context.constants.record(method, lhs, &Rvalue::Use(Operand::Int(injected)));
                self.context.aliases.of(lhs).to(AliasTarget::Const(injected));
                return;
            }
        }
        self.context.constants.record(method, lhs, rhs);
        let targets: Vec<AliasTarget> = match rhs {
            Rvalue::Use(op) | Rvalue::Cast(op) => AliasTarget::from_operand(method, op).into_iter().collect(),
            Rvalue::Phi(inputs) => inputs
                .iter()
                .filter_map(|op| AliasTarget::from_operand(method, op))
                .collect(),
            Rvalue::Or(a, b) => match (operand_constant(a), operand_constant(b)) {
                (Some(x), Some(y)) => vec![AliasTarget::Const(x | y)],
                _ => Vec::new(),
            },
            Rvalue::New(_) | Rvalue::Invoke(_) | Rvalue::Other => Vec::new(),
        };
        for target in targets {
            self.context.aliases.of(lhs).to(target);
        }
    }

    fn dispatch(&mut self, state: &mut RunState, call: CallSite<'p>) -> AnalysisResult<()> {
        let program = self.program;
        let invoke = call.invoke;
        let target = invoke.method;
        if invoke.kind.is_direct() {
            if program.class(program.method(target).class).is_application() {
                return self.descend(state, call, target);
            }
            if framework_catalog::lookup(&program.signature(target)).is_some() {
                return self.run(state, target, Some(call));
            }
            return Ok(());
        }
        if framework_catalog::lookup(&program.signature(target)).is_some() {
            return self.run(state, target, Some(call));
        }
        for callee in self.hierarchy.call_targets(call.site.method, invoke) {
            self.descend(state, call, callee)?;
        }
        Ok(())
    }

    fn descend(&mut self, state: &mut RunState, call: CallSite<'p>, callee: MethodId) -> AnalysisResult<()> {
        self.summary.call_edges.insert(CallEdge { site: call.site, callee });
        self.run(state, callee, Some(call))
    }

    // ========================================================================
    // Modeled APIs
    // ========================================================================

    fn record_api(&mut self, call: CallSite<'p>, api: &ModeledApi) -> AnalysisResult<()> {
        match api.kind {
            ApiKind::PaintSetColor | ApiKind::CanvasDrawColor => {
                if let Some((slot, values)) = self.drawing_values(call, api) {
                    self.summary.colors.entry(slot).or_default().extend(values);
                }
            }
            ApiKind::PaintSetAntiAlias => {
                if let Some((slot, values)) = self.drawing_values(call, api) {
                    self.summary.anti_alias.entry(slot).or_default().extend(values);
                }
            }
            kind if kind.resource().is_some() => self.record_label(call, api)?,
            // Their results only matter through the value-flow graph.
            _ => {}
        }
        Ok(())
    }

    /// Receiver and resolved values of a color or flag argument.
    fn drawing_values(&self, call: CallSite<'_>, api: &ModeledApi) -> Option<(Slot, BTreeSet<i32>)> {
        let method = call.site.method;
        let receiver = Slot::Local(method, call.invoke.receiver?);
        let arg = api.operand.and_then(|i| call.invoke.args.get(i))?;
        if let Some(value) = self.context.solve_operand(self.mode(), method, arg) {
            return Some((receiver, BTreeSet::from([value])));
        }
        let graph = self.graph();
        let value_node = match graph.op_at(call.site) {
            Some((_, Operation::SetColor { color, .. } | Operation::DrawColor { color, .. })) => *color,
            Some((_, Operation::SetAntiAlias { flag, .. })) => *flag,
            _ => {
                tracing::debug!(site = %call.site, "drawing call missing from the value-flow graph");
                return None;
            }
        };
        let values = constant_values(graph, value_node);
        if values.is_empty() {
            tracing::debug!(site = %call.site, kind = ?api.kind, "drawing argument unresolved");
            return None;
        }
        Some((receiver, values))
    }

    fn record_label(&mut self, call: CallSite<'p>, api: &ModeledApi) -> AnalysisResult<()> {
        let Some(resource) = api.kind.resource() else {
            return Ok(());
        };
        let method = call.site.method;
        let Some(listener) = api.listener.and_then(|i| call.invoke.args.get(i)) else {
            return Ok(());
        };
        let graph = self.graph();
        let allocs = graph
            .operand_node(method, listener)
            .map(|node| graph.reaching_allocs(node))
            .unwrap_or_default();
        if allocs.is_empty() {
            tracing::debug!(site = %call.site, "listener allocation site unresolved, no label");
            return Ok(());
        }
        let objects = match api.operand.and_then(|i| call.invoke.args.get(i)) {
            Some(object) => self.sensor_objects(method, object)?,
            None => BTreeSet::from([ObjectId::Any]),
        };
        let kind = if api.kind.is_acquire() {
            LabelKind::Acquire
        } else {
            LabelKind::Release
        };
        for listener in allocs {
            for object in &objects {
                let id = self.labels.intern(Label {
                    name: LabelName { kind, resource },
                    listener,
                    object: *object,
                    site: call.site,
                });
                tracing::debug!(site = %call.site, ?kind, object = %object, "label recorded");
                self.summary.labels.insert(id);
            }
        }
        Ok(())
    }

    /// Sensor types an object argument may stand for; `Any` when unknown.
    fn sensor_objects(&self, method: MethodId, object: &Operand) -> AnalysisResult<BTreeSet<ObjectId>> {
        let mut ids = BTreeSet::new();
        // Chase copies and casts to the getSensor call defining the object.
        if let (Some(body), Some(mut local)) = (self.program.body(method), object.as_local()) {
            while let Some(def) = body.definition_of(local)? {
                match body.stmt(def) {
                    Some(Stmt::Assign {
                        rhs: Rvalue::Use(Operand::Local(next)) | Rvalue::Cast(Operand::Local(next)),
                        ..
                    }) if *next != local => local = *next,
                    Some(Stmt::Assign {
                        rhs: Rvalue::Invoke(invoke),
                        ..
                    }) => {
                        ids.extend(self.get_sensor_types(StmtRef::new(method, def), invoke));
                        break;
                    }
                    _ => break,
                }
            }
        }
        if ids.is_empty() {
            let graph = self.graph();
            if let Some(node) = graph.operand_node(method, object) {
                for pred in graph.backward_reachable(node) {
                    if let Some(Operation::GetSensor { sensor_type, .. }) = graph.operation(pred) {
                        ids.extend(graph.reaching_ints(*sensor_type));
                    }
                }
            }
        }
        if ids.is_empty() {
            return Ok(BTreeSet::from([ObjectId::Any]));
        }
        Ok(ids.into_iter().map(ObjectId::Id).collect())
    }

    fn get_sensor_types(&self, site: StmtRef, invoke: &InvokeExpr) -> BTreeSet<i32> {
        let api = framework_catalog::lookup(&self.program.signature(invoke.method));
        let Some(api) = api.filter(|a| a.kind == ApiKind::GetSensor) else {
            return BTreeSet::new();
        };
        let Some(arg) = api.operand.and_then(|i| invoke.args.get(i)) else {
            return BTreeSet::new();
        };
        if let Some(value) = self.context.solve_operand(self.mode(), site.method, arg) {
            return BTreeSet::from([value]);
        }
        let graph = self.graph();
        match graph.op_at(site) {
            Some((_, Operation::GetSensor { sensor_type, .. })) => graph.reaching_ints(*sensor_type),
            _ => BTreeSet::new(),
        }
    }
}

/// Integer values flowing into `start`: constants, parsed color names, and
/// the bitwise or of both inputs of an `or` node.
pub fn constant_values(graph: &FlowGraph, start: NodeIndex) -> BTreeSet<i32> {
    let mut resolver = ValueResolver {
        graph,
        on_stack: HashSet::new(),
        memo: HashMap::new(),
    };
    resolver.values_of(start)
}

struct ValueResolver<'g> {
    graph: &'g FlowGraph,
    on_stack: HashSet<NodeIndex>,
    memo: HashMap<NodeIndex, BTreeSet<i32>>,
}

impl ValueResolver<'_> {
    fn values_of(&mut self, node: NodeIndex) -> BTreeSet<i32> {
        if let Some(values) = self.memo.get(&node) {
            return values.clone();
        }
        if !self.on_stack.insert(node) {
            return BTreeSet::new();
        }
        let graph = self.graph;
        let values = match graph.weight(node) {
            Some(FlowNode::Int(v)) => BTreeSet::from([*v]),
            Some(FlowNode::Op(..)) => match graph.operation(node) {
                Some(Operation::ParseColor { name, .. }) => graph
                    .backward_reachable(*name)
                    .into_iter()
                    .filter_map(|n| match graph.weight(n) {
                        Some(FlowNode::Str(s)) if !s.is_empty() => color::parse_color(s),
                        _ => None,
                    })
                    .collect(),
                _ => BTreeSet::new(),
            },
            Some(FlowNode::Or(_)) => {
                let inputs: Vec<BTreeSet<i32>> = graph
                    .predecessors(node)
                    .map(|pred| self.values_of(pred))
                    .collect();
                match inputs.as_slice() {
                    // Both operands were the same value.
                    [only] => only.clone(),
                    [a, b] => a.iter().flat_map(|x| b.iter().map(move |y| x | y)).collect(),
                    _ => BTreeSet::new(),
                }
            }
            Some(_) => graph
                .predecessors(node)
                .flat_map(|pred| self.values_of(pred))
                .collect(),
            None => BTreeSet::new(),
        };
        self.on_stack.remove(&node);
        self.memo.insert(node, values.clone());
        values
    }
}
