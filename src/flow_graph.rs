//! Whole-program value-flow graph.
//!
//! Nodes are values (locals, fields, constants, allocation sites) plus one
//! node per call to a modeled framework API. An edge `a -> b` means the value
//! of `a` may flow into `b`. The graph is only consulted when the alias and
//! constant trackers of a flow analysis run cannot resolve a value, typically
//! because it was produced outside the analyzed call path.

use crate::analysis::alias::operand_constant;
use crate::framework_catalog::{self, ApiKind, ModeledApi, Resource};
use crate::hierarchy::Hierarchy;
use crate::program::{
    ClassId, FieldId, IdentitySource, InvokeExpr, LocalId, MethodId, Operand, Place, Program, Rvalue, Stmt,
    StmtRef,
};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Write as _;

/// Where an object is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocSite {
    /// `new C` at a statement.
    New { site: StmtRef, class: ClassId },
    /// The receiver of methods declared by a class.
    This(ClassId),
}

impl AllocSite {
    pub fn class(self) -> ClassId {
        match self {
            AllocSite::New { class, .. } | AllocSite::This(class) => class,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlowNode {
    Local(MethodId, LocalId),
    Field(FieldId),
    Int(i32),
    Str(String),
    Alloc(AllocSite),
    /// Bitwise or of two non-constant values.
    Or(StmtRef),
    /// A modeled API call; see [`FlowGraph::op_at`].
    Op(StmtRef, ApiKind),
}

/// Operands and result of one modeled API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetSensor {
        sensor_type: NodeIndex,
        result: Option<NodeIndex>,
    },
    Register {
        resource: Resource,
        listener: NodeIndex,
        object: Option<NodeIndex>,
    },
    Unregister {
        resource: Resource,
        listener: NodeIndex,
        object: Option<NodeIndex>,
    },
    SetColor {
        paint: Option<NodeIndex>,
        color: NodeIndex,
    },
    SetAntiAlias {
        paint: Option<NodeIndex>,
        flag: NodeIndex,
    },
    DrawColor {
        canvas: Option<NodeIndex>,
        color: NodeIndex,
    },
    ParseColor {
        name: NodeIndex,
        result: Option<NodeIndex>,
    },
    ContainerGet {
        container: NodeIndex,
        result: Option<NodeIndex>,
    },
}

impl Operation {
    /// Nodes flowing into the operation.
    fn inputs(&self) -> Vec<NodeIndex> {
        match *self {
            Operation::GetSensor { sensor_type, .. } => vec![sensor_type],
            Operation::Register { listener, object, .. } | Operation::Unregister { listener, object, .. } => {
                std::iter::once(listener).chain(object).collect()
            }
            Operation::SetColor { paint, color } | Operation::DrawColor { canvas: paint, color } => {
                std::iter::once(color).chain(paint).collect()
            }
            Operation::SetAntiAlias { paint, flag } => std::iter::once(flag).chain(paint).collect(),
            Operation::ParseColor { name, .. } => vec![name],
            // The container flows straight to the result, bypassing the op node.
            Operation::ContainerGet { .. } => Vec::new(),
        }
    }

    fn result(&self) -> Option<NodeIndex> {
        match *self {
            Operation::GetSensor { result, .. } | Operation::ParseColor { result, .. } => result,
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct FlowGraph {
    graph: DiGraph<FlowNode, ()>,
    nodes: HashMap<FlowNode, NodeIndex>,
    ops: HashMap<StmtRef, (NodeIndex, Operation)>,
}

impl FlowGraph {
    /// Build the graph over every concrete method of every application class.
    pub fn build(hierarchy: &Hierarchy<'_>) -> Self {
        let program = hierarchy.program();
        let mut builder = Builder {
            hierarchy,
            program,
            graph: FlowGraph::default(),
        };
        for class in program.application_classes() {
            for &method in program.methods_of(class) {
                builder.add_method(class, method);
            }
        }
        let graph = builder.graph;
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            ops = graph.ops.len(),
            "value-flow graph built"
        );
        graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, value: &FlowNode) -> Option<NodeIndex> {
        self.nodes.get(value).copied()
    }

    pub fn weight(&self, node: NodeIndex) -> Option<&FlowNode> {
        self.graph.node_weight(node)
    }

    /// Node of an operand as seen from `method`, if the graph has one.
    pub fn operand_node(&self, method: MethodId, operand: &Operand) -> Option<NodeIndex> {
        self.node(&operand_value(method, operand)?)
    }

    pub fn predecessors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Incoming)
    }

    /// The modeled call made at `site`.
    pub fn op_at(&self, site: StmtRef) -> Option<(NodeIndex, &Operation)> {
        self.ops.get(&site).map(|(node, op)| (*node, op))
    }

    pub fn operation(&self, node: NodeIndex) -> Option<&Operation> {
        match self.weight(node)? {
            FlowNode::Op(site, _) => self.ops.get(site).map(|(_, op)| op),
            _ => None,
        }
    }

    /// Every node with a path to `start`, `start` included. Operation nodes
    /// are reported but never walked through.
    pub fn backward_reachable(&self, start: NodeIndex) -> BTreeSet<NodeIndex> {
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for pred in self.graph.neighbors_directed(node, Direction::Incoming) {
                if !seen.insert(pred) {
                    continue;
                }
                if !matches!(self.graph[pred], FlowNode::Op(..)) {
                    queue.push_back(pred);
                }
            }
        }
        seen
    }

    /// Integer constants flowing into `start`.
    pub fn reaching_ints(&self, start: NodeIndex) -> BTreeSet<i32> {
        self.backward_reachable(start)
            .into_iter()
            .filter_map(|n| match self.graph[n] {
                FlowNode::Int(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    /// Allocation sites flowing into `start`.
    pub fn reaching_allocs(&self, start: NodeIndex) -> BTreeSet<AllocSite> {
        self.backward_reachable(start)
            .into_iter()
            .filter_map(|n| match self.graph[n] {
                FlowNode::Alloc(site) => Some(site),
                _ => None,
            })
            .collect()
    }

    /// Graphviz rendering, mostly for debugging models.
    pub fn to_dot(&self, program: &Program) -> String {
        let mut out = String::from("digraph flow {\n");
        for node in self.graph.node_indices() {
            let label = describe(program, &self.graph[node]).replace('"', "\\\"");
            let shape = if matches!(self.graph[node], FlowNode::Op(..)) { "box" } else { "ellipse" };
            let _ = writeln!(out, "  n{} [label=\"{label}\", shape={shape}];", node.index());
        }
        for edge in self.graph.raw_edges() {
            let _ = writeln!(out, "  n{} -> n{};", edge.source().index(), edge.target().index());
        }
        out.push_str("}\n");
        out
    }
}

fn describe(program: &Program, node: &FlowNode) -> String {
    match node {
        FlowNode::Local(m, l) => {
            let name = program
                .body(*m)
                .and_then(|b| b.local(*l))
                .map_or_else(|| format!("l{}", l.0), |local| local.name.clone());
            format!("{}.{name}", program.method(*m).name)
        }
        FlowNode::Field(f) => {
            let field = program.field(*f);
            format!("{}.{}", program.class(field.class).name, field.name)
        }
        FlowNode::Int(v) => v.to_string(),
        FlowNode::Str(s) => format!("{s:?}"),
        FlowNode::Alloc(AllocSite::New { site, class }) => format!("new {} @{site}", program.class(*class).name),
        FlowNode::Alloc(AllocSite::This(class)) => format!("this {}", program.class(*class).name),
        FlowNode::Or(site) => format!("or @{site}"),
        FlowNode::Op(site, kind) => format!("{kind:?} @{site}"),
    }
}

fn operand_value(method: MethodId, operand: &Operand) -> Option<FlowNode> {
    match operand {
        Operand::Local(l) => Some(FlowNode::Local(method, *l)),
        Operand::Field { field, .. } => Some(FlowNode::Field(*field)),
        Operand::Str(s) => Some(FlowNode::Str(s.clone())),
        other => operand_constant(other).map(FlowNode::Int),
    }
}

fn place_value(method: MethodId, place: &Place) -> FlowNode {
    match place {
        Place::Local(l) => FlowNode::Local(method, *l),
        Place::Field { field, .. } => FlowNode::Field(*field),
    }
}

struct Builder<'a, 'p> {
    hierarchy: &'a Hierarchy<'p>,
    program: &'p Program,
    graph: FlowGraph,
}

impl Builder<'_, '_> {
    fn intern(&mut self, value: FlowNode) -> NodeIndex {
        if let Some(node) = self.graph.nodes.get(&value) {
            return *node;
        }
        let node = self.graph.graph.add_node(value.clone());
        self.graph.nodes.insert(value, node);
        node
    }

    fn operand(&mut self, method: MethodId, operand: &Operand) -> Option<NodeIndex> {
        operand_value(method, operand).map(|v| self.intern(v))
    }

    fn edge(&mut self, from: NodeIndex, to: NodeIndex) {
        if !self.graph.graph.contains_edge(from, to) {
            self.graph.graph.add_edge(from, to, ());
        }
    }

    fn add_method(&mut self, class: ClassId, method: MethodId) {
        let Some(body) = self.program.body(method) else {
            return;
        };
        for (idx, stmt) in body.stmts.iter().enumerate() {
            let site = StmtRef::new(method, idx as u32);
            match stmt {
                Stmt::Identity {
                    local,
                    source: IdentitySource::This,
                } => {
                    let this = self.intern(FlowNode::Alloc(AllocSite::This(class)));
                    let local = self.intern(FlowNode::Local(method, *local));
                    self.edge(this, local);
                }
                Stmt::Invoke(invoke) => self.add_call(site, invoke, None),
                Stmt::Assign {
                    lhs,
                    rhs: Rvalue::Invoke(invoke),
                } => self.add_call(site, invoke, Some(lhs)),
                Stmt::Assign { lhs, rhs } => self.add_assign(site, lhs, rhs),
                _ => {}
            }
        }
    }

    fn add_assign(&mut self, site: StmtRef, lhs: &Place, rhs: &Rvalue) {
        let method = site.method;
        let sources: Vec<NodeIndex> = match rhs {
            Rvalue::Use(op) | Rvalue::Cast(op) => self.operand(method, op).into_iter().collect(),
            Rvalue::New(class) => vec![self.intern(FlowNode::Alloc(AllocSite::New { site, class: *class }))],
            Rvalue::Phi(inputs) => inputs.iter().filter_map(|op| self.operand(method, op)).collect(),
            Rvalue::Or(a, b) => match (operand_constant(a), operand_constant(b)) {
                (Some(x), Some(y)) => vec![self.intern(FlowNode::Int(x | y))],
                _ => {
                    let or = self.intern(FlowNode::Or(site));
                    for input in [a, b] {
                        if let Some(node) = self.operand(method, input) {
                            self.edge(node, or);
                        }
                    }
                    vec![or]
                }
            },
            Rvalue::Invoke(_) | Rvalue::Other => Vec::new(),
        };
        if sources.is_empty() {
            return;
        }
        let target = self.intern(place_value(method, lhs));
        for source in sources {
            self.edge(source, target);
        }
    }

    fn add_call(&mut self, site: StmtRef, invoke: &InvokeExpr, lhs: Option<&Place>) {
        let signature = self.program.signature(invoke.method);
        if let Some(api) = framework_catalog::lookup(&signature) {
            self.add_operation(site, invoke, lhs, api);
            return;
        }
        let result = lhs.map(|place| self.intern(place_value(site.method, place)));
        for target in self.hierarchy.call_targets(site.method, invoke) {
            self.bind_call(site.method, invoke, target, result);
        }
    }

    /// Parameter, receiver and return bindings of a resolved call.
    fn bind_call(&mut self, caller: MethodId, invoke: &InvokeExpr, callee: MethodId, result: Option<NodeIndex>) {
        let Some(body) = self.program.body(callee) else {
            return;
        };
        if let (Some(receiver), Some((_, this))) = (invoke.receiver, body.identity_for(IdentitySource::This)) {
            let from = self.intern(FlowNode::Local(caller, receiver));
            let to = self.intern(FlowNode::Local(callee, this));
            self.edge(from, to);
        }
        for (i, arg) in invoke.args.iter().enumerate() {
            let Some((_, formal)) = body.identity_for(IdentitySource::Param(i as u32)) else {
                continue;
            };
            if let Some(from) = self.operand(caller, arg) {
                let to = self.intern(FlowNode::Local(callee, formal));
                self.edge(from, to);
            }
        }
        let Some(result) = result else {
            return;
        };
        for stmt in &body.stmts {
            if let Stmt::Return(Some(value)) = stmt
                && let Some(from) = self.operand(callee, value)
            {
                self.edge(from, result);
            }
        }
    }

    fn add_operation(&mut self, site: StmtRef, invoke: &InvokeExpr, lhs: Option<&Place>, api: &ModeledApi) {
        let method = site.method;
        let arg = |b: &mut Self, idx: Option<usize>| {
            idx.and_then(|i| invoke.args.get(i)).and_then(|op| b.operand(method, op))
        };
        let receiver = invoke.receiver.map(|r| self.intern(FlowNode::Local(method, r)));
        let result = lhs.map(|place| self.intern(place_value(method, place)));

        let operation = match api.kind {
            ApiKind::GetSensor => arg(self, api.operand).map(|sensor_type| Operation::GetSensor { sensor_type, result }),
            ApiKind::RegisterSensorListener
            | ApiKind::UnregisterSensorListener
            | ApiKind::RequestLocationUpdates
            | ApiKind::RemoveLocationUpdates => {
                let resource = api.kind.resource().unwrap_or(Resource::Sensor);
                let object = arg(self, api.operand);
                match arg(self, api.listener) {
                    // An object argument that does not resolve to any value leaves nothing to link.
                    Some(_) if api.operand.is_some() && object.is_none() => None,
                    Some(listener) if api.kind.is_acquire() => Some(Operation::Register {
                        resource,
                        listener,
                        object,
                    }),
                    Some(listener) => Some(Operation::Unregister {
                        resource,
                        listener,
                        object,
                    }),
                    None => None,
                }
            }
            ApiKind::PaintSetColor => arg(self, api.operand).map(|color| Operation::SetColor { paint: receiver, color }),
            ApiKind::PaintSetAntiAlias => {
                arg(self, api.operand).map(|flag| Operation::SetAntiAlias { paint: receiver, flag })
            }
            ApiKind::CanvasDrawColor => {
                arg(self, api.operand).map(|color| Operation::DrawColor { canvas: receiver, color })
            }
            ApiKind::ParseColor => arg(self, api.operand).map(|name| Operation::ParseColor { name, result }),
            ApiKind::ContainerGet => receiver.map(|container| Operation::ContainerGet { container, result }),
        };
        let Some(operation) = operation else {
            tracing::debug!(%site, kind = ?api.kind, "modeled call with unresolvable operands skipped");
            return;
        };

        let op = self.intern(FlowNode::Op(site, api.kind));
        for input in operation.inputs() {
            self.edge(input, op);
        }
        if let Some(result) = operation.result() {
            self.edge(op, result);
        }
        if let Operation::ContainerGet {
            container,
            result: Some(result),
        } = operation
        {
            self.edge(container, result);
        }
        self.graph.ops.insert(site, (op, operation));
    }
}
