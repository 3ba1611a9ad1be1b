//! Per-program analysis context.
//!
//! An [`Analyzer`] owns everything a flow analysis run reads or mutates: the
//! class hierarchy, the lazily built value-flow graph, the alias and constant
//! trackers, and the label interner. Nothing is process-global, so separate
//! programs (or separate engine classes) can be analyzed with independent
//! analyzers. Within one analyzer the trackers persist across runs until
//! [`Analyzer::clear_context`] is called; callers decide when a run should see
//! the aliasing accumulated by earlier ones.

pub mod alias;
pub mod constant;
pub mod flow;
pub mod label;
pub mod refine;

use crate::error::AnalysisResult;
use crate::flow_graph::FlowGraph;
use crate::hierarchy::Hierarchy;
use crate::program::{MethodId, Program};
use alias::AliasTracker;
use constant::ConstantTracker;
use flow::{FlowAnalysis, FlowSummary};
use label::{Label, LabelId, LabelInterner};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;

pub const DEFAULT_RECURSION_CAP: usize = 5;

/// Which tracker decides conditional branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BranchResolution {
    #[default]
    Alias,
    Constant,
}

impl BranchResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            BranchResolution::Alias => "alias",
            BranchResolution::Constant => "constant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisSettings {
    /// How many times one method may be entered during a single run.
    pub recursion_cap: usize,
    pub branch_resolution: BranchResolution,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            recursion_cap: DEFAULT_RECURSION_CAP,
            branch_resolution: BranchResolution::Alias,
        }
    }
}

/// Alias and constant state shared by consecutive runs.
#[derive(Debug, Default)]
pub struct Context {
    pub aliases: AliasTracker,
    pub constants: ConstantTracker,
}

impl Context {
    pub fn clear(&mut self) {
        self.aliases.clear_context();
        self.constants.clear_context();
    }

    /// Resolve an operand with the tracker selected by `mode`.
    pub fn solve_operand(
        &self,
        mode: BranchResolution,
        method: MethodId,
        operand: &crate::program::Operand,
    ) -> Option<i32> {
        match mode {
            BranchResolution::Alias => self.aliases.solve_operand(method, operand),
            BranchResolution::Constant => self.constants.solve_operand(method, operand),
        }
    }
}

/// A flow analysis request: one callback, optionally under a fixed
/// ambient/visibility hypothesis, optionally followed by `onDraw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub root: MethodId,
    pub hypothesis: Option<bool>,
    pub on_draw: Option<MethodId>,
    /// Keep the alias/constant context of earlier runs.
    pub retain: bool,
}

impl Lookup {
    pub fn plain(root: MethodId) -> Self {
        Self {
            root,
            hypothesis: None,
            on_draw: None,
            retain: false,
        }
    }

    pub fn with_hypothesis(mut self, value: bool) -> Self {
        self.hypothesis = Some(value);
        self
    }

    pub fn then_draw(mut self, on_draw: Option<MethodId>) -> Self {
        self.on_draw = on_draw;
        self
    }

    pub fn retaining(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

pub struct Analyzer<'p> {
    program: &'p Program,
    hierarchy: Hierarchy<'p>,
    flow_graph: OnceCell<FlowGraph>,
    context: Context,
    labels: LabelInterner,
    settings: AnalysisSettings,
}

impl<'p> Analyzer<'p> {
    pub fn new(program: &'p Program, settings: AnalysisSettings) -> Self {
        Self {
            program,
            hierarchy: Hierarchy::build(program),
            flow_graph: OnceCell::new(),
            context: Context::default(),
            labels: LabelInterner::default(),
            settings,
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn hierarchy(&self) -> &Hierarchy<'p> {
        &self.hierarchy
    }

    pub fn settings(&self) -> AnalysisSettings {
        self.settings
    }

    /// The value-flow graph, built on first use.
    pub fn flow_graph(&self) -> &FlowGraph {
        self.flow_graph.get_or_init(|| FlowGraph::build(&self.hierarchy))
    }

    pub fn label(&self, id: LabelId) -> &Label {
        self.labels.get(id)
    }

    /// Forget all alias and constant facts.
    pub fn clear_context(&mut self) {
        self.context.clear();
    }

    /// Run the flow analysis for `lookup` and refine its labels.
    pub fn lookup(&mut self, lookup: Lookup) -> AnalysisResult<FlowSummary> {
        if !lookup.retain {
            self.clear_context();
        }
        let mut summary = FlowSummary::default();
        {
            let mut flow = FlowAnalysis {
                program: self.program,
                hierarchy: &self.hierarchy,
                flow_graph: &self.flow_graph,
                context: &mut self.context,
                labels: &mut self.labels,
                settings: self.settings,
                hypothesis: lookup.hypothesis,
                summary: &mut summary,
            };
            flow.analyze_root(lookup.root)?;
            if let Some(on_draw) = lookup.on_draw {
                flow.analyze_root(on_draw)?;
            }
        }
        refine::refine(self.program, &self.labels, &mut summary);
        tracing::debug!(
            root = %self.program.signature(lookup.root),
            hypothesis = ?lookup.hypothesis,
            slice = summary.slice.len(),
            labels = summary.labels.len(),
            acquires = summary.acquires.len(),
            releases = summary.releases.len(),
            "lookup finished"
        );
        Ok(summary)
    }
}
