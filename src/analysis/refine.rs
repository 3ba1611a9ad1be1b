//! Path refinement of the labels recorded by a lookup.
//!
//! An acquire is kept when some slice path from the acquire's call site to a
//! root exit avoids every release of the same listener. A release is kept only
//! when every slice path from a root entry to a root exit runs through it.
//! Both walks are interprocedural: a call site with recorded call edges is
//! summarized by walking the callee's own part of the slice.

use super::flow::FlowSummary;
use super::label::{Label, LabelId, LabelInterner};
use crate::program::{Cfg, MethodId, Program, StmtRef};
use std::collections::{BTreeSet, HashMap, HashSet};

pub fn refine(program: &Program, labels: &LabelInterner, summary: &mut FlowSummary) {
    let view = SliceView::new(program, summary);
    let recorded: Vec<(LabelId, &Label)> = summary.labels.iter().map(|id| (*id, labels.get(*id))).collect();
    let releases: Vec<&Label> = recorded.iter().map(|(_, l)| *l).filter(|l| l.is_release()).collect();

    let mut acquires = BTreeSet::new();
    let mut guaranteed = BTreeSet::new();
    for (id, label) in &recorded {
        if label.is_acquire() {
            if view.is_exposed(label, &releases) {
                acquires.insert(*id);
            } else {
                tracing::debug!(site = %label.site, "acquire released before every exit");
            }
        } else if view.is_guaranteed(label) {
            guaranteed.insert(*id);
        } else {
            tracing::debug!(site = %label.site, "release not on every path, dropped");
        }
    }
    summary.acquires = acquires;
    summary.releases = guaranteed;
}

/// Outcome of summarizing a callee for one walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The label site was reached.
    Found,
    /// Some path crosses the callee without meeting the label or a blocker.
    PassThrough,
    /// Every path is intercepted.
    Blocked,
}

struct SliceView<'p> {
    program: &'p Program,
    roots: Vec<MethodId>,
    members: HashSet<StmtRef>,
    callees: HashMap<StmtRef, Vec<MethodId>>,
    cfgs: HashMap<MethodId, Cfg>,
}

impl<'p> SliceView<'p> {
    fn new(program: &'p Program, summary: &FlowSummary) -> Self {
        let members: HashSet<StmtRef> = summary.slice.iter().copied().collect();
        let mut callees: HashMap<StmtRef, Vec<MethodId>> = HashMap::new();
        for edge in &summary.call_edges {
            callees.entry(edge.site).or_default().push(edge.callee);
        }
        let methods: BTreeSet<MethodId> = members.iter().map(|s| s.method).collect();
        let cfgs = methods
            .into_iter()
            .filter_map(|m| program.body(m).map(|b| (m, b.cfg())))
            .collect();
        Self {
            program,
            roots: summary.roots.clone(),
            members,
            callees,
            cfgs,
        }
    }

    fn in_slice(&self, site: StmtRef) -> bool {
        self.members.contains(&site)
    }

    fn slice_succs(&self, site: StmtRef) -> Vec<u32> {
        self.cfgs.get(&site.method).map_or_else(Vec::new, |cfg| {
            cfg.succs(site.index)
                .iter()
                .copied()
                .filter(|s| self.in_slice(StmtRef::new(site.method, *s)))
                .collect()
        })
    }

    fn slice_preds(&self, site: StmtRef) -> Vec<u32> {
        self.cfgs.get(&site.method).map_or_else(Vec::new, |cfg| {
            cfg.preds(site.index)
                .iter()
                .copied()
                .filter(|s| self.in_slice(StmtRef::new(site.method, *s)))
                .collect()
        })
    }

    /// In-slice statements of `method` with no in-slice successor.
    fn exits(&self, method: MethodId) -> Vec<u32> {
        let len = self.program.body(method).map_or(0, |b| b.stmts.len() as u32);
        (0..len)
            .map(|i| StmtRef::new(method, i))
            .filter(|s| self.in_slice(*s) && self.slice_succs(*s).is_empty())
            .map(|s| s.index)
            .collect()
    }

    fn callees_at(&self, site: StmtRef) -> &[MethodId] {
        self.callees.get(&site).map_or(&[], Vec::as_slice)
    }

    // ------------------------------------------------------------------------
    // Acquires: backward from the exits
    // ------------------------------------------------------------------------

    fn is_exposed(&self, acquire: &Label, releases: &[&Label]) -> bool {
        let blockers: HashSet<StmtRef> = releases
            .iter()
            .filter(|r| r.releases(acquire))
            .map(|r| r.site)
            .collect();
        let mut memo = HashMap::new();
        self.roots.iter().any(|root| {
            let exits = self.exits(*root);
            self.walk_back(*root, exits, acquire.site, &blockers, &mut memo) == Outcome::Found
        })
    }

    fn walk_back(
        &self,
        method: MethodId,
        starts: Vec<u32>,
        target: StmtRef,
        blockers: &HashSet<StmtRef>,
        memo: &mut HashMap<MethodId, Outcome>,
    ) -> Outcome {
        let mut stack = starts;
        let mut seen = HashSet::new();
        let mut reached_entry = false;
        while let Some(idx) = stack.pop() {
            let site = StmtRef::new(method, idx);
            if !self.in_slice(site) || !seen.insert(idx) {
                continue;
            }
            if site == target {
                return Outcome::Found;
            }
            if blockers.contains(&site) {
                continue;
            }
            let callees = self.callees_at(site);
            if !callees.is_empty() {
                let mut any_open = false;
                for callee in callees {
                    match self.summarize_back(*callee, target, blockers, memo) {
                        Outcome::Found => return Outcome::Found,
                        Outcome::PassThrough => any_open = true,
                        Outcome::Blocked => {}
                    }
                }
                if !any_open {
                    continue;
                }
            }
            let preds = self.slice_preds(site);
            if preds.is_empty() {
                reached_entry = true;
            }
            stack.extend(preds);
        }
        if reached_entry { Outcome::PassThrough } else { Outcome::Blocked }
    }

    fn summarize_back(
        &self,
        callee: MethodId,
        target: StmtRef,
        blockers: &HashSet<StmtRef>,
        memo: &mut HashMap<MethodId, Outcome>,
    ) -> Outcome {
        if let Some(outcome) = memo.get(&callee) {
            return *outcome;
        }
        // Recursive re-entry while the callee is being summarized.
        memo.insert(callee, Outcome::PassThrough);
        let tails: Vec<u32> = self
            .cfgs
            .get(&callee)
            .map(|cfg| cfg.tails())
            .unwrap_or_default()
            .into_iter()
            .filter(|t| self.in_slice(StmtRef::new(callee, *t)))
            .collect();
        let outcome = if tails.is_empty() {
            Outcome::PassThrough
        } else {
            self.walk_back(callee, tails, target, blockers, memo)
        };
        memo.insert(callee, outcome);
        outcome
    }

    // ------------------------------------------------------------------------
    // Releases: forward from the entries
    // ------------------------------------------------------------------------

    fn is_guaranteed(&self, release: &Label) -> bool {
        let mut memo = HashMap::new();
        self.roots.iter().any(|root| {
            self.in_slice(StmtRef::new(*root, 0))
                && self.walk_forward(*root, release.site, &mut memo) == Outcome::Blocked
        })
    }

    /// `Blocked` when every path from the entry of `method` meets `target`.
    fn walk_forward(&self, method: MethodId, target: StmtRef, memo: &mut HashMap<MethodId, Outcome>) -> Outcome {
        let mut stack = vec![0];
        let mut seen = HashSet::new();
        while let Some(idx) = stack.pop() {
            let site = StmtRef::new(method, idx);
            if !self.in_slice(site) || !seen.insert(idx) {
                continue;
            }
            if site == target {
                continue;
            }
            let callees = self.callees_at(site);
            if !callees.is_empty() && callees.iter().all(|c| self.summarize_forward(*c, target, memo) == Outcome::Blocked)
            {
                continue;
            }
            let succs = self.slice_succs(site);
            if succs.is_empty() {
                return Outcome::PassThrough;
            }
            stack.extend(succs);
        }
        Outcome::Blocked
    }

    fn summarize_forward(&self, callee: MethodId, target: StmtRef, memo: &mut HashMap<MethodId, Outcome>) -> Outcome {
        if let Some(outcome) = memo.get(&callee) {
            return *outcome;
        }
        memo.insert(callee, Outcome::PassThrough);
        let outcome = if self.in_slice(StmtRef::new(callee, 0)) {
            self.walk_forward(callee, target, memo)
        } else {
            Outcome::PassThrough
        };
        memo.insert(callee, outcome);
        outcome
    }
}
