//! Flow-insensitive alias map used to resolve branch operands and API
//! arguments to constants.

use crate::program::{MethodId, Operand, Slot};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Something a slot may have been assigned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AliasTarget {
    Slot(Slot),
    Const(i32),
}

impl AliasTarget {
    /// Alias target for an operand; `None` for values that never resolve.
    pub fn from_operand(method: MethodId, operand: &Operand) -> Option<Self> {
        if let Some(slot) = operand.slot(method) {
            return Some(AliasTarget::Slot(slot));
        }
        operand_constant(operand).map(AliasTarget::Const)
    }
}

/// Integer value of a literal operand. Float literals only count when they
/// are exactly `0.0` or `1.0`, the encodings of `false` and `true`.
pub fn operand_constant(operand: &Operand) -> Option<i32> {
    match operand {
        Operand::Int(v) => Some(*v),
        Operand::Float(f) if *f == 0.0 => Some(0),
        Operand::Float(f) if *f == 1.0 => Some(1),
        _ => None,
    }
}

#[derive(Debug, Default, Clone)]
pub struct AliasTracker {
    edges: HashMap<Slot, BTreeSet<AliasTarget>>,
}

/// Handle on one slot's alias edges, returned by [`AliasTracker::of`].
pub struct AliasNode<'a> {
    targets: &'a mut BTreeSet<AliasTarget>,
}

impl AliasNode<'_> {
    /// Add an edge.
    pub fn to(self, target: AliasTarget) {
        self.targets.insert(target);
    }

    /// Replace every edge with a single one.
    pub fn only_to(self, target: AliasTarget) {
        self.targets.clear();
        self.targets.insert(target);
    }
}

impl AliasTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(&mut self, slot: Slot) -> AliasNode<'_> {
        AliasNode {
            targets: self.edges.entry(slot).or_default(),
        }
    }

    /// The unique constant reachable from `slot`, if there is exactly one.
    pub fn solve(&self, slot: Slot) -> Option<i32> {
        let mut visited = HashSet::new();
        self.solve_inner(slot, &mut visited)
    }

    fn solve_inner(&self, slot: Slot, visited: &mut HashSet<Slot>) -> Option<i32> {
        if !visited.insert(slot) {
            return None;
        }
        let targets = self.edges.get(&slot)?;
        let mut found = BTreeSet::new();
        for target in targets {
            let value = match target {
                AliasTarget::Const(c) => Some(*c),
                AliasTarget::Slot(next) => self.solve_inner(*next, visited),
            };
            found.extend(value);
        }
        if found.len() == 1 { found.pop_first() } else { None }
    }

    pub fn solve_operand(&self, method: MethodId, operand: &Operand) -> Option<i32> {
        match operand.slot(method) {
            Some(slot) => self.solve(slot),
            None => operand_constant(operand),
        }
    }

    pub fn clear_context(&mut self) {
        self.edges.clear();
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{FieldId, LocalId};

    const M: MethodId = MethodId(0);

    fn local(i: u32) -> Slot {
        Slot::Local(M, LocalId(i))
    }

    #[test]
    fn chain_resolves_to_unique_constant() {
        let mut aliases = AliasTracker::new();
        aliases.of(local(0)).to(AliasTarget::Slot(local(1)));
        aliases.of(local(1)).to(AliasTarget::Slot(Slot::Field(FieldId(3))));
        aliases.of(Slot::Field(FieldId(3))).to(AliasTarget::Const(7));
        assert_eq!(aliases.solve(local(0)), Some(7));
        // Solving twice gives the same answer.
        assert_eq!(aliases.solve(local(0)), Some(7));
    }

    #[test]
    fn cycles_and_conflicts_are_unknown() {
        let mut aliases = AliasTracker::new();
        aliases.of(local(0)).to(AliasTarget::Slot(local(1)));
        aliases.of(local(1)).to(AliasTarget::Slot(local(0)));
        assert_eq!(aliases.solve(local(0)), None);

        aliases.of(local(2)).to(AliasTarget::Const(1));
        aliases.of(local(2)).to(AliasTarget::Const(0));
        assert_eq!(aliases.solve(local(2)), None);
    }

    #[test]
    fn self_loop_terminates() {
        let mut aliases = AliasTracker::new();
        aliases.of(local(5)).to(AliasTarget::Slot(local(5)));
        assert_eq!(aliases.solve(local(5)), None);
    }

    #[test]
    fn only_to_replaces_previous_edges() {
        let mut aliases = AliasTracker::new();
        aliases.of(local(0)).to(AliasTarget::Const(1));
        aliases.of(local(0)).to(AliasTarget::Const(2));
        aliases.of(local(0)).only_to(AliasTarget::Const(0));
        assert_eq!(aliases.solve(local(0)), Some(0));
        aliases.clear_context();
        assert!(aliases.is_empty());
        assert_eq!(aliases.solve(local(0)), None);
    }

    #[test]
    fn float_booleans_collapse_to_ints() {
        assert_eq!(operand_constant(&Operand::Float(1.0)), Some(1));
        assert_eq!(operand_constant(&Operand::Float(0.0)), Some(0));
        assert_eq!(operand_constant(&Operand::Float(0.5)), None);
        let aliases = AliasTracker::new();
        assert_eq!(aliases.solve_operand(M, &Operand::Int(-3)), Some(-3));
    }
}
