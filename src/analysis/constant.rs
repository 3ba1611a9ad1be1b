//! Constant lattice tracking, the alternative branch resolver to the alias map.

use super::alias::operand_constant;
use crate::program::{MethodId, Operand, Rvalue, Slot};
use std::collections::HashMap;
use std::fmt;

/// `Top` = nothing seen yet, `Bottom` = not a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lattice {
    #[default]
    Top,
    Bottom,
    Const(i32),
}

impl Lattice {
    pub fn merge(self, other: Lattice) -> Lattice {
        match (self, other) {
            (Lattice::Top, x) | (x, Lattice::Top) => x,
            (Lattice::Bottom, _) | (_, Lattice::Bottom) => Lattice::Bottom,
            (Lattice::Const(a), Lattice::Const(b)) if a == b => Lattice::Const(a),
            (Lattice::Const(_), Lattice::Const(_)) => Lattice::Bottom,
        }
    }

    pub fn constant(self) -> Option<i32> {
        match self {
            Lattice::Const(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for Lattice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lattice::Top => f.write_str("TOP"),
            Lattice::Bottom => f.write_str("BOTTOM"),
            Lattice::Const(c) => write!(f, "{c}"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConstantTracker {
    values: HashMap<Slot, Lattice>,
}

impl ConstantTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: Slot) -> Lattice {
        self.values.get(&slot).copied().unwrap_or_default()
    }

    /// Overwrite the value of `slot`.
    pub fn set(&mut self, slot: Slot, value: Lattice) {
        self.values.insert(slot, value);
    }

    fn operand_value(&self, method: MethodId, operand: &Operand) -> Lattice {
        if let Some(slot) = operand.slot(method) {
            return self.get(slot);
        }
        operand_constant(operand).map_or(Lattice::Bottom, Lattice::Const)
    }

    /// Record `lhs = rhs` where `rhs` is evaluated in `method`.
    pub fn record(&mut self, method: MethodId, lhs: Slot, rhs: &Rvalue) {
        let old = self.get(lhs);
        let new = match rhs {
            Rvalue::Use(op) if op.slot(method).is_some() => old.merge(self.operand_value(method, op)),
            Rvalue::Use(op) => match operand_constant(op) {
                Some(c) => old.merge(Lattice::Const(c)),
                None => Lattice::Bottom,
            },
            Rvalue::Phi(inputs) => inputs
                .iter()
                .map(|op| self.operand_value(method, op))
                .fold(Lattice::Top, Lattice::merge),
            _ => Lattice::Bottom,
        };
        self.values.insert(lhs, new);
    }

    /// Record a formal parameter bound to an actual argument of a caller.
    pub fn record_binding(&mut self, formal: Slot, caller: MethodId, actual: &Operand) {
        let value = self.operand_value(caller, actual);
        let merged = self.get(formal).merge(value);
        self.values.insert(formal, merged);
    }

    pub fn solve(&self, slot: Slot) -> Option<i32> {
        self.get(slot).constant()
    }

    pub fn solve_operand(&self, method: MethodId, operand: &Operand) -> Option<i32> {
        match operand.slot(method) {
            Some(slot) => self.solve(slot),
            None => operand_constant(operand),
        }
    }

    pub fn clear_context(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::LocalId;

    const M: MethodId = MethodId(0);

    fn local(i: u32) -> Slot {
        Slot::Local(M, LocalId(i))
    }

    #[test]
    fn merge_laws() {
        let all = [Lattice::Top, Lattice::Bottom, Lattice::Const(1), Lattice::Const(2)];
        for x in all {
            assert_eq!(Lattice::Top.merge(x), x);
            assert_eq!(Lattice::Bottom.merge(x), Lattice::Bottom);
            for y in all {
                assert_eq!(x.merge(y), y.merge(x));
            }
        }
        assert_eq!(Lattice::Const(1).merge(Lattice::Const(1)), Lattice::Const(1));
        assert_eq!(Lattice::Const(1).merge(Lattice::Const(2)), Lattice::Bottom);
    }

    #[test]
    fn record_propagates_and_collapses() {
        let mut consts = ConstantTracker::new();
        consts.record(M, local(0), &Rvalue::Use(Operand::Int(4)));
        consts.record(M, local(1), &Rvalue::Use(Operand::Local(LocalId(0))));
        assert_eq!(consts.solve(local(1)), Some(4));

        // A second, different constant makes the slot non-constant.
        consts.record(M, local(0), &Rvalue::Use(Operand::Int(5)));
        assert_eq!(consts.get(local(0)), Lattice::Bottom);

        consts.record(M, local(2), &Rvalue::Other);
        assert_eq!(consts.get(local(2)), Lattice::Bottom);
    }

    #[test]
    fn phi_ignores_undefined_inputs() {
        let mut consts = ConstantTracker::new();
        consts.record(M, local(0), &Rvalue::Use(Operand::Int(1)));
        let phi = Rvalue::Phi(vec![Operand::Local(LocalId(0)), Operand::Local(LocalId(9))]);
        consts.record(M, local(1), &phi);
        assert_eq!(consts.solve(local(1)), Some(1));

        consts.record(M, local(2), &Rvalue::Use(Operand::Int(2)));
        let conflicting = Rvalue::Phi(vec![Operand::Local(LocalId(0)), Operand::Local(LocalId(2))]);
        consts.record(M, local(3), &conflicting);
        assert_eq!(consts.get(local(3)), Lattice::Bottom);
    }
}
