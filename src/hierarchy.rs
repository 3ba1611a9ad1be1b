//! Class hierarchy queries and class-hierarchy-analysis (CHA) call resolution.

use crate::program::{ClassId, InvokeExpr, MethodId, Program};
use std::collections::BTreeSet;

pub const OBJECT_CLASS: &str = "java.lang.Object";

/// Subtype relation of one program, computed once up front.
#[derive(Debug)]
pub struct Hierarchy<'p> {
    program: &'p Program,
    /// Reflexive, transitive supertypes (superclasses and interfaces).
    supertypes: Vec<BTreeSet<ClassId>>,
    /// Reflexive, transitive subtypes.
    subtypes: Vec<BTreeSet<ClassId>>,
    object: Option<ClassId>,
}

impl<'p> Hierarchy<'p> {
    pub fn build(program: &'p Program) -> Self {
        let count = program.classes.len();
        let mut supertypes = vec![BTreeSet::new(); count];
        let mut subtypes = vec![BTreeSet::new(); count];

        for class in program.class_ids() {
            // Walk every ancestor; an unknown parent simply ends that chain.
            let mut stack = vec![class];
            let ancestors = &mut supertypes[class.index()];
            while let Some(cur) = stack.pop() {
                if cur.index() >= count || !ancestors.insert(cur) {
                    continue;
                }
                let c = program.class(cur);
                stack.extend(c.superclass);
                stack.extend(c.interfaces.iter().copied());
            }
            for ancestor in ancestors.iter() {
                subtypes[ancestor.index()].insert(class);
            }
        }

        Self {
            program,
            supertypes,
            subtypes,
            object: program.class_by_name(OBJECT_CLASS),
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn is_subtype(&self, child: ClassId, parent: ClassId) -> bool {
        if Some(parent) == self.object {
            return true;
        }
        self.supertypes
            .get(child.index())
            .is_some_and(|s| s.contains(&parent))
    }

    /// Is `class` a subtype of the class named `parent`?
    pub fn is_subtype_of_name(&self, class: ClassId, parent: &str) -> bool {
        self.program
            .class_by_name(parent)
            .is_some_and(|p| self.is_subtype(class, p))
    }

    pub fn subtypes_of(&self, class: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        self.subtypes.get(class.index()).into_iter().flatten().copied()
    }

    pub fn concrete_subtypes_of(&self, class: ClassId) -> Vec<ClassId> {
        self.subtypes_of(class)
            .filter(|c| self.program.class(*c).is_concrete())
            .collect()
    }

    /// Resolve the method a virtual call on an object of exactly `receiver`
    /// would run, by walking superclasses from `receiver` upward.
    pub fn virtual_dispatch(&self, static_target: MethodId, receiver: ClassId) -> Option<MethodId> {
        let sub_signature = self.program.method(static_target).sub_signature();
        let mut seen = BTreeSet::new();
        let mut cur = Some(receiver);
        while let Some(class) = cur {
            if class.index() >= self.program.classes.len() || !seen.insert(class) {
                break;
            }
            if let Some(m) = self.program.declared_method(class, &sub_signature) {
                return Some(m);
            }
            cur = self.program.class(class).superclass;
        }
        None
    }

    /// Visit every application-code target of a virtual call whose receiver
    /// has static type `receiver_type`.
    pub fn cha(&self, static_target: MethodId, receiver_type: ClassId, mut visit: impl FnMut(MethodId)) {
        let mut seen = BTreeSet::new();
        for sub in self.concrete_subtypes_of(receiver_type) {
            let Some(target) = self.virtual_dispatch(static_target, sub) else {
                continue;
            };
            let declaring = self.program.method(target).class;
            if self.program.class(declaring).is_application() && seen.insert(target) {
                visit(target);
            }
        }
    }

    /// Application-code targets of a call made from `caller`.
    pub fn call_targets(&self, caller: MethodId, invoke: &InvokeExpr) -> Vec<MethodId> {
        if invoke.kind.is_direct() {
            let declaring = self.program.method(invoke.method).class;
            if self.program.class(declaring).is_application() {
                return vec![invoke.method];
            }
            return Vec::new();
        }
        let receiver_type = invoke
            .receiver
            .and_then(|r| self.program.local_class(caller, r));
        let Some(receiver_type) = receiver_type else {
            return Vec::new();
        };
        let mut targets = Vec::new();
        self.cha(invoke.method, receiver_type, |m| targets.push(m));
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ClassKind;
    use crate::program::builder::ProgramBuilder;

    struct Fixture {
        program: Program,
        base: ClassId,
        iface: ClassId,
        sub: ClassId,
        leaf: ClassId,
        lib: ClassId,
        base_run: MethodId,
        sub_run: MethodId,
        lib_run: MethodId,
    }

    fn fixture() -> Fixture {
        let mut b = ProgramBuilder::new();
        let object = b.library_class(OBJECT_CLASS, None);
        let iface = b.interface("a.Runner", crate::program::Origin::Application);
        let base = b.app_class("a.Base", Some(object));
        b.set_kind(base, ClassKind::Abstract);
        b.implements(base, iface);
        let sub = b.app_class("a.Sub", Some(base));
        let leaf = b.app_class("a.Leaf", Some(sub));
        let lib = b.library_class("lib.Impl", Some(base));
        let base_run = b.method(base, "run", &[], "void", false);
        let sub_run = b.method(sub, "run", &[], "void", false);
        let lib_run = b.method(lib, "run", &[], "void", false);
        Fixture {
            program: b.finish().unwrap(),
            base,
            iface,
            sub,
            leaf,
            lib,
            base_run,
            sub_run,
            lib_run,
        }
    }

    #[test]
    fn subtype_is_reflexive_transitive_and_object_rooted() {
        let f = fixture();
        let h = Hierarchy::build(&f.program);
        let leaf = f.leaf;
        assert!(h.is_subtype(leaf, leaf));
        assert!(h.is_subtype(leaf, f.base));
        assert!(h.is_subtype(leaf, f.iface));
        assert!(h.is_subtype(f.iface, f.program.class_by_name(OBJECT_CLASS).unwrap()));
        assert!(!h.is_subtype(f.base, f.sub));
    }

    #[test]
    fn dispatch_walks_superclasses() {
        let f = fixture();
        let h = Hierarchy::build(&f.program);
        let leaf = f.leaf;
        assert_eq!(h.virtual_dispatch(f.base_run, leaf), Some(f.sub_run));
        assert_eq!(h.virtual_dispatch(f.base_run, f.lib), Some(f.lib_run));
    }

    #[test]
    fn cha_only_yields_application_targets() {
        let f = fixture();
        let h = Hierarchy::build(&f.program);
        let mut seen = Vec::new();
        h.cha(f.base_run, f.iface, |m| seen.push(m));
        // Sub and Leaf both dispatch to Sub.run; the library override is never visited.
        assert_eq!(seen, vec![f.sub_run]);
    }

    #[test]
    fn cha_without_concrete_subtypes_visits_nothing() {
        let mut b = ProgramBuilder::new();
        let lonely = b.interface("a.Lonely", crate::program::Origin::Application);
        let m = b.method(lonely, "go", &[], "void", false);
        let program = b.finish().unwrap();
        let h = Hierarchy::build(&program);
        let mut count = 0;
        h.cha(m, lonely, |_| count += 1);
        assert_eq!(count, 0);
    }
}
