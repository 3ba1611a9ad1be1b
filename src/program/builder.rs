//! Programmatic construction of [`Program`] models.
//!
//! ```
//! use wearleak::program::builder::ProgramBuilder;
//! use wearleak::program::{Operand, Rvalue};
//!
//! let mut b = ProgramBuilder::new();
//! let object = b.library_class("java.lang.Object", None);
//! let app = b.app_class("com.acme.Main", Some(object));
//! let run = b.method(app, "run", &["int"], "void", false);
//! let mut body = b.body_for(run);
//! let p0 = body.param_local(0);
//! let copy = body.local("i1", "int");
//! body.assign(copy, Rvalue::Use(Operand::Local(p0)));
//! body.ret(None);
//! b.set_body(run, body).unwrap();
//! let program = b.finish().unwrap();
//! assert_eq!(program.signature(run), "<com.acme.Main: void run(int)>");
//! ```

use super::{
    Body, Class, ClassId, ClassKind, CmpOp, Field, FieldId, IdentitySource, InvokeExpr,
    InvokeKind, Local, LocalId, Method, MethodId, Operand, Origin, Place, Program, Rvalue, Stmt,
};
use crate::error::{AnalysisError, AnalysisResult};

#[derive(Debug, Default)]
pub struct ProgramBuilder {
    classes: Vec<Class>,
    fields: Vec<Field>,
    methods: Vec<Method>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(
        &mut self,
        name: &str,
        superclass: Option<ClassId>,
        kind: ClassKind,
        origin: Origin,
    ) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(Class {
            name: name.to_string(),
            superclass,
            interfaces: Vec::new(),
            kind,
            origin,
        });
        id
    }

    pub fn app_class(&mut self, name: &str, superclass: Option<ClassId>) -> ClassId {
        self.class(name, superclass, ClassKind::Concrete, Origin::Application)
    }

    pub fn library_class(&mut self, name: &str, superclass: Option<ClassId>) -> ClassId {
        self.class(name, superclass, ClassKind::Concrete, Origin::Library)
    }

    pub fn interface(&mut self, name: &str, origin: Origin) -> ClassId {
        self.class(name, None, ClassKind::Interface, origin)
    }

    pub fn implements(&mut self, class: ClassId, interface: ClassId) {
        self.classes[class.index()].interfaces.push(interface);
    }

    pub fn set_kind(&mut self, class: ClassId, kind: ClassKind) {
        self.classes[class.index()].kind = kind;
    }

    pub fn field(&mut self, class: ClassId, name: &str, ty: &str) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(Field {
            name: name.to_string(),
            class,
            ty: ty.to_string(),
            is_static: false,
        });
        id
    }

    /// Declare a method without a body.
    pub fn method(
        &mut self,
        class: ClassId,
        name: &str,
        params: &[&str],
        ret: &str,
        is_static: bool,
    ) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(Method {
            name: name.to_string(),
            class,
            params: params.iter().map(|p| p.to_string()).collect(),
            ret: ret.to_string(),
            is_static,
            body: None,
        });
        id
    }

    /// Look up a declared method, declaring it on first use.
    pub fn method_by_name(
        &mut self,
        class: ClassId,
        name: &str,
        params: &[&str],
        ret: &str,
    ) -> MethodId {
        let existing = self.methods.iter().position(|m| {
            m.class == class && m.name == name && m.ret == ret && m.params == params
        });
        match existing {
            Some(idx) => MethodId(idx as u32),
            None => self.method(class, name, params, ret, false),
        }
    }

    /// Start a body for `method`, pre-seeded with its identity statements.
    pub fn body_for(&self, method: MethodId) -> BodyBuilder {
        let m = &self.methods[method.index()];
        let this_ty = (!m.is_static).then(|| self.classes[m.class.index()].name.clone());
        BodyBuilder::new(this_ty, &m.params)
    }

    pub fn set_body(&mut self, method: MethodId, body: BodyBuilder) -> AnalysisResult<()> {
        let body = body.finish()?;
        self.methods[method.index()].body = Some(body);
        Ok(())
    }

    pub fn finish(self) -> AnalysisResult<Program> {
        let program = Program::new(self.classes, self.fields, self.methods);
        program.validate()?;
        Ok(program)
    }
}

/// Forward-referenceable jump target inside a [`BodyBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Default)]
pub struct BodyBuilder {
    locals: Vec<Local>,
    stmts: Vec<Stmt>,
    this_local: Option<LocalId>,
    param_locals: Vec<LocalId>,
    labels: Vec<Option<u32>>,
    /// (statement index, label) pairs whose target is patched in `finish`.
    fixups: Vec<(usize, Label)>,
}

impl BodyBuilder {
    fn new(this_ty: Option<String>, params: &[String]) -> Self {
        let mut body = Self::default();
        if let Some(ty) = this_ty {
            let local = body.local("r0", &ty);
            body.stmts.push(Stmt::Identity {
                local,
                source: IdentitySource::This,
            });
            body.this_local = Some(local);
        }
        for (idx, ty) in params.iter().enumerate() {
            let local = body.local(&format!("p{idx}"), ty);
            body.stmts.push(Stmt::Identity {
                local,
                source: IdentitySource::Param(idx as u32),
            });
            body.param_locals.push(local);
        }
        body
    }

    /// A body with no identity statements at all.
    pub fn raw() -> Self {
        Self::default()
    }

    /// # Panics
    /// When the method is static.
    pub fn this_local(&self) -> LocalId {
        self.this_local.expect("static methods have no `this`")
    }

    /// # Panics
    /// When `idx` is out of range.
    pub fn param_local(&self, idx: usize) -> LocalId {
        self.param_locals[idx]
    }

    pub fn local(&mut self, name: &str, ty: &str) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(Local {
            name: name.to_string(),
            ty: ty.to_string(),
        });
        id
    }

    pub fn push(&mut self, stmt: Stmt) -> u32 {
        self.stmts.push(stmt);
        self.stmts.len() as u32 - 1
    }

    pub fn assign(&mut self, lhs: impl Into<Place>, rhs: Rvalue) -> u32 {
        self.push(Stmt::Assign {
            lhs: lhs.into(),
            rhs,
        })
    }

    pub fn copy(&mut self, lhs: LocalId, rhs: impl Into<Operand>) -> u32 {
        self.assign(lhs, Rvalue::Use(rhs.into()))
    }

    pub fn store_field(&mut self, base: LocalId, field: FieldId, value: impl Into<Operand>) -> u32 {
        self.assign(
            Place::Field {
                field,
                base: Some(base),
            },
            Rvalue::Use(value.into()),
        )
    }

    pub fn load_field(&mut self, lhs: LocalId, base: LocalId, field: FieldId) -> u32 {
        self.assign(
            lhs,
            Rvalue::Use(Operand::Field {
                field,
                base: Some(base),
            }),
        )
    }

    pub fn new_object(&mut self, lhs: LocalId, class: ClassId) -> u32 {
        self.assign(lhs, Rvalue::New(class))
    }

    pub fn call(
        &mut self,
        kind: InvokeKind,
        method: MethodId,
        receiver: Option<LocalId>,
        args: Vec<Operand>,
    ) -> u32 {
        self.push(Stmt::Invoke(InvokeExpr {
            kind,
            method,
            receiver,
            args,
        }))
    }

    pub fn call_assign(
        &mut self,
        lhs: LocalId,
        kind: InvokeKind,
        method: MethodId,
        receiver: Option<LocalId>,
        args: Vec<Operand>,
    ) -> u32 {
        self.assign(
            lhs,
            Rvalue::Invoke(InvokeExpr {
                kind,
                method,
                receiver,
                args,
            }),
        )
    }

    pub fn virtual_call(&mut self, receiver: LocalId, method: MethodId, args: Vec<Operand>) -> u32 {
        self.call(InvokeKind::Virtual, method, Some(receiver), args)
    }

    pub fn static_call(&mut self, method: MethodId, args: Vec<Operand>) -> u32 {
        self.call(InvokeKind::Static, method, None, args)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next statement pushed.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.stmts.len() as u32);
    }

    pub fn branch(
        &mut self,
        lhs: impl Into<Operand>,
        cmp: CmpOp,
        rhs: impl Into<Operand>,
        target: Label,
    ) -> u32 {
        let idx = self.push(Stmt::If {
            lhs: lhs.into(),
            cmp,
            rhs: rhs.into(),
            target: u32::MAX,
        });
        self.fixups.push((idx as usize, target));
        idx
    }

    pub fn goto(&mut self, target: Label) -> u32 {
        let idx = self.push(Stmt::Goto { target: u32::MAX });
        self.fixups.push((idx as usize, target));
        idx
    }

    pub fn ret(&mut self, value: Option<Operand>) -> u32 {
        self.push(Stmt::Return(value))
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    pub fn finish(mut self) -> AnalysisResult<Body> {
        for (idx, label) in std::mem::take(&mut self.fixups) {
            let Some(target) = self.labels[label.0] else {
                return Err(AnalysisError::model(format!("label {} never bound", label.0)));
            };
            if target as usize >= self.stmts.len() {
                return Err(AnalysisError::model(format!(
                    "label {} bound past the last statement",
                    label.0
                )));
            }
            match &mut self.stmts[idx] {
                Stmt::If { target: t, .. } | Stmt::Goto { target: t } => *t = target,
                other => {
                    return Err(AnalysisError::model(format!(
                        "jump fixup on non-jump statement {other:?}"
                    )));
                }
            }
        }
        Ok(Body {
            locals: self.locals,
            stmts: self.stmts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_starts_with_identity_bindings() {
        let mut b = ProgramBuilder::new();
        let c = b.app_class("a.C", None);
        let m = b.method(c, "onVisibilityChanged", &["boolean"], "void", false);
        let mut body = b.body_for(m);
        let skip = body.new_label();
        body.branch(body.param_local(0), CmpOp::Eq, 0, skip);
        body.bind(skip);
        body.ret(None);
        b.set_body(m, body).unwrap();
        let program = b.finish().unwrap();

        let body = program.body(m).unwrap();
        assert!(matches!(
            body.stmts[0],
            Stmt::Identity {
                source: IdentitySource::This,
                ..
            }
        ));
        assert!(matches!(body.stmts[2], Stmt::If { target: 3, .. }));
        assert_eq!(program.method(m).sub_signature(), "void onVisibilityChanged(boolean)");
    }

    #[test]
    fn unbound_label_is_rejected() {
        let mut body = BodyBuilder::raw();
        let nowhere = body.new_label();
        body.goto(nowhere);
        assert!(body.finish().is_err());
    }

    #[test]
    fn json_round_trip_preserves_bodies() {
        let mut b = ProgramBuilder::new();
        let c = b.app_class("a.C", None);
        let m = b.method(c, "run", &[], "void", false);
        let mut body = b.body_for(m);
        let i = body.local("i0", "int");
        body.copy(i, 7);
        body.ret(None);
        b.set_body(m, body).unwrap();
        let program = b.finish().unwrap();

        let back = Program::from_json(&program.to_json().unwrap()).unwrap();
        assert_eq!(back.body(m).unwrap().stmts, program.body(m).unwrap().stmts);
        assert_eq!(back.class_by_name("a.C"), Some(c));
    }
}
