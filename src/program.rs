//! In-memory program representation consumed by the analysis.
//!
//! The model is a small, Jimple-like three-address IR: classes with a
//! superclass/interface hierarchy, fields, and methods whose bodies are flat
//! statement lists in SSA form. Control flow is implicit (fall-through,
//! `If`/`Goto` targets, `Return`/`Throw` exits) and materialised on demand by
//! [`Cfg`]. Models are usually produced by an external front end and loaded
//! from JSON; tests build them with [`builder::ProgramBuilder`].

pub mod builder;

use crate::analysis_ensure;
use crate::error::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_type!(
    /// Index into [`Program::classes`].
    ClassId
);
id_type!(
    /// Index into [`Program::methods`].
    MethodId
);
id_type!(
    /// Index into [`Program::fields`].
    FieldId
);
id_type!(
    /// Index into a body's local table.
    LocalId
);

/// A statement, identified by its method and its position in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StmtRef {
    pub method: MethodId,
    pub index: u32,
}

impl StmtRef {
    pub fn new(method: MethodId, index: u32) -> Self {
        Self { method, index }
    }
}

impl fmt::Display for StmtRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}#{}", self.method.0, self.index)
    }
}

/// A trackable storage location: a method-local variable or a field.
///
/// Field accesses are canonicalised to the field itself, whatever the base
/// object, so every access path through one field shares a single slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    Local(MethodId, LocalId),
    Field(FieldId),
}

// ============================================================================
// Classes, fields, methods
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    #[default]
    Concrete,
    Abstract,
    Interface,
}

/// Where a class comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Application,
    Library,
    /// Referenced but never resolved by the front end.
    Phantom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    #[serde(default)]
    pub superclass: Option<ClassId>,
    #[serde(default)]
    pub interfaces: Vec<ClassId>,
    #[serde(default)]
    pub kind: ClassKind,
    #[serde(default)]
    pub origin: Origin,
}

impl Class {
    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    pub fn is_concrete(&self) -> bool {
        self.kind == ClassKind::Concrete
    }

    pub fn is_application(&self) -> bool {
        self.origin == Origin::Application
    }

    pub fn is_phantom(&self) -> bool {
        self.origin == Origin::Phantom
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub class: ClassId,
    pub ty: String,
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub class: ClassId,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default = "void_type")]
    pub ret: String,
    #[serde(default)]
    pub is_static: bool,
    /// Absent for abstract, native and library methods.
    #[serde(default)]
    pub body: Option<Body>,
}

fn void_type() -> String {
    "void".to_string()
}

impl Method {
    /// `ret name(p1,p2)`, the part of a signature that overriding preserves.
    pub fn sub_signature(&self) -> String {
        format!("{} {}({})", self.ret, self.name, self.params.join(","))
    }

    pub fn is_concrete(&self) -> bool {
        self.body.is_some()
    }
}

// ============================================================================
// Bodies and statements
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub locals: Vec<Local>,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Local {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    This,
    Param(u32),
    CaughtException,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn eval(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeKind {
    Static,
    Special,
    Virtual,
    Interface,
}

impl InvokeKind {
    /// Static and special calls bind to their declared target.
    pub fn is_direct(self) -> bool {
        matches!(self, InvokeKind::Static | InvokeKind::Special)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Local(LocalId),
    Field {
        field: FieldId,
        #[serde(default)]
        base: Option<LocalId>,
    },
    Int(i32),
    Float(f64),
    Str(String),
    Null,
}

impl Operand {
    pub fn slot(&self, method: MethodId) -> Option<Slot> {
        match self {
            Operand::Local(local) => Some(Slot::Local(method, *local)),
            Operand::Field { field, .. } => Some(Slot::Field(*field)),
            _ => None,
        }
    }

    pub fn as_local(&self) -> Option<LocalId> {
        match self {
            Operand::Local(local) => Some(*local),
            _ => None,
        }
    }
}

impl From<LocalId> for Operand {
    fn from(local: LocalId) -> Self {
        Operand::Local(local)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Int(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Str(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Place {
    Local(LocalId),
    Field {
        field: FieldId,
        #[serde(default)]
        base: Option<LocalId>,
    },
}

impl Place {
    pub fn slot(&self, method: MethodId) -> Slot {
        match self {
            Place::Local(local) => Slot::Local(method, *local),
            Place::Field { field, .. } => Slot::Field(*field),
        }
    }
}

impl From<LocalId> for Place {
    fn from(local: LocalId) -> Self {
        Place::Local(local)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeExpr {
    pub kind: InvokeKind,
    /// Statically declared target.
    pub method: MethodId,
    #[serde(default)]
    pub receiver: Option<LocalId>,
    #[serde(default)]
    pub args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rvalue {
    Use(Operand),
    New(ClassId),
    /// SSA merge of one operand per incoming edge.
    Phi(Vec<Operand>),
    Or(Operand, Operand),
    Cast(Operand),
    Invoke(InvokeExpr),
    /// Any other expression (arithmetic, array access, instanceof, ...).
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    Identity {
        local: LocalId,
        source: IdentitySource,
    },
    Assign {
        lhs: Place,
        rhs: Rvalue,
    },
    Invoke(InvokeExpr),
    If {
        lhs: Operand,
        cmp: CmpOp,
        rhs: Operand,
        target: u32,
    },
    Goto {
        target: u32,
    },
    Return(Option<Operand>),
    Throw(Operand),
    Nop,
}

impl Stmt {
    pub fn invoke(&self) -> Option<&InvokeExpr> {
        match self {
            Stmt::Invoke(expr) => Some(expr),
            Stmt::Assign {
                rhs: Rvalue::Invoke(expr),
                ..
            } => Some(expr),
            _ => None,
        }
    }

    /// The local written by this statement, if any.
    pub fn defined_local(&self) -> Option<LocalId> {
        match self {
            Stmt::Identity { local, .. } => Some(*local),
            Stmt::Assign {
                lhs: Place::Local(local),
                ..
            } => Some(*local),
            _ => None,
        }
    }
}

// ============================================================================
// Control-flow graph
// ============================================================================

/// Statement-level control-flow graph of one body.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    succs: Vec<Vec<u32>>,
    preds: Vec<Vec<u32>>,
}

impl Cfg {
    pub fn new(body: &Body) -> Self {
        let len = body.stmts.len();
        let mut succs = vec![Vec::new(); len];
        let mut preds = vec![Vec::new(); len];
        for (idx, stmt) in body.stmts.iter().enumerate() {
            let next = idx as u32 + 1;
            let mut out = Vec::with_capacity(2);
            match stmt {
                Stmt::Return(_) | Stmt::Throw(_) => {}
                Stmt::Goto { target } => out.push(*target),
                Stmt::If { target, .. } => {
                    if (next as usize) < len {
                        out.push(next);
                    }
                    if !out.contains(target) {
                        out.push(*target);
                    }
                }
                _ => {
                    if (next as usize) < len {
                        out.push(next);
                    }
                }
            }
            for succ in &out {
                if (*succ as usize) < len {
                    preds[*succ as usize].push(idx as u32);
                }
            }
            out.retain(|s| (*s as usize) < len);
            succs[idx] = out;
        }
        Self { succs, preds }
    }

    pub fn len(&self) -> usize {
        self.succs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.succs.is_empty()
    }

    pub fn succs(&self, idx: u32) -> &[u32] {
        self.succs.get(idx as usize).map_or(&[], Vec::as_slice)
    }

    pub fn preds(&self, idx: u32) -> &[u32] {
        self.preds.get(idx as usize).map_or(&[], Vec::as_slice)
    }

    pub fn heads(&self) -> Vec<u32> {
        if self.is_empty() { Vec::new() } else { vec![0] }
    }

    pub fn tails(&self) -> Vec<u32> {
        (0..self.len() as u32)
            .filter(|idx| self.succs(*idx).is_empty())
            .collect()
    }
}

impl Body {
    pub fn stmt(&self, idx: u32) -> Option<&Stmt> {
        self.stmts.get(idx as usize)
    }

    pub fn local(&self, local: LocalId) -> Option<&Local> {
        self.locals.get(local.index())
    }

    pub fn cfg(&self) -> Cfg {
        Cfg::new(self)
    }

    /// Unique SSA definition of `local`, if the body defines it at all.
    pub fn definition_of(&self, local: LocalId) -> AnalysisResult<Option<u32>> {
        let mut defs = self
            .stmts
            .iter()
            .enumerate()
            .filter(|(_, s)| s.defined_local() == Some(local))
            .map(|(idx, _)| idx as u32);
        let first = defs.next();
        analysis_ensure!(
            first.is_none() || defs.next().is_none(),
            "local `{}` has more than one definition in an SSA body",
            self.local(local).map_or("?", |l| l.name.as_str())
        );
        Ok(first)
    }

    /// The identity statement binding `source`, if present.
    pub fn identity_for(&self, source: IdentitySource) -> Option<(u32, LocalId)> {
        self.stmts.iter().enumerate().find_map(|(idx, s)| match s {
            Stmt::Identity { local, source: src } if *src == source => Some((idx as u32, *local)),
            _ => None,
        })
    }
}

// ============================================================================
// Program
// ============================================================================

#[derive(Debug, Clone, Default)]
struct ProgramIndex {
    by_name: HashMap<String, ClassId>,
    methods_of: Vec<Vec<MethodId>>,
}

/// A whole program: every class, field and method the front end resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub classes: Vec<Class>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub methods: Vec<Method>,
    #[serde(skip)]
    index: OnceLock<ProgramIndex>,
}

impl Program {
    pub fn new(classes: Vec<Class>, fields: Vec<Field>, methods: Vec<Method>) -> Self {
        Self {
            classes,
            fields,
            methods,
            index: OnceLock::new(),
        }
    }

    /// Parse and validate a JSON program model.
    pub fn from_json(raw: &str) -> AnalysisResult<Self> {
        let program: Program = serde_json::from_str(raw)?;
        program.validate()?;
        Ok(program)
    }

    pub fn load(path: &Path) -> AnalysisResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
            .map_err(|err| AnalysisError::model(format!("{}: {err}", path.display())))
    }

    pub fn to_json(&self) -> AnalysisResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn index(&self) -> &ProgramIndex {
        self.index.get_or_init(|| {
            let mut index = ProgramIndex {
                by_name: HashMap::with_capacity(self.classes.len()),
                methods_of: vec![Vec::new(); self.classes.len()],
            };
            for (idx, class) in self.classes.iter().enumerate() {
                index.by_name.insert(class.name.clone(), ClassId(idx as u32));
            }
            for (idx, method) in self.methods.iter().enumerate() {
                if let Some(list) = index.methods_of.get_mut(method.class.index()) {
                    list.push(MethodId(idx as u32));
                }
            }
            index
        })
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.index()]
    }

    pub fn body(&self, id: MethodId) -> Option<&Body> {
        self.method(id).body.as_ref()
    }

    pub fn stmt(&self, at: StmtRef) -> Option<&Stmt> {
        self.body(at.method).and_then(|b| b.stmt(at.index))
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.index().by_name.get(name).copied()
    }

    /// Methods declared by `class` itself (inherited ones excluded).
    pub fn methods_of(&self, class: ClassId) -> &[MethodId] {
        self.index()
            .methods_of
            .get(class.index())
            .map_or(&[], Vec::as_slice)
    }

    /// Declared method of `class` with the given sub-signature.
    pub fn declared_method(&self, class: ClassId, sub_signature: &str) -> Option<MethodId> {
        self.methods_of(class)
            .iter()
            .copied()
            .find(|m| self.method(*m).sub_signature() == sub_signature)
    }

    /// `<pkg.Class: ret name(params)>`
    pub fn signature(&self, method: MethodId) -> String {
        let m = self.method(method);
        format!("<{}: {}>", self.class(m.class).name, m.sub_signature())
    }

    pub fn class_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        (0..self.classes.len() as u32).map(ClassId)
    }

    pub fn application_classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.class_ids().filter(|c| self.class(*c).is_application())
    }

    /// Static type of a local, resolved to a class when it names one.
    pub fn local_class(&self, method: MethodId, local: LocalId) -> Option<ClassId> {
        let ty = &self.body(method)?.local(local)?.ty;
        self.class_by_name(ty)
    }

    /// Demote application classes living under third-party package prefixes.
    pub fn demote_library_prefixes<S: AsRef<str>>(&mut self, prefixes: &[S]) -> usize {
        let mut demoted = 0;
        for class in &mut self.classes {
            if class.origin == Origin::Application
                && prefixes.iter().any(|p| class.name.starts_with(p.as_ref()))
            {
                class.origin = Origin::Library;
                demoted += 1;
            }
        }
        demoted
    }

    /// Check that every cross reference in the model points somewhere.
    pub fn validate(&self) -> AnalysisResult<()> {
        let classes = self.classes.len();
        let class_ok = |c: ClassId| c.index() < classes;
        for class in &self.classes {
            let refs = class.superclass.iter().chain(class.interfaces.iter());
            for parent in refs {
                if !class_ok(*parent) {
                    return Err(AnalysisError::model(format!(
                        "class `{}` references unknown class #{}",
                        class.name, parent.0
                    )));
                }
            }
        }
        for field in &self.fields {
            if !class_ok(field.class) {
                return Err(AnalysisError::model(format!(
                    "field `{}` declared by unknown class #{}",
                    field.name, field.class.0
                )));
            }
        }
        for (idx, method) in self.methods.iter().enumerate() {
            if !class_ok(method.class) {
                return Err(AnalysisError::model(format!(
                    "method `{}` declared by unknown class #{}",
                    method.name, method.class.0
                )));
            }
            if let Some(body) = &method.body {
                self.validate_body(MethodId(idx as u32), body)?;
            }
        }
        Ok(())
    }

    fn validate_body(&self, method: MethodId, body: &Body) -> AnalysisResult<()> {
        let where_ = || self.signature(method);
        let locals = body.locals.len();
        let stmts = body.stmts.len();
        let local_ok = |l: &LocalId| l.index() < locals;
        let class_ok = |c: ClassId| c.index() < self.classes.len();
        let operand_ok = |op: &Operand| match op {
            Operand::Local(l) => local_ok(l),
            Operand::Field { field, base } => {
                field.index() < self.fields.len() && base.as_ref().is_none_or(local_ok)
            }
            _ => true,
        };
        let invoke_ok = |ie: &InvokeExpr| {
            ie.method.index() < self.methods.len()
                && ie.receiver.as_ref().is_none_or(local_ok)
                && ie.args.iter().all(operand_ok)
        };
        for stmt in &body.stmts {
            let ok = match stmt {
                Stmt::Identity { local, .. } => local_ok(local),
                Stmt::Assign { lhs, rhs } => {
                    let lhs_ok = match lhs {
                        Place::Local(l) => local_ok(l),
                        Place::Field { field, base } => {
                            field.index() < self.fields.len()
                                && base.as_ref().is_none_or(local_ok)
                        }
                    };
                    let rhs_ok = match rhs {
                        Rvalue::Use(op) | Rvalue::Cast(op) => operand_ok(op),
                        Rvalue::New(class) => class_ok(*class),
                        Rvalue::Phi(ops) => ops.iter().all(operand_ok),
                        Rvalue::Or(a, b) => operand_ok(a) && operand_ok(b),
                        Rvalue::Invoke(ie) => invoke_ok(ie),
                        Rvalue::Other => true,
                    };
                    lhs_ok && rhs_ok
                }
                Stmt::Invoke(ie) => invoke_ok(ie),
                Stmt::If {
                    lhs, rhs, target, ..
                } => operand_ok(lhs) && operand_ok(rhs) && (*target as usize) < stmts,
                Stmt::Goto { target } => (*target as usize) < stmts,
                Stmt::Return(op) => op.as_ref().is_none_or(operand_ok),
                Stmt::Throw(op) => operand_ok(op),
                Stmt::Nop => true,
            };
            if !ok {
                return Err(AnalysisError::model(format!(
                    "dangling reference in body of {}: {stmt:?}",
                    where_()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(stmts: Vec<Stmt>) -> Body {
        Body {
            locals: vec![Local {
                name: "z0".into(),
                ty: "boolean".into(),
            }],
            stmts,
        }
    }

    #[test]
    fn cfg_follows_branches_and_exits() {
        let b = body(vec![
            Stmt::Identity {
                local: LocalId(0),
                source: IdentitySource::Param(0),
            },
            Stmt::If {
                lhs: Operand::Local(LocalId(0)),
                cmp: CmpOp::Eq,
                rhs: Operand::Int(0),
                target: 4,
            },
            Stmt::Nop,
            Stmt::Return(None),
            Stmt::Nop,
            Stmt::Goto { target: 3 },
        ]);
        let cfg = b.cfg();
        assert_eq!(cfg.succs(1), &[2, 4]);
        assert_eq!(cfg.succs(3), &[] as &[u32]);
        assert_eq!(cfg.preds(3), &[2, 5]);
        assert_eq!(cfg.heads(), vec![0]);
        assert_eq!(cfg.tails(), vec![3]);
    }

    #[test]
    fn duplicate_definitions_are_a_consistency_error() {
        let b = body(vec![
            Stmt::Assign {
                lhs: Place::Local(LocalId(0)),
                rhs: Rvalue::Use(Operand::Int(1)),
            },
            Stmt::Assign {
                lhs: Place::Local(LocalId(0)),
                rhs: Rvalue::Use(Operand::Int(2)),
            },
        ]);
        let err = b.definition_of(LocalId(0)).unwrap_err();
        assert!(matches!(err, AnalysisError::Consistency(_)));
    }

    #[test]
    fn validate_rejects_dangling_targets() {
        let program = Program::new(
            vec![Class {
                name: "a.B".into(),
                superclass: None,
                interfaces: vec![],
                kind: ClassKind::Concrete,
                origin: Origin::Application,
            }],
            vec![],
            vec![Method {
                name: "m".into(),
                class: ClassId(0),
                params: vec![],
                ret: "void".into(),
                is_static: true,
                body: Some(body(vec![Stmt::Goto { target: 9 }])),
            }],
        );
        assert!(matches!(program.validate(), Err(AnalysisError::Model(_))));
    }

    #[test]
    fn library_prefixes_demote_bundled_classes() {
        let mk = |name: &str| Class {
            name: name.into(),
            superclass: None,
            interfaces: vec![],
            kind: ClassKind::Concrete,
            origin: Origin::Application,
        };
        let mut program = Program::new(vec![mk("okio.Buffer"), mk("com.acme.Face")], vec![], vec![]);
        assert_eq!(program.demote_library_prefixes(&["okio.", "rx."]), 1);
        assert!(!program.class(ClassId(0)).is_application());
        assert!(program.class(ClassId(1)).is_application());
    }
}
