//! Acquire/release labels recorded at modeled listener calls.

use crate::flow_graph::AllocSite;
use crate::framework_catalog::{Resource, sensor_name};
use crate::program::StmtRef;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Acquire,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LabelName {
    pub kind: LabelKind,
    pub resource: Resource,
}

/// Object registered with a listener: a sensor type, or every object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectId {
    Any,
    Id(i32),
}

impl ObjectId {
    /// Does a release naming `self` cancel an acquire naming `other`?
    pub fn covers(self, other: ObjectId) -> bool {
        self == ObjectId::Any || self == other
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Any => f.write_str("*"),
            ObjectId::Id(id) => match sensor_name(*id) {
                Some(name) => write!(f, "{name}({id})"),
                None => write!(f, "{id}"),
            },
        }
    }
}

impl Serialize for ObjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ObjectId::Any => serializer.serialize_str("*"),
            ObjectId::Id(id) => serializer.serialize_i32(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    pub name: LabelName,
    /// Allocation site of the listener object.
    pub listener: AllocSite,
    pub object: ObjectId,
    /// The modeled call that produced the label.
    pub site: StmtRef,
}

impl Label {
    pub fn is_acquire(&self) -> bool {
        self.name.kind == LabelKind::Acquire
    }

    pub fn is_release(&self) -> bool {
        self.name.kind == LabelKind::Release
    }

    /// Does this release cancel `acquire`?
    pub fn releases(&self, acquire: &Label) -> bool {
        self.is_release()
            && acquire.is_acquire()
            && self.name.resource == acquire.name.resource
            && self.listener == acquire.listener
            && self.object.covers(acquire.object)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelId(u32);

/// Hands out one [`LabelId`] per distinct label, so summaries can hold ids.
#[derive(Debug, Default)]
pub struct LabelInterner {
    labels: Vec<Label>,
    ids: HashMap<Label, LabelId>,
}

impl LabelInterner {
    pub fn intern(&mut self, label: Label) -> LabelId {
        if let Some(id) = self.ids.get(&label) {
            return *id;
        }
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(label);
        self.ids.insert(label, id);
        id
    }

    pub fn get(&self, id: LabelId) -> &Label {
        &self.labels[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
