use crate::analysis::label::ObjectId;
use crate::framework_catalog::Resource;
use crate::stg::{Event, State};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// A listener class still registered at the end of a lifecycle path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakedListener {
    pub resource: Resource,
    /// Class of the listener object's allocation site.
    pub listener: String,
    /// Sensor types still registered; `*` when the sensor was not resolved.
    pub objects: Vec<ObjectId>,
}

impl fmt::Display for LeakedListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let objects = self.objects.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        write!(f, "{} {} [{objects}]", self.resource.as_str(), self.listener)
    }
}

/// Listeners left registered after replaying `events` from `Null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use]
pub struct LeakFinding {
    pub engine: String,
    pub events: Vec<Event>,
    pub end_state: State,
    pub listeners: Vec<LeakedListener>,
}

impl LeakFinding {
    pub fn event_path(&self) -> String {
        let events = self.events.iter().map(|e| e.as_str()).collect::<Vec<_>>().join(", ");
        format!("[{events}]")
    }
}

/// Opaque colors drawn in ambient mode that interactive mode does not match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use]
pub struct ColorFinding {
    pub engine: String,
    pub ambient: BTreeSet<String>,
    pub interactive: BTreeSet<String>,
    pub equal: bool,
}

/// Anti-aliasing switched on while entering ambient mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use]
pub struct AntiAliasFinding {
    pub engine: String,
    pub callback: String,
}

/// Everything one detector run produced, before levels are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectorReport {
    pub leaks: Vec<LeakFinding>,
    pub colors: Vec<ColorFinding>,
    pub anti_alias: Vec<AntiAliasFinding>,
}

impl DetectorReport {
    pub fn is_empty(&self) -> bool {
        self.leaks.is_empty() && self.colors.is_empty() && self.anti_alias.is_empty()
    }
}
