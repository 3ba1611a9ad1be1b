//! Registry of the finding kinds the detector produces.

use crate::level::Level;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckCategory {
    /// Battery drain from hardware left running.
    Energy,
    /// Ambient-mode display guidelines.
    Display,
}

impl CheckCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCategory::Energy => "energy",
            CheckCategory::Display => "display",
        }
    }
}

#[derive(Debug)]
pub struct CheckDescriptor {
    pub name: &'static str,
    pub category: CheckCategory,
    pub description: &'static str,
    pub default_level: Level,
    /// Long-form text printed by `wearleak explain`.
    pub explanation: &'static str,
}

pub static SENSOR_LEAK: CheckDescriptor = CheckDescriptor {
    name: "sensor_leak",
    category: CheckCategory::Energy,
    description: "Sensor or location listener still registered when the watch face enters ambient mode or is destroyed",
    default_level: Level::Error,
    explanation: "\
Replays every lifecycle path of bounded length from the unselected state
and tracks which listeners each callback registers and is guaranteed to
unregister. A listener that is still registered when the path ends in
ambient mode (or after the watch face is deselected) keeps the sensor
powered. Step counters are allowed in ambient mode, and listeners that
unregister themselves from onSensorChanged are not reported.",
};

pub static AMBIENT_COLOR: CheckDescriptor = CheckDescriptor {
    name: "ambient_color",
    category: CheckCategory::Display,
    description: "Ambient mode draws several non-grayscale colors that interactive mode does not",
    default_level: Level::Warn,
    explanation: "\
Compares the opaque colors set while entering ambient mode with those set
while leaving it, ignoring grayscale colors. Reported when the two sets
differ and ambient mode uses more than one disallowed color.",
};

pub static AMBIENT_ANTI_ALIAS: CheckDescriptor = CheckDescriptor {
    name: "ambient_anti_alias",
    category: CheckCategory::Display,
    description: "Anti-aliasing enabled while entering ambient mode",
    default_level: Level::Allow,
    explanation: "\
Low-bit ambient displays cannot render anti-aliased edges. Reported when a
Paint is given setAntiAlias(true) during onAmbientModeChanged(true) or
the onDraw that follows it.",
};

pub static CHECKS: &[&CheckDescriptor] = &[&SENSOR_LEAK, &AMBIENT_COLOR, &AMBIENT_ANTI_ALIAS];

pub fn find_check(name: &str) -> Option<&'static CheckDescriptor> {
    CHECKS.iter().copied().find(|c| c.name == name)
}

/// Effective level of each check after configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckSettings {
    levels: HashMap<String, Level>,
}

impl CheckSettings {
    #[must_use]
    pub fn with_levels(mut self, levels: impl IntoIterator<Item = (String, Level)>) -> Self {
        for (name, level) in levels {
            if find_check(&name).is_none() {
                tracing::warn!(check = %name, "unknown check in configuration");
            }
            self.levels.insert(name, level);
        }
        self
    }

    #[must_use]
    pub fn disable(mut self, disabled: impl IntoIterator<Item = String>) -> Self {
        for name in disabled {
            self.levels.insert(name, Level::Allow);
        }
        self
    }

    pub fn level_for(&self, check: &CheckDescriptor) -> Level {
        self.levels.get(check.name).copied().unwrap_or(check.default_level)
    }
}
