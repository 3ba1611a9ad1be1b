use crate::analysis::{AnalysisSettings, BranchResolution, DEFAULT_RECURSION_CAP};
use crate::checks::CheckSettings;
use crate::color::DEFAULT_AMBIENT_ALLOWED;
use crate::detector::{DEFAULT_PATH_LENGTH, DetectorSettings};
use crate::error::AnalysisError;
use crate::framework_catalog::SENSOR_TYPE_STEP_COUNTER;
use crate::level::Level;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE_NAME: &str = "wearleak.toml";

/// Class-name prefixes treated as library code even inside the application.
pub const DEFAULT_LIBRARY_PREFIXES: &[&str] = &[
    "android.",
    "com.google.",
    "rx.",
    "org.apache.",
    "okio.",
    "okhttp3.",
    "com.squareup.okhttp.",
    "com.fasterxml.",
    "org.joda.",
    "org.mozilla.",
];

#[derive(Debug, Default, Deserialize)]
pub struct WearleakConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub colors: ColorsConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub checks: ChecksConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub path_length: usize,
    pub recursion_cap: usize,
    pub branch_resolution: BranchResolution,
    pub library_prefixes: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            path_length: DEFAULT_PATH_LENGTH,
            recursion_cap: DEFAULT_RECURSION_CAP,
            branch_resolution: BranchResolution::default(),
            library_prefixes: DEFAULT_LIBRARY_PREFIXES.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    pub allowed_in_ambient: Vec<String>,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self {
            allowed_in_ambient: DEFAULT_AMBIENT_ALLOWED.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub benign_in_ambient: Vec<i32>,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            benign_in_ambient: vec![SENSOR_TYPE_STEP_COUNTER],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChecksConfig {
    #[serde(default)]
    pub disabled: Vec<String>,

    #[serde(flatten)]
    pub levels: HashMap<String, Level>,
}

impl WearleakConfig {
    /// Reject values no analysis can run with.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.analysis.path_length == 0 {
            return Err(AnalysisError::config("analysis.path_length must be at least 1"));
        }
        Ok(())
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            recursion_cap: self.analysis.recursion_cap,
            branch_resolution: self.analysis.branch_resolution,
        }
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            path_length: self.analysis.path_length,
            allowed_ambient_colors: self.colors.allowed_in_ambient.clone(),
            benign_ambient_sensors: self.sensors.benign_in_ambient.clone(),
        }
    }

    pub fn check_settings(&self) -> CheckSettings {
        CheckSettings::default()
            .with_levels(self.checks.levels.iter().map(|(k, v)| (k.clone(), *v)))
            .disable(self.checks.disabled.iter().cloned())
    }
}

pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut cur = Some(start_dir);
    while let Some(dir) = cur {
        let candidate = dir.join(DEFAULT_CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        cur = dir.parent();
    }
    None
}

pub fn load_config_file(path: &Path) -> Result<WearleakConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let cfg: WearleakConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    cfg.validate()
        .map_err(AnalysisError::into_anyhow)
        .with_context(|| format!("invalid config file: {}", path.display()))?;
    Ok(cfg)
}

pub fn load_config(explicit_path: Option<&Path>, start_dir: &Path) -> Result<Option<(PathBuf, WearleakConfig)>> {
    if let Some(p) = explicit_path {
        let cfg = load_config_file(p)?;
        return Ok(Some((p.to_path_buf(), cfg)));
    }

    let Some(p) = find_config_file(start_dir) else {
        return Ok(None);
    };
    let cfg = load_config_file(&p)?;
    Ok(Some((p, cfg)))
}
