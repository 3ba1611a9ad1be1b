//! Static detection of energy leaks in Android watch faces.
//!
//! A program model (see [`program`]) is analyzed against the fixed watch face
//! lifecycle ([`stg`]): every bounded sequence of user and system events is
//! replayed through the engine's callbacks, and sensor or location listeners
//! still registered when the watch face goes ambient are reported, together
//! with ambient-mode color and anti-aliasing problems.

pub mod analysis;
pub mod checks;
pub mod cli;
pub mod color;
pub mod config;
pub mod detector;
pub mod diagnostics;
pub mod error;
pub mod flow_graph;
pub mod framework_catalog;
pub mod hierarchy;
pub mod level;
pub mod program;
pub mod report;
pub mod stg;
pub mod telemetry;

use crate::analysis::Analyzer;
use crate::config::WearleakConfig;
use crate::diagnostics::DetectorReport;
use crate::error::AnalysisResult;
use crate::program::Program;
use anyhow::Context as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Validate `config` and apply its library prefixes to `program`.
pub fn prepare_program(program: &mut Program, config: &WearleakConfig) -> AnalysisResult<()> {
    config.validate()?;
    let demoted = program.demote_library_prefixes(&config.analysis.library_prefixes);
    if demoted > 0 {
        tracing::debug!(demoted, "application classes treated as library code");
    }
    Ok(())
}

/// Run every check on `program` with the given configuration.
pub fn analyze_program(program: &mut Program, config: &WearleakConfig) -> AnalysisResult<DetectorReport> {
    prepare_program(program, config)?;
    let mut analyzer = Analyzer::new(program, config.analysis_settings());
    detector::detect(&mut analyzer, config.detector_settings())
}

/// Load a JSON program model and analyze it.
pub fn analyze_model(path: &Path, config: &WearleakConfig) -> AnalysisResult<DetectorReport> {
    let mut program = Program::load(path)?;
    tracing::info!(
        model = %path.display(),
        classes = program.classes.len(),
        methods = program.methods.len(),
        "model loaded"
    );
    analyze_program(&mut program, config)
}

/// Expand files and directories into the sorted list of JSON models they hold.
pub fn collect_model_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        let meta = std::fs::metadata(path).with_context(|| format!("cannot read {}", path.display()))?;
        if !meta.is_dir() {
            out.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).into_iter().filter_entry(|e| !should_skip_dir(e.path())) {
            let entry = entry.with_context(|| format!("cannot walk {}", path.display()))?;
            if entry.file_type().is_file() && entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                out.push(entry.into_path());
            }
        }
    }

    out.sort();
    out.dedup();
    Ok(out)
}

fn should_skip_dir(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
        return false;
    };

    path.is_dir() && matches!(name, ".git" | "target" | "build")
}
