//! Program models written to disk and analyzed the way the CLI does it.

mod support;

use regex::Regex;
use std::fs;
use std::path::PathBuf;
use support::watchface;
use tempfile::TempDir;
use wearleak::analysis::Analyzer;
use wearleak::checks::CheckSettings;
use wearleak::config::WearleakConfig;
use wearleak::error::AnalysisError;
use wearleak::framework_catalog;
use wearleak::level::Level;
use wearleak::program::Program;
use wearleak::report::{self, Report};

fn short_paths() -> WearleakConfig {
    let mut cfg = WearleakConfig::default();
    cfg.analysis.path_length = 2;
    cfg
}

fn write_model(dir: &std::path::Path, name: &str, program: &Program) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, program.to_json().unwrap()).unwrap();
    path
}

#[test]
fn models_are_collected_from_directories() {
    let dir = TempDir::new().unwrap();
    let faces = dir.path().join("faces");
    let skipped = dir.path().join("build");
    fs::create_dir_all(&faces).unwrap();
    fs::create_dir_all(&skipped).unwrap();
    let leaky = write_model(&faces, "leaky.json", &watchface::leaky_face());
    let balanced = write_model(&faces, "balanced.json", &watchface::balanced_face());
    write_model(&skipped, "stale.json", &watchface::leaky_face());
    fs::write(faces.join("notes.txt"), "not a model").unwrap();

    let models = wearleak::collect_model_files(&[dir.path().to_path_buf(), leaky.clone()]).unwrap();
    assert_eq!(models, vec![balanced, leaky]);
}

#[test]
fn leaky_model_round_trips_through_json() {
    let dir = TempDir::new().unwrap();
    let path = write_model(dir.path(), "leaky.json", &watchface::leaky_face());

    let detected = wearleak::analyze_model(&path, &short_paths()).unwrap();
    assert_eq!(detected.leaks.len(), 1);
    assert_eq!(detected.leaks[0].event_path(), "[SELECT, STANDBY]");

    let report = Report::from_detector(path.display().to_string(), &detected, &CheckSettings::default());
    assert_eq!(report.count(Level::Error), 1);
    assert!(report.is_failure(false));

    let json = report::render_json(std::slice::from_ref(&report)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let finding = &value[0]["findings"][0];
    assert_eq!(finding["check"], "sensor_leak");
    assert_eq!(finding["level"], "error");
    assert_eq!(finding["detail"]["kind"], "sensor_leak");
    assert_eq!(finding["detail"]["listeners"][0]["objects"][0], watchface::HEART_RATE);
    let id = Regex::new(r"^[0-9a-f]{16}$").unwrap();
    assert!(id.is_match(finding["id"].as_str().unwrap()));
}

#[test]
fn library_prefixes_hide_engines() {
    let dir = TempDir::new().unwrap();
    let path = write_model(dir.path(), "leaky.json", &watchface::leaky_face());
    let mut cfg = short_paths();
    cfg.analysis.library_prefixes.push("com.example.".to_string());

    let detected = wearleak::analyze_model(&path, &cfg).unwrap();
    assert!(detected.is_empty(), "{detected:?}");
}

#[test]
fn prepared_programs_list_no_demoted_engines() {
    let mut cfg = WearleakConfig::default();
    cfg.analysis.library_prefixes.push("com.example.".to_string());
    let mut program = watchface::leaky_face();
    wearleak::prepare_program(&mut program, &cfg).unwrap();

    let analyzer = Analyzer::new(&program, cfg.analysis_settings());
    let engines = program
        .application_classes()
        .filter(|c| framework_catalog::is_watch_face_engine(analyzer.hierarchy(), *c))
        .count();
    assert_eq!(engines, 0);
}

#[test]
fn value_flow_graph_renders_modeled_calls() {
    let program = watchface::leaky_face();
    let analyzer = Analyzer::new(&program, Default::default());
    let graph = analyzer.flow_graph();
    assert!(graph.node_count() > 0);
    assert!(graph.edge_count() > 0);

    let dot = graph.to_dot(&program);
    assert!(dot.starts_with("digraph flow {"));
    assert!(dot.contains("RegisterSensorListener"));
    assert!(dot.contains("this com.example.face.FaceService$Engine"));
}

#[test]
fn unreadable_models_are_model_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{\"classes\": 3}").unwrap();
    let err = wearleak::analyze_model(&path, &WearleakConfig::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::Model(_)), "{err:?}");
}
