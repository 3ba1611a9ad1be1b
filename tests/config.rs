use std::fs;
use tempfile::TempDir;
use wearleak::analysis::BranchResolution;
use wearleak::checks::{AMBIENT_ANTI_ALIAS, AMBIENT_COLOR, SENSOR_LEAK};
use wearleak::config::{self, DEFAULT_CONFIG_FILE_NAME, WearleakConfig};
use wearleak::level::Level;

fn write_config(dir: &TempDir, contents: &str) {
    fs::write(dir.path().join(DEFAULT_CONFIG_FILE_NAME), contents).unwrap();
}

#[test]
fn defaults_match_the_documented_values() {
    let cfg = WearleakConfig::default();
    assert_eq!(cfg.analysis.path_length, 3);
    assert_eq!(cfg.analysis.recursion_cap, 5);
    assert_eq!(cfg.analysis.branch_resolution, BranchResolution::Alias);
    assert!(cfg.analysis.library_prefixes.iter().any(|p| p == "android."));
    assert_eq!(cfg.sensors.benign_in_ambient, vec![19]);
    assert!(cfg.colors.allowed_in_ambient.iter().any(|c| c == "black"));
    assert!(cfg.validate().is_ok());
}

#[test]
fn config_is_found_in_a_parent_directory() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "[analysis]\npath_length = 4\n");
    let nested = dir.path().join("models").join("faces");
    fs::create_dir_all(&nested).unwrap();

    let found = config::find_config_file(&nested).unwrap();
    assert_eq!(found, dir.path().join(DEFAULT_CONFIG_FILE_NAME));

    let (path, cfg) = config::load_config(None, &nested).unwrap().unwrap();
    assert_eq!(path, found);
    assert_eq!(cfg.analysis.path_length, 4);
    // Sections that are not mentioned keep their defaults.
    assert_eq!(cfg.analysis.recursion_cap, 5);
    assert_eq!(cfg.sensors.benign_in_ambient, vec![19]);
}

#[test]
fn missing_config_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("empty");
    fs::create_dir_all(&nested).unwrap();
    // The temp directory may itself live below a stray config; only check
    // that loading succeeds.
    assert!(config::load_config(None, &nested).is_ok());
}

#[test]
fn every_section_is_read() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"
[analysis]
path_length = 2
recursion_cap = 1
branch_resolution = "constant"
library_prefixes = ["org.vendor."]

[colors]
allowed_in_ambient = ["black", "white", "red"]

[sensors]
benign_in_ambient = [19, 18]

[checks]
disabled = ["ambient_color"]
ambient_anti_alias = "error"
sensor_leak = "warn"
"#,
    );
    let cfg = config::load_config_file(&dir.path().join(DEFAULT_CONFIG_FILE_NAME)).unwrap();

    let analysis = cfg.analysis_settings();
    assert_eq!(analysis.recursion_cap, 1);
    assert_eq!(analysis.branch_resolution, BranchResolution::Constant);
    assert_eq!(cfg.analysis.library_prefixes, vec!["org.vendor.".to_string()]);

    let detector = cfg.detector_settings();
    assert_eq!(detector.path_length, 2);
    assert_eq!(detector.allowed_ambient_colors, vec!["black", "white", "red"]);
    assert_eq!(detector.benign_ambient_sensors, vec![19, 18]);

    let checks = cfg.check_settings();
    assert_eq!(checks.level_for(&AMBIENT_COLOR), Level::Allow);
    assert_eq!(checks.level_for(&AMBIENT_ANTI_ALIAS), Level::Error);
    assert_eq!(checks.level_for(&SENSOR_LEAK), Level::Warn);
}

#[test]
fn zero_path_length_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "[analysis]\npath_length = 0\n");
    let err = config::load_config_file(&dir.path().join(DEFAULT_CONFIG_FILE_NAME)).unwrap_err();
    assert!(format!("{err:#}").contains("path_length"), "{err:#}");
}

#[test]
fn malformed_config_names_the_file() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "[analysis\n");
    let path = dir.path().join(DEFAULT_CONFIG_FILE_NAME);
    let err = config::load_config(Some(&path), dir.path()).unwrap_err();
    assert!(err.to_string().contains(DEFAULT_CONFIG_FILE_NAME), "{err:#}");
}
