//! Finding Reports
//!
//! Turns a [`DetectorReport`] into leveled findings with stable ids, and renders
//! them for people (pretty text, markdown) and tools (JSON).
//!
//! ## Core Concepts
//!
//! - **Finding**: one reported problem of one check on one engine class
//! - **Report**: every finding produced for one program model
//! - **Leak test case**: the event path of a leak as device-automation calls

use crate::checks::{AMBIENT_ANTI_ALIAS, AMBIENT_COLOR, CheckDescriptor, CheckSettings, SENSOR_LEAK};
use crate::diagnostics::{AntiAliasFinding, ColorFinding, DetectorReport, LeakFinding};
use crate::level::Level;
use crate::stg::Event;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

// ============================================================================
// Finding
// ============================================================================

/// What a finding is about, tagged by check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingDetail {
    SensorLeak(LeakFinding),
    AmbientColor(ColorFinding),
    AmbientAntiAlias(AntiAliasFinding),
}

impl FindingDetail {
    pub fn check(&self) -> &'static CheckDescriptor {
        match self {
            FindingDetail::SensorLeak(_) => &SENSOR_LEAK,
            FindingDetail::AmbientColor(_) => &AMBIENT_COLOR,
            FindingDetail::AmbientAntiAlias(_) => &AMBIENT_ANTI_ALIAS,
        }
    }

    pub fn engine(&self) -> &str {
        match self {
            FindingDetail::SensorLeak(f) => &f.engine,
            FindingDetail::AmbientColor(f) => &f.engine,
            FindingDetail::AmbientAntiAlias(f) => &f.engine,
        }
    }

    fn message(&self) -> String {
        match self {
            FindingDetail::SensorLeak(leak) => format!(
                "{} still registered after {} (ends in {})",
                leak.listeners.iter().join("; "),
                leak.event_path(),
                leak.end_state
            ),
            FindingDetail::AmbientColor(colors) => format!(
                "ambient colors {{{}}} differ from interactive colors {{{}}}",
                colors.ambient.iter().join(", "),
                colors.interactive.iter().join(", ")
            ),
            FindingDetail::AmbientAntiAlias(aa) => format!("setAntiAlias(true) reached from {}", aa.callback),
        }
    }

    /// The parts of the finding that identify it across runs.
    fn fingerprint(&self) -> Vec<String> {
        match self {
            FindingDetail::SensorLeak(leak) => vec![
                leak.event_path(),
                leak.listeners.iter().map(ToString::to_string).join(";"),
            ],
            FindingDetail::AmbientColor(colors) => vec![colors.ambient.iter().join(",")],
            FindingDetail::AmbientAntiAlias(aa) => vec![aa.callback.clone()],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    /// Stable unique identifier (hash of check, engine and details)
    pub id: String,

    pub check: &'static str,

    pub category: &'static str,

    pub level: Level,

    pub engine: String,

    pub message: String,

    pub detail: FindingDetail,

    /// When the finding was detected
    pub detected_at: DateTime<Utc>,
}

impl Finding {
    /// Generate a stable ID from the check, the engine and the finding's details
    pub fn generate_id(check: &str, engine: &str, parts: &[String]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(check.as_bytes());
        hasher.update(engine.as_bytes());
        for part in parts {
            hasher.update(part.as_bytes());
        }
        let result = hasher.finalize();
        // Use first 8 bytes (16 hex chars) for brevity
        hex::encode(&result[..8])
    }

    pub fn new(detail: FindingDetail, level: Level) -> Self {
        let check = detail.check();
        let engine = detail.engine().to_string();
        Self {
            id: Self::generate_id(check.name, &engine, &detail.fingerprint()),
            check: check.name,
            category: check.category.as_str(),
            level,
            engine,
            message: detail.message(),
            detail,
            detected_at: Utc::now(),
        }
    }

    /// Short display string for listing
    pub fn short_display(&self) -> String {
        format!("{}[{}] {}: {}", self.level, self.check, self.engine, self.message)
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Program model the findings were produced for.
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub findings: Vec<Finding>,
}

impl Report {
    /// Level every detector result and keep the reported ones.
    pub fn from_detector(source: impl Into<String>, detected: &DetectorReport, checks: &CheckSettings) -> Self {
        let details = detected
            .leaks
            .iter()
            .cloned()
            .map(FindingDetail::SensorLeak)
            .chain(detected.colors.iter().cloned().map(FindingDetail::AmbientColor))
            .chain(detected.anti_alias.iter().cloned().map(FindingDetail::AmbientAntiAlias));
        let findings = details
            .filter_map(|detail| {
                let level = checks.level_for(detail.check());
                level.is_reported().then(|| Finding::new(detail, level))
            })
            .collect();
        Self {
            source: source.into(),
            generated_at: Utc::now(),
            findings,
        }
    }

    pub fn count(&self, level: Level) -> usize {
        self.findings.iter().filter(|f| f.level == level).count()
    }

    /// Whether the run should fail.
    pub fn is_failure(&self, deny_warnings: bool) -> bool {
        let threshold = if deny_warnings { Level::Warn } else { Level::Error };
        self.findings.iter().any(|f| f.level >= threshold)
    }

    pub fn leaks(&self) -> impl Iterator<Item = &LeakFinding> {
        self.findings.iter().filter_map(|f| match &f.detail {
            FindingDetail::SensorLeak(leak) => Some(leak),
            _ => None,
        })
    }
}

// ============================================================================
// Rendering
// ============================================================================

pub fn render_pretty(report: &Report) -> String {
    let mut out = String::new();
    for finding in &report.findings {
        let _ = writeln!(out, "{}: {}", report.source, finding.short_display());
        let _ = writeln!(out, "  = id: {}", finding.id);
    }
    let _ = writeln!(
        out,
        "{}: {} error(s), {} warning(s)",
        report.source,
        report.count(Level::Error),
        report.count(Level::Warn)
    );
    out
}

pub fn render_json(reports: &[Report]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(reports)
}

/// Generate a markdown report
pub fn render_markdown(reports: &[Report]) -> String {
    let mut out = String::new();
    out.push_str("# Watch Face Analysis Report\n\n");
    let total: usize = reports.iter().map(|r| r.findings.len()).sum();
    let _ = writeln!(out, "**Models:** {}  ", reports.len());
    let _ = writeln!(out, "**Findings:** {total}\n");

    for report in reports {
        let _ = writeln!(out, "## {}\n", report.source);
        if report.findings.is_empty() {
            out.push_str("No findings.\n\n");
            continue;
        }
        out.push_str("| ID | Check | Level | Engine | Message |\n");
        out.push_str("|----|-------|-------|--------|---------|\n");
        for finding in &report.findings {
            let _ = writeln!(
                out,
                "| `{}` | {} | {} | `{}` | {} |",
                finding.id,
                finding.check,
                finding.level,
                finding.engine,
                finding.message.replace('|', "\\|")
            );
        }
        out.push('\n');
    }
    out
}

// ============================================================================
// Leak test cases
// ============================================================================

/// Device-automation call replaying `event`. Swipe-down and screen taps
/// have no automation counterpart and are left out of replay scripts.
pub fn automation_call(event: Event) -> Option<&'static str> {
    match event {
        Event::Select => Some("wearable.select_on_handheld(HANDHELD_SERIALNO, labels[pkg])"),
        Event::Deselect => Some("wearable.deselect_on_handheld(HANDHELD_SERIALNO)"),
        Event::Standby => Some("wearable.standby()"),
        Event::PressSideButton => Some("wearable.press_side_button()"),
        Event::SwipeLeft => Some("wearable.swipe_left()"),
        Event::SwipeRight => Some("wearable.swipe_right()"),
        Event::SwipeUp => Some("wearable.swipe_up()"),
        Event::SwipeDown | Event::TapScreenCenter => None,
    }
}

/// One numbered replay script per leak, shortest paths first.
pub fn leak_test_cases<'a>(leaks: impl IntoIterator<Item = &'a LeakFinding>) -> String {
    let mut out = String::new();
    // Stable sort keeps discovery order among equal lengths.
    let ordered = leaks.into_iter().sorted_by_key(|leak| leak.events.len());
    for (idx, leak) in ordered.enumerate() {
        let _ = writeln!(out, "# leak {}: {} {}", idx + 1, leak.engine, leak.event_path());
        for call in leak.events.iter().filter_map(|e| automation_call(*e)) {
            let _ = writeln!(out, "{call}");
        }
        out.push('\n');
    }
    out
}
