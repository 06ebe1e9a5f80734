//! At-exit report for an interpreter session
//!
//! Dumps counters when the host finishes, controlled by the `REB_REPORT`
//! env var:
//! - Unset or `0` → no report
//! - `1` → human-readable to stderr
//! - `words` → human-readable plus native call counts
//! - `json` → JSON to stderr
//! - `json:/path` → JSON to file
//!
//! JSON output needs the `report-json` feature (on by default); without it
//! the human format is used.

use crate::interp::Interp;
use serde::Serialize;
use std::io::Write;

/// Output format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Json,
}

/// Output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDestination {
    Stderr,
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub destination: ReportDestination,
    /// List native call counts in the human format (always in JSON)
    pub include_natives: bool,
}

impl ReportConfig {
    /// Parse a `REB_REPORT` value; `None` means no report
    pub fn parse(val: &str) -> Option<Self> {
        let human = |include_natives| ReportConfig {
            format: ReportFormat::Human,
            destination: ReportDestination::Stderr,
            include_natives,
        };
        match val {
            "" | "0" => None,
            "1" => Some(human(false)),
            "words" => Some(human(true)),
            "json" => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::Stderr,
                include_natives: true,
            }),
            s if s.starts_with("json:") => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::File(s[5..].to_string()),
                include_natives: true,
            }),
            _ => {
                tracing::warn!("REB_REPORT='{}' not recognized, ignoring", val);
                None
            }
        }
    }

    pub fn from_env() -> Option<Self> {
        Self::parse(&std::env::var("REB_REPORT").ok()?)
    }
}

/// Counters gathered from one interpreter
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub wall_clock_ms: u64,
    pub ticks: u64,
    pub peak_depth: usize,
    pub series_made: u64,
    pub series_freed: u64,
    pub series_live: usize,
    pub natives: Vec<(String, u64)>,
}

impl Interp {
    pub fn report_data(&self) -> ReportData {
        let stats = self.heap.stats();
        ReportData {
            wall_clock_ms: self.started.elapsed().as_millis() as u64,
            ticks: self.tick,
            peak_depth: self.peak_depth,
            series_made: stats.made,
            series_freed: stats.freed,
            series_live: stats.live,
            natives: self
                .hooks
                .native_counts()
                .into_iter()
                .map(|(name, count)| (name.to_string(), count))
                .collect(),
        }
    }
}

pub fn format_human(data: &ReportData, include_natives: bool) -> String {
    let mut out = String::new();
    out.push_str("=== REB REPORT ===\n");
    out.push_str(&format!("Wall clock:      {} ms\n", data.wall_clock_ms));
    out.push_str(&format!("Ticks:           {}\n", data.ticks));
    out.push_str(&format!("Peak depth:      {}\n", data.peak_depth));
    out.push_str(&format!("Series made:     {}\n", data.series_made));
    out.push_str(&format!("Series freed:    {}\n", data.series_freed));
    out.push_str(&format!("Series live:     {}\n", data.series_live));

    if include_natives && !data.natives.is_empty() {
        out.push_str("\n--- Native Call Counts ---\n");
        for (name, count) in &data.natives {
            out.push_str(&format!("  {:30} {}\n", name, count));
        }
    }

    out.push_str("==================\n");
    out
}

#[cfg(feature = "report-json")]
pub fn format_json(data: &ReportData) -> String {
    let natives: serde_json::Map<String, serde_json::Value> = data
        .natives
        .iter()
        .map(|(name, count)| (name.clone(), serde_json::Value::from(*count)))
        .collect();
    let mut value = match serde_json::to_value(data) {
        Ok(value) => value,
        Err(_) => return "{}".to_string(),
    };
    if let Some(map) = value.as_object_mut() {
        map.insert("natives".into(), serde_json::Value::Object(natives));
    }
    serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(not(feature = "report-json"))]
pub fn format_json(data: &ReportData) -> String {
    tracing::warn!("REB_REPORT=json requires the 'report-json' feature; using the human format");
    format_human(data, true)
}

/// Write the report described by `config`
pub fn emit_report(interp: &Interp, config: &ReportConfig) {
    let data = interp.report_data();
    let output = match config.format {
        ReportFormat::Human => format_human(&data, config.include_natives),
        ReportFormat::Json => format_json(&data),
    };

    match &config.destination {
        ReportDestination::Stderr => {
            let _ = std::io::stderr().write_all(output.as_bytes());
        }
        ReportDestination::File(path) => {
            if let Err(e) = std::fs::write(path, output.as_bytes()) {
                tracing::warn!("could not write report to {}: {}", path, e);
                let _ = std::io::stderr().write_all(output.as_bytes());
            }
        }
    }
}
