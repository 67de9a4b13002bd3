//! # Report Subcommand
//!
//! Reads an attendance log and prints reconciled intervals followed by
//! per-identity totals, as aligned text or as one JSON document.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;

use presence_tracker::{read_csv_log, AttendanceInterval, AttendanceLedger, IdentityTotal};

/// Arguments for the `presence report` subcommand.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Attendance log to read.
    #[arg(long, default_value = "attendance.csv")]
    pub log: PathBuf,

    /// Output format.
    #[arg(long, value_enum, default_value = "text")]
    pub format: ReportFormat,
}

/// Report output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Aligned columns.
    Text,
    /// A single JSON object.
    Json,
}

#[derive(Serialize)]
struct AttendanceReport {
    intervals: Vec<AttendanceInterval>,
    totals: Vec<IdentityTotal>,
}

/// Execute `presence report`.
pub fn run_report(args: &ReportArgs) -> Result<u8> {
    let records = read_csv_log(&args.log)
        .with_context(|| format!("reading attendance log {}", args.log.display()))?;
    tracing::debug!(records = records.len(), "parsed attendance log");
    let ledger = AttendanceLedger::from_records(records);
    print!("{}", render(&ledger, args.format)?);
    Ok(0)
}

/// Render `ledger` in the requested format.
pub fn render(ledger: &AttendanceLedger, format: ReportFormat) -> Result<String> {
    let report = AttendanceReport {
        intervals: ledger.intervals(),
        totals: ledger.totals(),
    };
    match format {
        ReportFormat::Json => {
            let mut out = serde_json::to_string_pretty(&report).context("serializing report")?;
            out.push('\n');
            Ok(out)
        }
        ReportFormat::Text => Ok(render_text(&report)),
    }
}

fn render_text(report: &AttendanceReport) -> String {
    let width = report
        .totals
        .iter()
        .map(|t| t.identity.as_str().len())
        .chain(std::iter::once("IDENTITY".len()))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  {:<20}  {:<20}  SECONDS", "IDENTITY", "ENTRY", "EXIT");
    for interval in &report.intervals {
        let exit = interval
            .exit_time
            .map_or_else(|| "(present)".to_string(), |t| t.to_string());
        let secs = interval
            .duration_secs()
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        let _ = writeln!(
            out,
            "{:<width$}  {:<20}  {:<20}  {}",
            interval.identity.as_str(),
            interval.entry_time.to_string(),
            exit,
            secs
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{:<width$}  INTERVALS  CLOSED_SECONDS", "IDENTITY");
    for total in &report.totals {
        let _ = writeln!(
            out,
            "{:<width$}  {:<9}  {}",
            total.identity.as_str(),
            total.intervals,
            total.closed_seconds
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
alice,2026-01-15T09:00:00Z,
alice,2026-01-15T09:00:00Z,2026-01-15T09:00:05Z
bob,2026-01-15T09:00:02Z,
";

    fn ledger() -> AttendanceLedger {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, LOG).unwrap();
        AttendanceLedger::from_records(read_csv_log(&path).unwrap())
    }

    #[test]
    fn text_report_lists_intervals_and_totals() {
        let text = render(&ledger(), ReportFormat::Text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("IDENTITY"));
        assert!(lines[1].starts_with("alice"));
        assert!(lines[1].contains("2026-01-15T09:00:05Z"));
        assert!(lines[1].ends_with('5'));
        assert!(lines[2].contains("(present)"));
        assert!(text.contains("INTERVALS"));
    }

    #[test]
    fn json_report_is_structured() {
        let json = render(&ledger(), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["intervals"].as_array().unwrap().len(), 2);
        assert_eq!(value["intervals"][1]["exit_time"], serde_json::Value::Null);
        assert_eq!(value["totals"][0]["identity"], "alice");
        assert_eq!(value["totals"][0]["closed_seconds"], 5);
    }

    #[test]
    fn unreadable_log_is_an_error() {
        let args = ReportArgs {
            log: PathBuf::from("/nonexistent/attendance.csv"),
            format: ReportFormat::Text,
        };
        let err = run_report(&args).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/attendance.csv"));
    }
}
