//! `presence run` followed by `presence report` over the same log.

use presence_cli::report::{render, ReportFormat};
use presence_cli::run::{execute, resolve_config, RunArgs};
use presence_core::Timestamp;
use presence_tracker::{read_csv_log, AttendanceLedger};

#[test]
fn replay_then_report() {
    let dir = tempfile::tempdir().unwrap();
    let observations = dir.path().join("frames.txt");
    std::fs::write(
        &observations,
        "# camera 1\nalice,Unknown\nalice,bob\nbob\nbob\n\nbob\n",
    )
    .unwrap();

    let args = RunArgs {
        observations,
        log: dir.path().join("attendance.csv"),
        max_misses: Some(2),
        tick_interval_ms: None,
        outbox_capacity: None,
        close_on_exit: true,
        start: Some(Timestamp::parse("2026-01-15T09:00:00Z").unwrap()),
        tick_secs: 10,
    };
    let config = resolve_config(&args, None, None).unwrap();
    let report = execute(&args, &config).unwrap();
    assert_eq!(report.ticks, 6);
    assert!(report.fully_delivered());

    let ledger = AttendanceLedger::from_records(read_csv_log(&args.log).unwrap());
    let json = render(&ledger, ReportFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    // alice is missed at t+20 and t+30 and closes on the second miss.
    assert_eq!(value["totals"][0]["identity"], "alice");
    assert_eq!(value["totals"][0]["closed_seconds"], 30);
    // bob is closed at shutdown, one read after the last tick.
    assert_eq!(value["totals"][1]["identity"], "bob");
    assert_eq!(value["totals"][1]["closed_seconds"], 50);
    assert!(ledger.open_intervals().is_empty());
}
