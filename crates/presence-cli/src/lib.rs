//! # presence-cli — Presence Stack Command-Line Interface
//!
//! ## Subcommands
//!
//! - `run` — Replay an observation stream through the tracker into a flat
//!   attendance log.
//! - `report` — Reconcile an attendance log into intervals and per-identity
//!   totals.
//!
//! ## Crate Policy
//!
//! - Argument parsing is separated from the handlers.
//! - Handlers delegate to `presence-tracker`; no tracking logic lives here.
//! - Handlers return `anyhow::Result<u8>`, the process exit code on success.

pub mod report;
pub mod run;
