#![deny(missing_docs)]

//! # presence-core — Foundational Types for the Presence Stack
//!
//! This crate defines the types that every other crate in the workspace
//! depends on. It has no internal crate dependencies — only `serde`,
//! `thiserror`, and `chrono` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** An [`Identity`] is a
//!    validated token, not a bare `String`. Blank names and line breaks,
//!    which would split a log row, are rejected at construction; everything
//!    else is carried opaquely and quoted by the CSV row codec.
//!
//! 2. **UTC-only, millisecond-precision [`Timestamp`].** Entry and exit
//!    times are compared for ordering and used as dedup keys, so
//!    sub-millisecond noise and local offsets are removed at construction.
//!
//! 3. **Time is injected.** The tracker reads time through the [`Clock`]
//!    trait; tests drive a [`ManualClock`].
//!
//! 4. **[`IntervalRecord`] is the unit of persistence.** Entry and exit
//!    notifications are separate immutable records with a shared
//!    [`RecordKey`] shape, encoded as one line each.

pub mod clock;
pub mod error;
pub mod identity;
pub mod record;
pub mod temporal;

// Re-export primary types at crate root for ergonomic imports.
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ValidationError;
pub use identity::{Identity, ObservedSet};
pub use record::{IntervalRecord, RecordKey, RecordKind};
pub use temporal::Timestamp;
