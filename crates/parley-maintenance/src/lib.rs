//! Parley Maintenance - periodic read-mostly jobs
//!
//! Three background loops, all driven by the same store and notifier the
//! ledger uses:
//!
//! - [`audit`]: the invariant auditor, a read-only scan that flags creator
//!   exposure beyond a prediction's declared maximum. The ledger's gating
//!   makes that provably unreachable, so a hit means a regression, not a
//!   normal-path event.
//! - [`reminders`]: nudges creators whose predictions are past their
//!   resolution date, with a skip/attempt history so nobody is nagged
//!   forever.
//! - [`backups`]: daily serialized snapshots of the whole world-state.

#![forbid(unsafe_code)]

pub mod audit;
pub mod backups;
pub mod reminders;

pub use audit::{audit_forever, find_invariant_violations};
pub use backups::backup_forever;
pub use reminders::{prediction_needs_reminder, remind_forever, send_reminder_if_due};
