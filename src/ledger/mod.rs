//! Append-only outreach attempt ledger.

pub mod model;

pub use model::{AppendOutcome, AttemptStatus, DispatchRecord, FailureType, OutreachAttempt};
