//! Attempt ledger data model — immutable outreach attempt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::Channel;

/// Classification of a non-successful contact attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureType {
    Voicemail,
    NoAnswer,
    Busy,
    Failure,
    Error,
    InvalidNumber,
}

impl FailureType {
    /// The string stored in rule configuration and the DB.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voicemail => "voicemail",
            Self::NoAnswer => "no-answer",
            Self::Busy => "busy",
            Self::Failure => "failure",
            Self::Error => "error",
            Self::InvalidNumber => "invalid-number",
        }
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an outreach attempt.
///
/// `InFlight` is the only non-terminal phase: it exists between dispatch
/// and the transport's terminal callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    InFlight,
    Delivered,
    Answered,
    Voicemail,
    NoAnswer,
    Busy,
    Failure,
    Error,
    InvalidNumber,
}

impl AttemptStatus {
    /// The string stored in the DB status column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InFlight => "in-flight",
            Self::Delivered => "delivered",
            Self::Answered => "answered",
            Self::Voicemail => "voicemail",
            Self::NoAnswer => "no-answer",
            Self::Busy => "busy",
            Self::Failure => "failure",
            Self::Error => "error",
            Self::InvalidNumber => "invalid-number",
        }
    }

    /// Parse a status string from the DB.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in-flight" => Some(Self::InFlight),
            "delivered" => Some(Self::Delivered),
            "answered" => Some(Self::Answered),
            "voicemail" => Some(Self::Voicemail),
            "no-answer" => Some(Self::NoAnswer),
            "busy" => Some(Self::Busy),
            "failure" => Some(Self::Failure),
            "error" => Some(Self::Error),
            "invalid-number" => Some(Self::InvalidNumber),
            _ => None,
        }
    }

    /// Whether the attempt has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InFlight)
    }

    /// Whether the contact went through (delivered or answered).
    ///
    /// A success closes the retry run for the current trigger.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered | Self::Answered)
    }

    /// Whether the lead actually responded.
    ///
    /// Stronger than `is_success`: a delivered message with no reply still
    /// counts as "no response" for the fallback cascade.
    pub fn is_response(&self) -> bool {
        matches!(self, Self::Answered)
    }

    /// The failure type this status maps to, if any.
    pub fn failure_type(&self) -> Option<FailureType> {
        match self {
            Self::Voicemail => Some(FailureType::Voicemail),
            Self::NoAnswer => Some(FailureType::NoAnswer),
            Self::Busy => Some(FailureType::Busy),
            Self::Failure => Some(FailureType::Failure),
            Self::Error => Some(FailureType::Error),
            Self::InvalidNumber => Some(FailureType::InvalidNumber),
            Self::InFlight | Self::Delivered | Self::Answered => None,
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger entry for one dispatched contact attempt.
///
/// Created exactly once per dispatch, in `InFlight` status; its terminal
/// outcome is applied by a single replay-safe finalize event. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachAttempt {
    /// Unique ID.
    pub id: Uuid,
    /// Idempotency token for this dispatch. Unique per attempt; a repeated
    /// append with the same token is reported as a duplicate, not recorded.
    pub token: Uuid,
    /// The lead contacted.
    pub lead_id: Uuid,
    /// The rule that authorized the attempt.
    pub rule_id: Uuid,
    /// The channel used.
    pub channel: Channel,
    /// When the attempt was dispatched.
    pub attempted_at: DateTime<Utc>,
    /// Current status (`in-flight` until the terminal callback).
    pub status: AttemptStatus,
    /// 1-based position within this lead-channel pair's attempt run.
    pub sequence: u32,
    /// When the terminal status was recorded.
    pub finalized_at: Option<DateTime<Utc>>,
}

/// What the dispatcher appends at dispatch time.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub token: Uuid,
    pub lead_id: Uuid,
    pub rule_id: Uuid,
    pub channel: Channel,
    pub attempted_at: DateTime<Utc>,
    pub sequence: u32,
}

/// Outcome of an idempotent ledger append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The event was recorded.
    Recorded,
    /// The event was already recorded; nothing changed.
    Duplicate,
}
