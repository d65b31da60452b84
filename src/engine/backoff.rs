//! Backoff calculation — when a lead-channel pair may be attempted again.
//!
//! Pure over the rule and the pair's finalized attempt history
//! (most-recent-first). The ledger is the sole source of truth; nothing
//! here holds state between calls.

use chrono::{DateTime, Duration, Utc};

use crate::ledger::model::OutreachAttempt;
use crate::rules::model::DialingRule;

/// What the attempt history permits for a lead-channel pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// No prior attempts on this pair.
    NoHistory,
    /// A retry is permitted at or after this instant.
    NotBefore(DateTime<Utc>),
    /// Attempt ceiling reached; the pair is terminal for this channel.
    Exhausted,
    /// The retry run is over: the last attempt succeeded, or the failure
    /// type carries no redial policy.
    Closed,
}

/// Evaluate the retry verdict for one lead-channel pair.
///
/// `pair_history` must be finalized attempts, most-recent-first.
/// `lead_attempts` is the lead's total finalized attempt count under this
/// rule across all channels, checked against `max_attempts_per_lead`.
pub fn evaluate(
    rule: &DialingRule,
    pair_history: &[OutreachAttempt],
    lead_attempts: usize,
) -> RetryVerdict {
    if lead_attempts >= rule.max_attempts_per_lead as usize {
        return RetryVerdict::Exhausted;
    }

    let Some(last) = pair_history.first() else {
        return RetryVerdict::NoHistory;
    };

    if last.status.is_success() {
        return RetryVerdict::Closed;
    }

    let Some(failure) = last.status.failure_type() else {
        // Non-terminal entries are filtered out upstream.
        return RetryVerdict::Closed;
    };

    let Some(policy) = rule.redial_policy(failure) else {
        // No redial policy for this failure type: nothing schedules a
        // retry, so the run ends here.
        return RetryVerdict::Closed;
    };

    // Consecutive attempts of the same failure type, newest first. A type
    // change resets the streak: a new failure mode is evidence of changed
    // conditions.
    let streak = pair_history
        .iter()
        .take_while(|a| a.status.failure_type() == Some(failure))
        .count();

    if streak >= policy.max_attempts as usize {
        return RetryVerdict::Exhausted;
    }

    RetryVerdict::NotBefore(last.attempted_at + Duration::minutes(policy.interval_minutes as i64))
}
