//! Eligibility evaluation — is a lead due for contact right now?
//!
//! Pure over the lead's attempt view and the resolved rule; the engine
//! assembles inputs once per lead per tick and passes a single `now` so
//! every check in a cycle agrees on the clock.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::channels::Channel;
use crate::engine::backoff::{self, RetryVerdict};
use crate::engine::fallback::{self, ChannelCursor};
use crate::ledger::model::OutreachAttempt;
use crate::rules::model::{DialingRule, ReengagementRule};

/// A lead's attempt situation, as seen by one rule.
#[derive(Debug, Default)]
pub struct LeadAttemptView {
    /// Finalized attempts per channel, most-recent-first.
    pub per_channel: HashMap<Channel, Vec<OutreachAttempt>>,
    /// Channels with an attempt currently in flight.
    pub in_flight: HashSet<Channel>,
    /// Most recent attempt on ANY channel, in-flight included.
    pub last_attempt_any: Option<DateTime<Utc>>,
    /// Finalized attempts under the evaluating rule, all channels.
    pub attempts_under_rule: usize,
}

/// Why a lead is not due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotDueReason {
    /// An attempt for this pair is still in flight; attempts on a pair are
    /// strictly sequential.
    InFlight,
    /// Failure-type backoff has not elapsed.
    Backoff { until: DateTime<Utc> },
    /// The inter-attempt floor has not elapsed.
    Floor { until: DateTime<Utc> },
    /// The pair (or the lead, globally) reached its attempt ceiling.
    Exhausted,
    /// The retry run closed (success, or no redial policy).
    Closed,
    /// A dialing rule without a cascade only retries failed attempts; this
    /// lead has none.
    AwaitingFirstAttempt,
    /// The reengagement silence threshold has not been reached.
    NotTriggered { until: DateTime<Utc> },
    /// Every channel in the rule's cascade is spent.
    NoChannelsLeft,
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Dispatch now on `channel`; `at` is the instant the lead became due
    /// (admission serves earliest-due first).
    Due { at: DateTime<Utc>, channel: Channel },
    NotDue { reason: NotDueReason },
    /// Due, but outside the permitted contact window. Deferred, never
    /// dropped: the attempt becomes due again at `resumes_at`.
    BlockedByWindow { resumes_at: Option<DateTime<Utc>> },
}

/// Evaluate a dialing rule for one lead.
pub fn evaluate_dialing(
    rule: &DialingRule,
    view: &LeadAttemptView,
    now: DateTime<Utc>,
) -> Eligibility {
    // Cascade rules pick their channel dynamically; plain rules dial their
    // configured channel only.
    let channel = match &rule.channel_plan {
        Some(plan) => {
            match fallback::cursor(rule, plan, &view.per_channel, view.attempts_under_rule, now) {
                ChannelCursor::Active { channel, .. } => channel,
                ChannelCursor::Exhausted => {
                    return Eligibility::NotDue {
                        reason: NotDueReason::NoChannelsLeft,
                    };
                }
            }
        }
        None => rule.channel,
    };

    if view.in_flight.contains(&channel) {
        return Eligibility::NotDue {
            reason: NotDueReason::InFlight,
        };
    }

    let empty = Vec::new();
    let history = view.per_channel.get(&channel).unwrap_or(&empty);

    let earliest = match backoff::evaluate(rule, history, view.attempts_under_rule) {
        RetryVerdict::NoHistory => {
            if rule.channel_plan.is_some() {
                // A cascade bootstraps first contact on its active channel.
                now
            } else {
                return Eligibility::NotDue {
                    reason: NotDueReason::AwaitingFirstAttempt,
                };
            }
        }
        RetryVerdict::NotBefore(at) => at,
        RetryVerdict::Exhausted => {
            return Eligibility::NotDue {
                reason: NotDueReason::Exhausted,
            };
        }
        RetryVerdict::Closed => {
            return Eligibility::NotDue {
                reason: NotDueReason::Closed,
            };
        }
    };

    // The floor applies across channels, so a fallback cascade cannot
    // stack attempts too closely.
    let floor_until = view
        .last_attempt_any
        .map(|last| last + rule.time_between_calls());

    if earliest > now {
        return Eligibility::NotDue {
            reason: NotDueReason::Backoff { until: earliest },
        };
    }
    if let Some(until) = floor_until {
        if until > now {
            return Eligibility::NotDue {
                reason: NotDueReason::Floor { until },
            };
        }
    }

    if !rule.window_contains(now) {
        return Eligibility::BlockedByWindow {
            resumes_at: rule.next_window_open(now),
        };
    }

    Eligibility::Due {
        at: earliest.max(floor_until.unwrap_or(earliest)),
        channel,
    }
}

/// Evaluate a reengagement rule for one lead.
///
/// Due when the contact silence reaches `trigger_after`, or immediately
/// when the lead has never been contacted.
pub fn evaluate_reengagement(
    rule: &ReengagementRule,
    last_contact_at: Option<DateTime<Utc>>,
    in_flight_on_channel: bool,
    now: DateTime<Utc>,
) -> Eligibility {
    if in_flight_on_channel {
        return Eligibility::NotDue {
            reason: NotDueReason::InFlight,
        };
    }

    match last_contact_at {
        None => Eligibility::Due {
            at: now,
            channel: rule.preferred_channel,
        },
        Some(last) => {
            let due_at = last + rule.trigger_after();
            if due_at <= now {
                Eligibility::Due {
                    at: due_at,
                    channel: rule.preferred_channel,
                }
            } else {
                Eligibility::NotDue {
                    reason: NotDueReason::NotTriggered { until: due_at },
                }
            }
        }
    }
}
