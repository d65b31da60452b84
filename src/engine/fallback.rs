//! Channel fallback orchestration — the per-lead cascade cursor.
//!
//! The cursor is never stored: it is reconstructed on every evaluation by
//! replaying the ledger against the rule's channel plan, so a restart can
//! never disagree with the attempt history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::channels::Channel;
use crate::engine::backoff::{self, RetryVerdict};
use crate::ledger::model::OutreachAttempt;
use crate::rules::model::{ChannelPlan, DialingRule};

/// Where a lead sits in its rule's channel cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCursor {
    /// Outreach is active on `plan.priority[index]`.
    Active { index: usize, channel: Channel },
    /// Every channel in the plan has been exhausted or timed out.
    Exhausted,
}

/// Replay the ledger to locate the cascade cursor for one lead.
///
/// `per_channel` holds finalized attempts, most-recent-first, for each
/// channel the lead has been tried on. Advancement past priority index k
/// happens when the pair is exhausted, or when `fallback_after` has
/// elapsed since the FIRST attempt on k with no response from the lead.
/// Counters are per lead-channel pair: landing on a new channel starts
/// fresh.
pub fn cursor(
    rule: &DialingRule,
    plan: &ChannelPlan,
    per_channel: &HashMap<Channel, Vec<OutreachAttempt>>,
    lead_attempts: usize,
    now: DateTime<Utc>,
) -> ChannelCursor {
    for (index, &channel) in plan.priority.iter().enumerate() {
        let history = per_channel.get(&channel).map(Vec::as_slice).unwrap_or(&[]);

        // Untried channel: the cascade starts (or resumes) here.
        if history.is_empty() {
            // The global per-lead ceiling still applies to fresh channels.
            if matches!(
                backoff::evaluate(rule, history, lead_attempts),
                RetryVerdict::Exhausted
            ) {
                continue;
            }
            return ChannelCursor::Active { index, channel };
        }

        // The lead responded on this channel; the cascade stops advancing.
        if history.iter().any(|a| a.status.is_response()) {
            return ChannelCursor::Active { index, channel };
        }

        if matches!(
            backoff::evaluate(rule, history, lead_attempts),
            RetryVerdict::Exhausted
        ) {
            continue;
        }

        // Oldest attempt on this channel anchors the no-response clock.
        let first_at = history
            .last()
            .map(|a| a.attempted_at)
            .unwrap_or(now);
        if now - first_at > plan.fallback_after() {
            continue;
        }

        return ChannelCursor::Active { index, channel };
    }

    ChannelCursor::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::model::AttemptStatus;
    use crate::ledger::FailureType;
    use crate::rules::model::RedialInterval;
    use chrono::Duration;
    use uuid::Uuid;

    const DAY_SECS: u64 = 86_400;

    fn plan() -> ChannelPlan {
        ChannelPlan {
            priority: vec![Channel::Whatsapp, Channel::Voice],
            fallback_after_secs: DAY_SECS,
        }
    }

    fn rule() -> DialingRule {
        DialingRule::new("cascade", Channel::Whatsapp)
            .with_plan(plan())
            .with_redial(
                FailureType::NoAnswer,
                RedialInterval {
                    interval_minutes: 60,
                    max_attempts: 3,
                },
            )
    }

    fn attempt(channel: Channel, status: AttemptStatus, at: DateTime<Utc>) -> OutreachAttempt {
        OutreachAttempt {
            id: Uuid::new_v4(),
            token: Uuid::new_v4(),
            lead_id: Uuid::new_v4(),
            rule_id: Uuid::new_v4(),
            channel,
            attempted_at: at,
            status,
            sequence: 1,
            finalized_at: Some(at),
        }
    }

    #[test]
    fn untried_plan_starts_on_first_channel() {
        let c = cursor(&rule(), &plan(), &HashMap::new(), 0, Utc::now());
        assert_eq!(
            c,
            ChannelCursor::Active {
                index: 0,
                channel: Channel::Whatsapp
            }
        );
    }

    #[test]
    fn stays_on_channel_within_threshold() {
        let t = Utc::now() - Duration::hours(1);
        let per_channel = HashMap::from([(
            Channel::Whatsapp,
            vec![attempt(Channel::Whatsapp, AttemptStatus::Delivered, t)],
        )]);

        let c = cursor(&rule(), &plan(), &per_channel, 1, Utc::now());
        assert_eq!(
            c,
            ChannelCursor::Active {
                index: 0,
                channel: Channel::Whatsapp
            }
        );
    }

    #[test]
    fn no_response_past_threshold_advances_to_next_channel() {
        let t = Utc::now() - Duration::hours(25);
        let per_channel = HashMap::from([(
            Channel::Whatsapp,
            vec![attempt(Channel::Whatsapp, AttemptStatus::Delivered, t)],
        )]);

        let c = cursor(&rule(), &plan(), &per_channel, 1, Utc::now());
        assert_eq!(
            c,
            ChannelCursor::Active {
                index: 1,
                channel: Channel::Voice
            }
        );
    }

    #[test]
    fn a_response_pins_the_cursor() {
        let t = Utc::now() - Duration::hours(48);
        let per_channel = HashMap::from([(
            Channel::Whatsapp,
            vec![attempt(Channel::Whatsapp, AttemptStatus::Answered, t)],
        )]);

        let c = cursor(&rule(), &plan(), &per_channel, 1, Utc::now());
        assert_eq!(
            c,
            ChannelCursor::Active {
                index: 0,
                channel: Channel::Whatsapp
            }
        );
    }

    #[test]
    fn exhausted_pair_advances_before_threshold() {
        let now = Utc::now();
        let per_channel = HashMap::from([(
            Channel::Whatsapp,
            vec![
                attempt(Channel::Whatsapp, AttemptStatus::NoAnswer, now - Duration::hours(1)),
                attempt(Channel::Whatsapp, AttemptStatus::NoAnswer, now - Duration::hours(2)),
                attempt(Channel::Whatsapp, AttemptStatus::NoAnswer, now - Duration::hours(3)),
            ],
        )]);

        let c = cursor(&rule(), &plan(), &per_channel, 3, now);
        assert_eq!(
            c,
            ChannelCursor::Active {
                index: 1,
                channel: Channel::Voice
            }
        );
    }

    #[test]
    fn last_channel_spent_means_exhausted() {
        let now = Utc::now();
        let per_channel = HashMap::from([
            (
                Channel::Whatsapp,
                vec![attempt(
                    Channel::Whatsapp,
                    AttemptStatus::Delivered,
                    now - Duration::hours(50),
                )],
            ),
            (
                Channel::Voice,
                vec![attempt(
                    Channel::Voice,
                    AttemptStatus::Delivered,
                    now - Duration::hours(26),
                )],
            ),
        ]);

        assert_eq!(cursor(&rule(), &plan(), &per_channel, 2, now), ChannelCursor::Exhausted);
    }

    #[test]
    fn global_ceiling_exhausts_untried_channels_too() {
        let now = Utc::now();
        let capped = rule().with_max_attempts(2);
        let per_channel = HashMap::from([(
            Channel::Whatsapp,
            vec![
                attempt(Channel::Whatsapp, AttemptStatus::NoAnswer, now - Duration::hours(26)),
                attempt(Channel::Whatsapp, AttemptStatus::NoAnswer, now - Duration::hours(27)),
            ],
        )]);

        assert_eq!(cursor(&capped, &plan(), &per_channel, 2, now), ChannelCursor::Exhausted);
    }
}
