//! Outreach rule configuration — dialing rules, redial intervals,
//! reengagement rules, and the per-tick rule snapshot.
//!
//! Rules are operator-authored in the surrounding CRM. The engine only
//! reads them; every cycle works off one immutable `RuleSnapshot` so a
//! mid-cycle edit can never produce a torn read.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::Channel;
use crate::error::RuleError;
use crate::leads::Lead;
use crate::ledger::FailureType;

/// Cool-down and ceiling for one failure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedialInterval {
    /// Minutes to wait before the next attempt of this failure type.
    pub interval_minutes: u32,
    /// Consecutive attempts of this failure type before the lead-channel
    /// pair is exhausted.
    pub max_attempts: u32,
}

/// Segmentation filter — empty sets match every lead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segmentation {
    #[serde(default)]
    pub courses: Vec<Uuid>,
    #[serde(default)]
    pub funnels: Vec<Uuid>,
    #[serde(default)]
    pub funnel_stages: Vec<Uuid>,
}

impl Segmentation {
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty() && self.funnels.is_empty() && self.funnel_stages.is_empty()
    }

    /// Whether a lead's tags satisfy this filter.
    ///
    /// Each non-empty set must contain the lead's corresponding tag; a lead
    /// without the tag fails that set.
    pub fn matches(&self, lead: &Lead) -> bool {
        let in_set = |set: &[Uuid], tag: Option<Uuid>| {
            set.is_empty() || tag.is_some_and(|t| set.contains(&t))
        };
        in_set(&self.courses, lead.course_id)
            && in_set(&self.funnels, lead.funnel_id)
            && in_set(&self.funnel_stages, lead.funnel_stage_id)
    }

    /// Check every referenced id against the segment catalog.
    pub fn validate(&self, rule_id: Uuid, catalog: &SegmentCatalog) -> Result<(), RuleError> {
        for id in &self.courses {
            if !catalog.courses.contains(id) {
                return Err(RuleError::UnknownSegmentRef {
                    rule_id,
                    kind: "course",
                    id: *id,
                });
            }
        }
        for id in &self.funnels {
            if !catalog.funnels.contains(id) {
                return Err(RuleError::UnknownSegmentRef {
                    rule_id,
                    kind: "funnel",
                    id: *id,
                });
            }
        }
        for id in &self.funnel_stages {
            if !catalog.funnel_stages.contains(id) {
                return Err(RuleError::UnknownSegmentRef {
                    rule_id,
                    kind: "funnel-stage",
                    id: *id,
                });
            }
        }
        Ok(())
    }
}

/// Channel priority list plus the no-response threshold that advances it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPlan {
    /// Channels in cascade order; index 0 is where outreach starts.
    pub priority: Vec<Channel>,
    /// Escalate to the next channel after this long without a response.
    pub fallback_after_secs: u64,
}

impl ChannelPlan {
    pub fn fallback_after(&self) -> Duration {
        Duration::seconds(self.fallback_after_secs.min(i64::MAX as u64) as i64)
    }
}

/// Operator-authored dialing rule: retry policy, contact window, and
/// concurrency budget for one channel (or a channel cascade).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialingRule {
    pub id: Uuid,
    pub name: String,
    /// Primary channel. With a `channel_plan`, this is the cascade's entry
    /// channel (`priority[0]`).
    pub channel: Channel,
    pub enabled: bool,
    /// Concurrency budget: in-flight attempts allowed at once for this rule.
    pub simultaneous_channels: u32,
    /// First calendar day the rule may dial.
    pub start_date: NaiveDate,
    /// Daily window open (UTC).
    pub start_time: NaiveTime,
    /// Last calendar day, inclusive. None = open-ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Daily window close (UTC). A close at or before the open wraps past
    /// midnight.
    pub end_time: NaiveTime,
    /// Ceiling on attempts per lead under this rule, across failure types.
    pub max_attempts_per_lead: u32,
    /// Minimum seconds between any two attempts to the same lead,
    /// independent of failure-specific backoff.
    pub time_between_calls_secs: u64,
    /// Cool-down and ceiling per failure type.
    #[serde(default)]
    pub redial_intervals: HashMap<FailureType, RedialInterval>,
    /// Optional segmentation filter. None/empty = applies to all leads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Segmentation>,
    /// Optional omnichannel cascade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_plan: Option<ChannelPlan>,
    pub created_at: DateTime<Utc>,
}

impl DialingRule {
    /// Create a rule with an always-open window and no retry policy.
    pub fn new(name: impl Into<String>, channel: Channel) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            channel,
            enabled: true,
            simultaneous_channels: 1,
            start_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            start_time: NaiveTime::MIN,
            end_date: None,
            end_time: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
            max_attempts_per_lead: u32::MAX,
            time_between_calls_secs: 0,
            redial_intervals: HashMap::new(),
            segmentation: None,
            channel_plan: None,
            created_at: Utc::now(),
        }
    }

    /// Builder: set the daily time-of-day window.
    pub fn with_window(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// Builder: set the calendar bounds.
    pub fn with_dates(mut self, start: NaiveDate, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    /// Builder: set a redial policy for one failure type.
    pub fn with_redial(mut self, failure: FailureType, policy: RedialInterval) -> Self {
        self.redial_intervals.insert(failure, policy);
        self
    }

    /// Builder: set the concurrency budget.
    pub fn with_budget(mut self, simultaneous: u32) -> Self {
        self.simultaneous_channels = simultaneous;
        self
    }

    /// Builder: set the per-lead attempt ceiling.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts_per_lead = max;
        self
    }

    /// Builder: set the inter-attempt floor.
    pub fn with_floor_secs(mut self, secs: u64) -> Self {
        self.time_between_calls_secs = secs;
        self
    }

    /// Builder: set the segmentation filter.
    pub fn with_segmentation(mut self, seg: Segmentation) -> Self {
        self.segmentation = Some(seg);
        self
    }

    /// Builder: set the channel cascade.
    pub fn with_plan(mut self, plan: ChannelPlan) -> Self {
        self.channel_plan = Some(plan);
        self
    }

    /// The redial policy for a failure type, if configured.
    pub fn redial_policy(&self, failure: FailureType) -> Option<RedialInterval> {
        self.redial_intervals.get(&failure).copied()
    }

    /// The inter-attempt floor as a duration.
    pub fn time_between_calls(&self) -> Duration {
        Duration::seconds(self.time_between_calls_secs.min(i64::MAX as u64) as i64)
    }

    /// Whether the daily time-of-day window wraps past midnight.
    fn wraps_midnight(&self) -> bool {
        self.end_time <= self.start_time
    }

    /// Whether `now` falls inside the permitted contact window.
    ///
    /// Out-of-window dispatch is a correctness violation, never a soft
    /// preference.
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        let date = now.date_naive();
        if date < self.start_date {
            return false;
        }
        if self.end_date.is_some_and(|end| date > end) {
            return false;
        }
        let t = now.time();
        if self.wraps_midnight() {
            t >= self.start_time || t <= self.end_time
        } else {
            t >= self.start_time && t <= self.end_time
        }
    }

    /// The next instant at or after `now` inside the window, or None when
    /// the calendar window has closed for good.
    pub fn next_window_open(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let opens = self.start_date.and_time(self.start_time).and_utc();
        if now < opens {
            return Some(opens);
        }
        if self.window_contains(now) {
            return Some(now);
        }
        let today = now.date_naive();
        let candidate = if self.wraps_midnight() || now.time() < self.start_time {
            today.and_time(self.start_time)
        } else {
            today.succ_opt()?.and_time(self.start_time)
        };
        if self.end_date.is_some_and(|end| candidate.date() > end) {
            return None;
        }
        Some(candidate.and_utc())
    }

    /// Structural validation, run once per snapshot per rule.
    pub fn validate(&self, catalog: &SegmentCatalog) -> Result<(), RuleError> {
        if self.simultaneous_channels == 0 {
            return Err(RuleError::ZeroBudget { rule_id: self.id });
        }
        if self.end_date.is_some_and(|end| end < self.start_date) {
            return Err(RuleError::InvalidWindow {
                rule_id: self.id,
                reason: format!(
                    "end date {} precedes start date {}",
                    self.end_date.unwrap_or_default(),
                    self.start_date
                ),
            });
        }
        if let Some(plan) = &self.channel_plan {
            if plan.priority.is_empty() {
                return Err(RuleError::EmptyChannelPlan { rule_id: self.id });
            }
        }
        if let Some(seg) = &self.segmentation {
            seg.validate(self.id, catalog)?;
        }
        Ok(())
    }
}

/// Inactivity-triggered re-contact, independent of prior failure types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReengagementRule {
    pub id: Uuid,
    pub name: String,
    pub preferred_channel: Channel,
    pub enabled: bool,
    pub active: bool,
    /// Contact silence (since `last_contact_at`) that triggers re-contact.
    pub trigger_after_secs: u64,
    /// Opaque message/template reference, passed through to the sender.
    pub template_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Segmentation>,
    pub created_at: DateTime<Utc>,
}

impl ReengagementRule {
    pub fn new(name: impl Into<String>, channel: Channel, trigger_after_secs: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            preferred_channel: channel,
            enabled: true,
            active: true,
            trigger_after_secs,
            template_ref: String::new(),
            segmentation: None,
            created_at: Utc::now(),
        }
    }

    /// Builder: set the template reference.
    pub fn with_template(mut self, template_ref: impl Into<String>) -> Self {
        self.template_ref = template_ref.into();
        self
    }

    /// Builder: set the segmentation filter.
    pub fn with_segmentation(mut self, seg: Segmentation) -> Self {
        self.segmentation = Some(seg);
        self
    }

    /// Enabled by the operator AND currently active.
    pub fn is_effective(&self) -> bool {
        self.enabled && self.active
    }

    pub fn trigger_after(&self) -> Duration {
        Duration::seconds(self.trigger_after_secs.min(i64::MAX as u64) as i64)
    }

    pub fn validate(&self, catalog: &SegmentCatalog) -> Result<(), RuleError> {
        if let Some(seg) = &self.segmentation {
            seg.validate(self.id, catalog)?;
        }
        Ok(())
    }
}

/// Known segmentation ids, used to detect dangling rule references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentCatalog {
    #[serde(default)]
    pub courses: HashSet<Uuid>,
    #[serde(default)]
    pub funnels: HashSet<Uuid>,
    #[serde(default)]
    pub funnel_stages: HashSet<Uuid>,
}

/// Immutable per-tick view of all rule configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSnapshot {
    #[serde(default)]
    pub dialing: Vec<DialingRule>,
    #[serde(default)]
    pub reengagement: Vec<ReengagementRule>,
    #[serde(default)]
    pub catalog: SegmentCatalog,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day(y: i32, mo: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap()
    }

    fn ts(y: i32, mo: u32, d: u32, h: u32, m: u32) -> DateTime<Utc> {
        day(y, mo, d).and_time(at(h, m)).and_utc()
    }

    #[test]
    fn window_contains_business_hours() {
        let rule = DialingRule::new("weekday", Channel::Voice)
            .with_dates(day(2025, 6, 1), None)
            .with_window(at(9, 0), at(17, 0));

        assert!(rule.window_contains(ts(2025, 6, 2, 10, 30)));
        assert!(rule.window_contains(ts(2025, 6, 2, 9, 0)));
        assert!(!rule.window_contains(ts(2025, 6, 2, 8, 59)));
        assert!(!rule.window_contains(ts(2025, 6, 2, 20, 0)));
        assert!(!rule.window_contains(ts(2025, 5, 31, 10, 0)));
    }

    #[test]
    fn window_respects_end_date() {
        let rule = DialingRule::new("campaign", Channel::Voice)
            .with_dates(day(2025, 6, 1), Some(day(2025, 6, 30)))
            .with_window(at(9, 0), at(17, 0));

        assert!(rule.window_contains(ts(2025, 6, 30, 10, 0)));
        assert!(!rule.window_contains(ts(2025, 7, 1, 10, 0)));
    }

    #[test]
    fn window_wraps_midnight() {
        let rule = DialingRule::new("night", Channel::Sms)
            .with_dates(day(2025, 6, 1), None)
            .with_window(at(22, 0), at(6, 0));

        assert!(rule.window_contains(ts(2025, 6, 2, 23, 0)));
        assert!(rule.window_contains(ts(2025, 6, 2, 5, 0)));
        assert!(!rule.window_contains(ts(2025, 6, 2, 12, 0)));
    }

    #[test]
    fn next_window_open_defers_to_same_day() {
        let rule = DialingRule::new("weekday", Channel::Voice)
            .with_dates(day(2025, 6, 1), None)
            .with_window(at(9, 0), at(17, 0));

        let resume = rule.next_window_open(ts(2025, 6, 2, 7, 0)).unwrap();
        assert_eq!(resume, ts(2025, 6, 2, 9, 0));
    }

    #[test]
    fn next_window_open_defers_to_next_day() {
        let rule = DialingRule::new("weekday", Channel::Voice)
            .with_dates(day(2025, 6, 1), None)
            .with_window(at(9, 0), at(17, 0));

        let resume = rule.next_window_open(ts(2025, 6, 2, 18, 0)).unwrap();
        assert_eq!(resume, ts(2025, 6, 3, 9, 0));
    }

    #[test]
    fn next_window_open_inside_window_is_now() {
        let rule = DialingRule::new("weekday", Channel::Voice)
            .with_dates(day(2025, 6, 1), None)
            .with_window(at(9, 0), at(17, 0));

        let now = ts(2025, 6, 2, 11, 0);
        assert_eq!(rule.next_window_open(now), Some(now));
    }

    #[test]
    fn next_window_open_none_after_campaign_ends() {
        let rule = DialingRule::new("campaign", Channel::Voice)
            .with_dates(day(2025, 6, 1), Some(day(2025, 6, 2)))
            .with_window(at(9, 0), at(17, 0));

        assert_eq!(rule.next_window_open(ts(2025, 6, 2, 18, 0)), None);
    }

    #[test]
    fn next_window_open_before_campaign_is_campaign_start() {
        let rule = DialingRule::new("campaign", Channel::Voice)
            .with_dates(day(2025, 6, 10), None)
            .with_window(at(9, 0), at(17, 0));

        let resume = rule.next_window_open(ts(2025, 6, 1, 12, 0)).unwrap();
        assert_eq!(resume, ts(2025, 6, 10, 9, 0));
    }

    #[test]
    fn empty_segmentation_matches_everyone() {
        let seg = Segmentation::default();
        let lead = Lead::new("anyone");
        assert!(seg.is_empty());
        assert!(seg.matches(&lead));
    }

    #[test]
    fn segmentation_requires_matching_tag() {
        let course = Uuid::new_v4();
        let seg = Segmentation {
            courses: vec![course],
            ..Default::default()
        };

        let tagged = Lead::new("in").with_course(course);
        let other = Lead::new("out").with_course(Uuid::new_v4());
        let untagged = Lead::new("none");

        assert!(seg.matches(&tagged));
        assert!(!seg.matches(&other));
        assert!(!seg.matches(&untagged));
    }

    #[test]
    fn segmentation_validation_catches_dangling_refs() {
        let known = Uuid::new_v4();
        let dangling = Uuid::new_v4();
        let catalog = SegmentCatalog {
            funnels: HashSet::from([known]),
            ..Default::default()
        };

        let rule_id = Uuid::new_v4();
        let ok = Segmentation {
            funnels: vec![known],
            ..Default::default()
        };
        let bad = Segmentation {
            funnels: vec![dangling],
            ..Default::default()
        };

        assert!(ok.validate(rule_id, &catalog).is_ok());
        assert!(matches!(
            bad.validate(rule_id, &catalog),
            Err(RuleError::UnknownSegmentRef { kind: "funnel", .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_budget_and_inverted_dates() {
        let catalog = SegmentCatalog::default();

        let zero = DialingRule::new("zero", Channel::Voice).with_budget(0);
        assert!(matches!(
            zero.validate(&catalog),
            Err(RuleError::ZeroBudget { .. })
        ));

        let inverted = DialingRule::new("inverted", Channel::Voice)
            .with_dates(day(2025, 6, 10), Some(day(2025, 6, 1)));
        assert!(matches!(
            inverted.validate(&catalog),
            Err(RuleError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn reengagement_effective_needs_both_flags() {
        let mut rule = ReengagementRule::new("winback", Channel::Whatsapp, 3600);
        assert!(rule.is_effective());
        rule.active = false;
        assert!(!rule.is_effective());
    }

    #[test]
    fn rule_snapshot_serde_roundtrip() {
        let snapshot = RuleSnapshot {
            dialing: vec![
                DialingRule::new("calls", Channel::Voice).with_redial(
                    FailureType::NoAnswer,
                    RedialInterval {
                        interval_minutes: 60,
                        max_attempts: 3,
                    },
                ),
            ],
            reengagement: vec![ReengagementRule::new("winback", Channel::Email, 86400)],
            catalog: SegmentCatalog::default(),
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: RuleSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dialing.len(), 1);
        assert_eq!(
            back.dialing[0].redial_policy(FailureType::NoAnswer),
            Some(RedialInterval {
                interval_minutes: 60,
                max_attempts: 3
            })
        );
        assert_eq!(back.reengagement[0].trigger_after_secs, 86400);
    }
}
