//! Rule resolution — one effective rule per lead-channel pair.
//!
//! Collects every enabled rule whose segmentation matches the lead, groups
//! by channel, and picks the earliest-created rule per channel. The rest
//! are shadowed. Duplicate active rules on one channel were an operational
//! hazard (two rules firing redundantly); the tie-break makes the cleanup
//! a deterministic policy instead of a manual remediation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::channels::Channel;
use crate::leads::Lead;
use crate::rules::model::{DialingRule, ReengagementRule, RuleSnapshot};

/// The single rule governing a lead on one channel.
#[derive(Debug, Clone)]
pub enum EffectiveRule {
    Dialing(DialingRule),
    Reengagement(ReengagementRule),
}

impl EffectiveRule {
    pub fn rule_id(&self) -> Uuid {
        match self {
            Self::Dialing(r) => r.id,
            Self::Reengagement(r) => r.id,
        }
    }

    pub fn rule_name(&self) -> &str {
        match self {
            Self::Dialing(r) => &r.name,
            Self::Reengagement(r) => &r.name,
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Dialing(r) => r.created_at,
            Self::Reengagement(r) => r.created_at,
        }
    }

    /// Opaque payload reference handed to the channel sender.
    pub fn payload_ref(&self) -> String {
        match self {
            Self::Dialing(r) => r.id.to_string(),
            Self::Reengagement(r) => r.template_ref.clone(),
        }
    }
}

/// A rule that lost the per-channel tie-break.
#[derive(Debug, Clone, Serialize)]
pub struct ShadowedRule {
    pub rule_id: Uuid,
    pub channel: Channel,
    pub shadowed_by: Uuid,
}

/// A per-rule configuration problem, recorded and skipped.
#[derive(Debug, Clone, Serialize)]
pub struct RuleWarning {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Result of resolving one lead against a rule snapshot.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Winner per channel.
    pub channels: HashMap<Channel, EffectiveRule>,
    /// Rules suppressed by the tie-break.
    pub shadowed: Vec<ShadowedRule>,
    /// Malformed rules skipped during this resolution.
    pub warnings: Vec<RuleWarning>,
}

/// Resolve the effective rule set for a lead.
///
/// A malformed rule produces a warning and is skipped; it never blocks
/// resolution of the remaining rules.
pub fn resolve(lead: &Lead, snapshot: &RuleSnapshot, now: DateTime<Utc>) -> Resolution {
    let mut resolution = Resolution::default();
    let mut candidates: HashMap<Channel, Vec<EffectiveRule>> = HashMap::new();

    for rule in &snapshot.dialing {
        if !rule.enabled {
            continue;
        }
        if let Err(e) = rule.validate(&snapshot.catalog) {
            resolution.warnings.push(RuleWarning {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                message: e.to_string(),
                at: now,
            });
            continue;
        }
        if rule.segmentation.as_ref().is_some_and(|s| !s.matches(lead)) {
            continue;
        }
        candidates
            .entry(rule.channel)
            .or_default()
            .push(EffectiveRule::Dialing(rule.clone()));
    }

    for rule in &snapshot.reengagement {
        if !rule.is_effective() {
            continue;
        }
        if let Err(e) = rule.validate(&snapshot.catalog) {
            resolution.warnings.push(RuleWarning {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                message: e.to_string(),
                at: now,
            });
            continue;
        }
        if rule.segmentation.as_ref().is_some_and(|s| !s.matches(lead)) {
            continue;
        }
        candidates
            .entry(rule.preferred_channel)
            .or_default()
            .push(EffectiveRule::Reengagement(rule.clone()));
    }

    for (channel, mut group) in candidates {
        // An active retry takes precedence over a fresh reengagement
        // trigger; within a kind the earliest-created rule wins, ties
        // broken by id so repeated resolutions agree.
        group.sort_by_key(|r| {
            (
                matches!(r, EffectiveRule::Reengagement(_)),
                r.created_at(),
                r.rule_id(),
            )
        });
        let mut group = group.into_iter();
        let Some(winner) = group.next() else {
            continue;
        };
        for loser in group {
            debug!(
                lead_id = %lead.id,
                rule_id = %loser.rule_id(),
                winner = %winner.rule_id(),
                channel = %channel,
                "Rule shadowed by earlier-created rule on same channel"
            );
            resolution.shadowed.push(ShadowedRule {
                rule_id: loser.rule_id(),
                channel,
                shadowed_by: winner.rule_id(),
            });
        }
        resolution.channels.insert(channel, winner);
    }

    resolution
}
