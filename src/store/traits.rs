//! Unified `Database` trait — single async interface for all persistence.
//!
//! Covers the three narrow collaborator interfaces the engine consumes:
//! the lead directory (read, plus the `last_contact_at` write-back), the
//! read-only rule store, and the append-only attempt ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::channels::Channel;
use crate::error::DatabaseError;
use crate::leads::Lead;
use crate::ledger::model::{AppendOutcome, AttemptStatus, DispatchRecord, OutreachAttempt};
use crate::rules::model::{DialingRule, ReengagementRule, RuleSnapshot};

/// Backend-agnostic database trait covering leads, rules, and the ledger.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Lead directory ──────────────────────────────────────────────

    /// Insert or update a lead.
    async fn upsert_lead(&self, lead: &Lead) -> Result<(), DatabaseError>;

    /// Get a lead by ID.
    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, DatabaseError>;

    /// List every lead.
    async fn list_leads(&self) -> Result<Vec<Lead>, DatabaseError>;

    /// Record that the lead was contacted. The only lead field the engine
    /// ever writes.
    async fn touch_last_contact(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError>;

    // ── Rule store ──────────────────────────────────────────────────
    // Writes exist only for seeding/import; the engine itself reads.

    /// Insert a dialing rule.
    async fn insert_dialing_rule(&self, rule: &DialingRule) -> Result<(), DatabaseError>;

    /// Insert a reengagement rule.
    async fn insert_reengagement_rule(&self, rule: &ReengagementRule)
    -> Result<(), DatabaseError>;

    /// Register a known segment id (kind is "course", "funnel", or
    /// "funnel-stage").
    async fn insert_segment(&self, kind: &str, id: Uuid) -> Result<(), DatabaseError>;

    /// Flip a dialing rule's enabled flag.
    async fn set_dialing_rule_enabled(&self, id: Uuid, enabled: bool)
    -> Result<(), DatabaseError>;

    /// Whether a rule (of either kind) currently admits new dispatches.
    /// Unknown ids report false.
    async fn rule_enabled(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Load one immutable snapshot of all rule configuration.
    async fn load_rule_snapshot(&self) -> Result<RuleSnapshot, DatabaseError>;

    // ── Attempt ledger ──────────────────────────────────────────────

    /// Append an in-flight attempt, idempotent by token.
    async fn record_dispatch(
        &self,
        record: &DispatchRecord,
    ) -> Result<AppendOutcome, DatabaseError>;

    /// Apply the terminal outcome for a dispatch token. Replay-safe: an
    /// already-finalized token reports `Duplicate` and nothing changes.
    async fn record_outcome(
        &self,
        token: Uuid,
        status: AttemptStatus,
        finalized_at: DateTime<Utc>,
    ) -> Result<AppendOutcome, DatabaseError>;

    /// Attempt history for a lead-channel pair, most-recent-first.
    async fn pair_history(
        &self,
        lead_id: Uuid,
        channel: Channel,
    ) -> Result<Vec<OutreachAttempt>, DatabaseError>;

    /// Attempt history for a lead across all channels, most-recent-first.
    async fn lead_history(&self, lead_id: Uuid) -> Result<Vec<OutreachAttempt>, DatabaseError>;

    /// Whether the pair has an attempt still awaiting its terminal status.
    async fn has_in_flight(&self, lead_id: Uuid, channel: Channel)
    -> Result<bool, DatabaseError>;
}
