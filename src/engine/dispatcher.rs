//! Dispatch execution — one admitted attempt from slot to ledger.
//!
//! The dispatcher owns the only I/O-blocking step in the engine. Each
//! dispatch: admission slot → idempotent in-flight append → sender call
//! under a timeout → terminal outcome → `last_contact_at` write-back.
//! The slot is an RAII permit, so every exit path releases it exactly
//! once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channels::{Channel, ChannelSender, plausible_address};
use crate::engine::admission::AdmissionController;
use crate::error::Result;
use crate::ledger::model::{AppendOutcome, AttemptStatus, DispatchRecord};
use crate::store::Database;

/// Everything needed to place one attempt, assembled at evaluation time.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    pub lead_id: Uuid,
    pub rule_id: Uuid,
    pub channel: Channel,
    /// Admission budget for this rule+channel.
    pub limit: u32,
    /// Opaque payload reference handed to the sender.
    pub payload_ref: String,
    /// The lead's address on this channel, if any.
    pub address: Option<String>,
    /// When the lead became due; admission serves earliest-due first.
    pub due_at: DateTime<Utc>,
    /// The evaluating tick's clock; recorded as `attempted_at`.
    pub now: DateTime<Utc>,
    /// 1-based position within the pair's attempt run.
    pub sequence: u32,
}

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// An attempt was recorded with this terminal status.
    Completed(AttemptStatus),
    /// No attempt was made.
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The rule was disabled after evaluation; no new dispatches admitted.
    RuleDisabled,
    /// The idempotency token was already in the ledger (overlapping tick).
    DuplicateToken,
}

/// Executes admitted dispatch plans.
pub struct Dispatcher {
    store: Arc<dyn Database>,
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    admission: Arc<AdmissionController>,
    timeout: std::time::Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Database>,
        senders: HashMap<Channel, Arc<dyn ChannelSender>>,
        admission: Arc<AdmissionController>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            senders,
            admission,
            timeout,
        }
    }

    /// Get access to the admission controller.
    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Execute one dispatch plan end to end.
    pub async fn dispatch(&self, plan: DispatchPlan) -> Result<DispatchOutcome> {
        // A rule disabled mid-flight admits no new dispatches; in-progress
        // ones still complete and record their outcome.
        if !self.store.rule_enabled(plan.rule_id).await? {
            debug!(rule_id = %plan.rule_id, lead_id = %plan.lead_id, "Rule disabled, dispatch skipped");
            return Ok(DispatchOutcome::Skipped(SkipReason::RuleDisabled));
        }

        let _permit = self
            .admission
            .acquire(plan.rule_id, plan.channel, plan.limit, plan.due_at)
            .await?;

        let token = Uuid::new_v4();
        let record = DispatchRecord {
            token,
            lead_id: plan.lead_id,
            rule_id: plan.rule_id,
            channel: plan.channel,
            attempted_at: plan.now,
            sequence: plan.sequence,
        };
        if self.store.record_dispatch(&record).await? == AppendOutcome::Duplicate {
            warn!(token = %token, lead_id = %plan.lead_id, "Duplicate dispatch token, skipping");
            return Ok(DispatchOutcome::Skipped(SkipReason::DuplicateToken));
        }

        let status = self.place_attempt(&plan).await;

        if self
            .store
            .record_outcome(token, status, Utc::now())
            .await?
            == AppendOutcome::Duplicate
        {
            warn!(token = %token, "Outcome already recorded for dispatch token");
        }

        if let Err(e) = self.store.touch_last_contact(plan.lead_id, plan.now).await {
            warn!(lead_id = %plan.lead_id, error = %e, "Failed to update last contact timestamp");
        }

        debug!(
            lead_id = %plan.lead_id,
            channel = %plan.channel,
            status = %status,
            sequence = plan.sequence,
            "Attempt finalized"
        );

        Ok(DispatchOutcome::Completed(status))
    }

    /// Call the channel sender and classify the result.
    ///
    /// Transport failures and timeouts come back as the `error` failure
    /// type so they participate in normal backoff and self-heal via retry.
    /// An unusable address maps to `invalid-number` instead.
    async fn place_attempt(&self, plan: &DispatchPlan) -> AttemptStatus {
        match self.try_send(plan).await {
            Ok(status) => status,
            Err(e) => {
                let status = match &e {
                    crate::error::DispatchError::MissingAddress { .. } => {
                        AttemptStatus::InvalidNumber
                    }
                    _ => AttemptStatus::Error,
                };
                warn!(
                    lead_id = %plan.lead_id,
                    channel = %plan.channel,
                    error = %e,
                    status = %status,
                    "Dispatch attempt failed"
                );
                status
            }
        }
    }

    async fn try_send(
        &self,
        plan: &DispatchPlan,
    ) -> std::result::Result<AttemptStatus, crate::error::DispatchError> {
        use crate::error::DispatchError;

        let address = plan
            .address
            .as_deref()
            .ok_or(DispatchError::MissingAddress {
                lead_id: plan.lead_id,
                channel: plan.channel,
            })?;
        if !plausible_address(plan.channel, address) {
            warn!(lead_id = %plan.lead_id, channel = %plan.channel, "Implausible address, not dispatched");
            return Ok(AttemptStatus::InvalidNumber);
        }

        let sender = self
            .senders
            .get(&plan.channel)
            .ok_or(DispatchError::NoSender {
                channel: plan.channel,
            })?;

        let result = tokio::time::timeout(
            self.timeout,
            sender.send(address, plan.channel, &plan.payload_ref),
        )
        .await;

        match result {
            Err(_) => Err(DispatchError::Timeout {
                after: self.timeout,
            }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(status)) if status.is_terminal() => Ok(status),
            Ok(Ok(status)) => Err(DispatchError::NonTerminalStatus {
                status: status.to_string(),
            }),
        }
    }
}
