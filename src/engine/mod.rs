//! The outreach engine — per-tick evaluation and dispatch orchestration.

pub mod admission;
pub mod backoff;
pub mod dispatcher;
pub mod eligibility;
pub mod fallback;
pub mod tick;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::channels::{Channel, ChannelSender};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::ledger::model::OutreachAttempt;
use crate::rules::model::RuleSnapshot;
use crate::rules::resolver::{self, EffectiveRule, RuleWarning};
use crate::store::Database;

pub use admission::{AdmissionController, SlotPermit};
pub use dispatcher::{DispatchOutcome, DispatchPlan, Dispatcher, SkipReason};
pub use eligibility::{Eligibility, LeadAttemptView, NotDueReason};
pub use fallback::ChannelCursor;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A lead-channel pair that reached its attempt ceiling.
///
/// An expected terminal state, surfaced for operator visibility, never
/// retried automatically.
#[derive(Debug, Clone, Serialize)]
pub struct ExhaustedPair {
    pub lead_id: Uuid,
    pub channel: Channel,
    pub rule_id: Uuid,
    pub since: DateTime<Utc>,
}

/// Counters from one scheduling tick.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CycleSummary {
    pub evaluated: usize,
    pub dispatched: usize,
    pub deferred: usize,
    pub not_due: usize,
}

/// Engine counters for the operator API.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub ticks: u64,
    pub dispatched_total: u64,
    pub in_flight: u64,
    pub active_dispatches: usize,
    pub warnings: usize,
    pub exhausted_pairs: usize,
}

/// Bounded, deduplicated buffer of rule configuration warnings.
struct WarningBuffer {
    cap: usize,
    inner: Mutex<WarningState>,
}

#[derive(Default)]
struct WarningState {
    seen: HashSet<(Uuid, String)>,
    items: VecDeque<RuleWarning>,
}

impl WarningBuffer {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            inner: Mutex::new(WarningState::default()),
        }
    }

    fn extend(&self, warnings: Vec<RuleWarning>) {
        let mut state = lock(&self.inner);
        for w in warnings {
            // The same bad rule would warn on every tick; keep one entry.
            if !state.seen.insert((w.rule_id, w.message.clone())) {
                continue;
            }
            warn!(rule_id = %w.rule_id, rule = %w.rule_name, "{}", w.message);
            state.items.push_back(w);
            while state.items.len() > self.cap {
                state.items.pop_front();
            }
        }
    }

    fn snapshot(&self) -> Vec<RuleWarning> {
        lock(&self.inner).items.iter().cloned().collect()
    }

    fn len(&self) -> usize {
        lock(&self.inner).items.len()
    }
}

/// Per-lead evaluation result, applied by the cycle loop.
#[derive(Default)]
struct LeadEvaluation {
    plans: Vec<DispatchPlan>,
    deferred: usize,
    not_due: usize,
    exhausted: Vec<(Channel, Uuid)>,
}

/// The automated outreach retry and channel-orchestration engine.
pub struct OutreachEngine {
    config: EngineConfig,
    store: Arc<dyn Database>,
    dispatcher: Arc<Dispatcher>,
    warnings: WarningBuffer,
    /// Pairs with a dispatch task running right now. The in-process
    /// ordering guard: attempts on a pair are strictly sequential.
    active_pairs: Arc<Mutex<HashSet<(Uuid, Channel)>>>,
    exhausted: Mutex<HashMap<(Uuid, Channel, Uuid), DateTime<Utc>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    ticks: AtomicU64,
    dispatched_total: Arc<AtomicU64>,
}

impl OutreachEngine {
    /// Build an engine over a store and a sender per channel.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Database>,
        senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    ) -> Arc<Self> {
        let admission = Arc::new(AdmissionController::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            senders,
            admission,
            config.dispatch_timeout,
        ));
        Arc::new(Self {
            warnings: WarningBuffer::new(config.warning_buffer_cap),
            config,
            store,
            dispatcher,
            active_pairs: Arc::new(Mutex::new(HashSet::new())),
            exhausted: Mutex::new(HashMap::new()),
            handles: Mutex::new(Vec::new()),
            ticks: AtomicU64::new(0),
            dispatched_total: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run one scheduling cycle at the given instant.
    ///
    /// Fetches a fresh rule snapshot, evaluates every lead concurrently,
    /// and spawns a dispatch task per eligible pair. Dispatch tasks run
    /// independently so one slow channel integration cannot stall
    /// evaluation of unrelated leads.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleSummary> {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        lock(&self.handles).retain(|h| !h.is_finished());

        let snapshot = self.store.load_rule_snapshot().await?;
        let leads = self.store.list_leads().await?;

        let mut summary = CycleSummary {
            evaluated: leads.len(),
            ..Default::default()
        };

        let evaluations: Vec<_> = futures::stream::iter(leads)
            .map(|lead| {
                let snapshot = &snapshot;
                async move { self.evaluate_lead(&lead, snapshot, now).await }
            })
            .buffer_unordered(self.config.max_parallel_evaluations.max(1))
            .collect()
            .await;

        for evaluation in evaluations {
            let evaluation = match evaluation {
                Ok(e) => e,
                Err(e) => {
                    // A broken lead must not block outreach to the others.
                    warn!(error = %e, "Lead evaluation failed, skipping");
                    continue;
                }
            };
            summary.deferred += evaluation.deferred;
            summary.not_due += evaluation.not_due;
            for plan in evaluation.plans {
                if self.begin_dispatch(&plan) {
                    summary.dispatched += 1;
                }
            }
        }

        info!(
            evaluated = summary.evaluated,
            dispatched = summary.dispatched,
            deferred = summary.deferred,
            "Cycle complete"
        );
        Ok(summary)
    }

    /// Evaluate one lead against the snapshot.
    async fn evaluate_lead(
        &self,
        lead: &crate::leads::Lead,
        snapshot: &RuleSnapshot,
        now: DateTime<Utc>,
    ) -> Result<LeadEvaluation> {
        let resolution = resolver::resolve(lead, snapshot, now);
        self.warnings.extend(resolution.warnings);

        let history = self.store.lead_history(lead.id).await?;

        let mut per_channel: HashMap<Channel, Vec<OutreachAttempt>> = HashMap::new();
        let mut in_flight: HashSet<Channel> = HashSet::new();
        for attempt in &history {
            if attempt.status.is_terminal() {
                per_channel
                    .entry(attempt.channel)
                    .or_default()
                    .push(attempt.clone());
            } else {
                in_flight.insert(attempt.channel);
            }
        }
        {
            let active = lock(&self.active_pairs);
            for channel in Channel::ALL {
                if active.contains(&(lead.id, channel)) {
                    in_flight.insert(channel);
                }
            }
        }

        let mut view = LeadAttemptView {
            per_channel,
            in_flight,
            last_attempt_any: history.first().map(|a| a.attempted_at),
            attempts_under_rule: 0,
        };

        let mut out = LeadEvaluation::default();
        for effective in resolution.channels.values() {
            let verdict = match effective {
                EffectiveRule::Dialing(rule) => {
                    view.attempts_under_rule = history
                        .iter()
                        .filter(|a| a.rule_id == rule.id && a.status.is_terminal())
                        .count();
                    eligibility::evaluate_dialing(rule, &view, now)
                }
                EffectiveRule::Reengagement(rule) => eligibility::evaluate_reengagement(
                    rule,
                    lead.last_contact_at,
                    view.in_flight.contains(&rule.preferred_channel),
                    now,
                ),
            };

            match verdict {
                Eligibility::Due { at, channel } => {
                    let limit = match effective {
                        EffectiveRule::Dialing(rule) => rule.simultaneous_channels,
                        EffectiveRule::Reengagement(_) => self.config.reengagement_concurrency,
                    };
                    let sequence =
                        view.per_channel.get(&channel).map(Vec::len).unwrap_or(0) as u32 + 1;
                    out.plans.push(DispatchPlan {
                        lead_id: lead.id,
                        rule_id: effective.rule_id(),
                        channel,
                        limit,
                        payload_ref: effective.payload_ref(),
                        address: lead.address_for(channel).map(String::from),
                        due_at: at,
                        now,
                        sequence,
                    });
                }
                Eligibility::NotDue { reason } => {
                    out.not_due += 1;
                    if matches!(
                        reason,
                        NotDueReason::Exhausted | NotDueReason::NoChannelsLeft
                    ) {
                        out.exhausted.push((
                            match effective {
                                EffectiveRule::Dialing(rule) => rule.channel,
                                EffectiveRule::Reengagement(rule) => rule.preferred_channel,
                            },
                            effective.rule_id(),
                        ));
                    }
                }
                Eligibility::BlockedByWindow { .. } => out.deferred += 1,
            }
        }

        for (channel, rule_id) in &out.exhausted {
            self.mark_exhausted(lead.id, *channel, *rule_id, now);
        }

        Ok(out)
    }

    /// Claim the pair and spawn the dispatch task. Returns false when an
    /// attempt for the pair is already running.
    fn begin_dispatch(&self, plan: &DispatchPlan) -> bool {
        let pair = (plan.lead_id, plan.channel);
        if !lock(&self.active_pairs).insert(pair) {
            return false;
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let active_pairs = Arc::clone(&self.active_pairs);
        let dispatched_total = Arc::clone(&self.dispatched_total);
        let plan = plan.clone();
        let handle = tokio::spawn(async move {
            match dispatcher.dispatch(plan).await {
                Ok(DispatchOutcome::Completed(_)) => {
                    dispatched_total.fetch_add(1, Ordering::Relaxed);
                }
                Ok(DispatchOutcome::Skipped(_)) => {}
                Err(e) => {
                    warn!(error = %e, "Dispatch task failed");
                }
            }
            lock(&active_pairs).remove(&pair);
        });
        lock(&self.handles).push(handle);
        true
    }

    fn mark_exhausted(&self, lead_id: Uuid, channel: Channel, rule_id: Uuid, now: DateTime<Utc>) {
        use std::collections::hash_map::Entry;

        let mut exhausted = lock(&self.exhausted);
        if let Entry::Vacant(entry) = exhausted.entry((lead_id, channel, rule_id)) {
            entry.insert(now);
            info!(
                lead_id = %lead_id,
                channel = %channel,
                rule_id = %rule_id,
                "Lead-channel pair exhausted"
            );
        }
    }

    /// Wait for every spawned dispatch task to finish. Test and shutdown
    /// helper.
    pub async fn drain(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = lock(&self.handles).drain(..).collect();
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    /// Abort all in-flight dispatch tasks.
    pub fn abort_all(&self) {
        for handle in lock(&self.handles).drain(..) {
            handle.abort();
        }
        lock(&self.active_pairs).clear();
    }

    /// Engine counters.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            ticks: self.ticks.load(Ordering::Relaxed),
            dispatched_total: self.dispatched_total.load(Ordering::Relaxed),
            in_flight: self.dispatcher.admission().total_in_flight(),
            active_dispatches: lock(&self.active_pairs).len(),
            warnings: self.warnings.len(),
            exhausted_pairs: lock(&self.exhausted).len(),
        }
    }

    /// Recorded configuration warnings, oldest first.
    pub fn warnings(&self) -> Vec<RuleWarning> {
        self.warnings.snapshot()
    }

    /// Exhausted lead-channel pairs.
    pub fn exhausted(&self) -> Vec<ExhaustedPair> {
        lock(&self.exhausted)
            .iter()
            .map(|((lead_id, channel, rule_id), since)| ExhaustedPair {
                lead_id: *lead_id,
                channel: *channel,
                rule_id: *rule_id,
                since: *since,
            })
            .collect()
    }

    /// Access the backing store (operator API).
    pub fn store(&self) -> &Arc<dyn Database> {
        &self.store
    }

    /// Access the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning(rule_id: Uuid, message: &str) -> RuleWarning {
        RuleWarning {
            rule_id,
            rule_name: "r".into(),
            message: message.into(),
            at: Utc::now(),
        }
    }

    #[test]
    fn warning_buffer_deduplicates_per_rule_and_message() {
        let buffer = WarningBuffer::new(10);
        let rule = Uuid::new_v4();

        buffer.extend(vec![warning(rule, "bad segment")]);
        buffer.extend(vec![warning(rule, "bad segment")]);
        buffer.extend(vec![warning(rule, "another problem")]);

        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn warning_buffer_is_bounded() {
        let buffer = WarningBuffer::new(3);
        for _ in 0..10 {
            buffer.extend(vec![warning(Uuid::new_v4(), "overflow")]);
        }
        assert_eq!(buffer.len(), 3);
    }
}
