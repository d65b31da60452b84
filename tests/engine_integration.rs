//! End-to-end engine tests against the in-memory backend and a scripted
//! channel sender. Cycles are driven with synthetic clocks so backoff and
//! fallback thresholds measured in hours run instantly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use cadence::channels::{Channel, ChannelSender};
use cadence::config::EngineConfig;
use cadence::engine::OutreachEngine;
use cadence::error::DispatchError;
use cadence::leads::Lead;
use cadence::ledger::model::{AttemptStatus, DispatchRecord};
use cadence::ledger::FailureType;
use cadence::rules::model::{ChannelPlan, DialingRule, RedialInterval, ReengagementRule};
use cadence::store::{Database, LibSqlBackend};

/// Scripted sender: per-channel status queues with a configurable delay,
/// plus concurrency accounting for the admission-bound checks.
struct MockSender {
    scripts: Mutex<HashMap<Channel, Vec<AttemptStatus>>>,
    delay: StdDuration,
    calls: Mutex<Vec<(Channel, String)>>,
    current: AtomicU32,
    peak: AtomicU32,
}

impl MockSender {
    fn new(delay: StdDuration) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            delay,
            calls: Mutex::new(Vec::new()),
            current: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        })
    }

    /// Queue statuses for a channel; exhausted queues report `delivered`.
    fn script(&self, channel: Channel, statuses: &[AttemptStatus]) {
        self.scripts
            .lock()
            .unwrap()
            .entry(channel)
            .or_default()
            .extend_from_slice(statuses);
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn peak_concurrency(&self) -> u32 {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSender for MockSender {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(
        &self,
        address: &str,
        channel: Channel,
        _payload_ref: &str,
    ) -> Result<AttemptStatus, DispatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((channel, address.to_string()));

        let now_in_flight = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_in_flight, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        let status = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&channel)
            .and_then(|queue| {
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0))
                }
            })
            .unwrap_or(AttemptStatus::Delivered);
        Ok(status)
    }
}

struct Harness {
    store: Arc<LibSqlBackend>,
    engine: Arc<OutreachEngine>,
    sender: Arc<MockSender>,
}

async fn harness(sender_delay: StdDuration) -> Harness {
    let store = Arc::new(LibSqlBackend::new_memory().await.expect("in-memory db"));
    let sender = MockSender::new(sender_delay);

    let mut senders: HashMap<Channel, Arc<dyn ChannelSender>> = HashMap::new();
    for channel in Channel::ALL {
        senders.insert(channel, sender.clone() as Arc<dyn ChannelSender>);
    }

    let config = EngineConfig {
        dispatch_timeout: StdDuration::from_secs(2),
        ..Default::default()
    };
    let engine = OutreachEngine::new(config, store.clone() as Arc<dyn Database>, senders);

    Harness {
        store,
        engine,
        sender,
    }
}

/// Seed one finalized attempt straight into the ledger.
async fn seed_attempt(
    store: &Arc<LibSqlBackend>,
    lead: Uuid,
    rule: Uuid,
    channel: Channel,
    status: AttemptStatus,
    at: DateTime<Utc>,
    sequence: u32,
) {
    let record = DispatchRecord {
        token: Uuid::new_v4(),
        lead_id: lead,
        rule_id: rule,
        channel,
        attempted_at: at,
        sequence,
    };
    store.record_dispatch(&record).await.unwrap();
    store
        .record_outcome(record.token, status, at)
        .await
        .unwrap();
}

fn retry_rule() -> DialingRule {
    DialingRule::new("voice-retry", Channel::Voice).with_redial(
        FailureType::NoAnswer,
        RedialInterval {
            interval_minutes: 60,
            max_attempts: 3,
        },
    )
}

#[tokio::test]
async fn no_answer_run_exhausts_after_three_attempts() {
    let h = harness(StdDuration::ZERO).await;
    let rule = retry_rule();
    h.store.insert_dialing_rule(&rule).await.unwrap();

    let lead = Lead::new("Ana").with_address(Channel::Voice, "+15551230001");
    h.store.upsert_lead(&lead).await.unwrap();

    let t0 = Utc::now();
    seed_attempt(
        &h.store,
        lead.id,
        rule.id,
        Channel::Voice,
        AttemptStatus::NoAnswer,
        t0,
        1,
    )
    .await;
    h.sender.script(
        Channel::Voice,
        &[AttemptStatus::NoAnswer, AttemptStatus::NoAnswer],
    );

    // Second and third attempts fire once their backoff elapses.
    h.engine.run_cycle(t0 + Duration::minutes(61)).await.unwrap();
    h.engine.drain().await;
    assert_eq!(
        h.store.pair_history(lead.id, Channel::Voice).await.unwrap().len(),
        2
    );

    h.engine.run_cycle(t0 + Duration::minutes(122)).await.unwrap();
    h.engine.drain().await;
    let history = h.store.pair_history(lead.id, Channel::Voice).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|a| a.status == AttemptStatus::NoAnswer));

    // Fourth is suppressed: the pair is exhausted.
    let summary = h
        .engine
        .run_cycle(t0 + Duration::minutes(200))
        .await
        .unwrap();
    h.engine.drain().await;
    assert_eq!(summary.dispatched, 0);
    assert_eq!(
        h.store.pair_history(lead.id, Channel::Voice).await.unwrap().len(),
        3
    );

    let exhausted = h.engine.exhausted();
    assert_eq!(exhausted.len(), 1);
    assert_eq!(exhausted[0].lead_id, lead.id);
    assert_eq!(exhausted[0].channel, Channel::Voice);

    // Monotonic exhaustion: further cycles never add attempts.
    h.engine.run_cycle(t0 + Duration::hours(10)).await.unwrap();
    h.engine.drain().await;
    assert_eq!(
        h.store.pair_history(lead.id, Channel::Voice).await.unwrap().len(),
        3
    );

    // No double contact: consecutive attempts are spaced by the backoff.
    let history = h.store.pair_history(lead.id, Channel::Voice).await.unwrap();
    for pair in history.windows(2) {
        let gap = pair[0].attempted_at - pair[1].attempted_at;
        assert!(gap >= Duration::minutes(60), "gap {gap} under backoff");
    }
}

#[tokio::test]
async fn concurrency_budget_admits_two_of_three_simultaneous_leads() {
    let h = harness(StdDuration::from_millis(150)).await;
    let rule = retry_rule().with_budget(2).with_max_attempts(10);
    h.store.insert_dialing_rule(&rule).await.unwrap();

    let now = Utc::now();
    for i in 0..3 {
        let lead = Lead::new(format!("lead-{i}"))
            .with_address(Channel::Voice, format!("+1555123000{i}"));
        h.store.upsert_lead(&lead).await.unwrap();
        seed_attempt(
            &h.store,
            lead.id,
            rule.id,
            Channel::Voice,
            AttemptStatus::NoAnswer,
            now - Duration::hours(2),
            1,
        )
        .await;
    }

    let summary = h.engine.run_cycle(now).await.unwrap();
    assert_eq!(summary.dispatched, 3);

    // Only two may be in flight at once; the third waits for a slot.
    tokio::time::sleep(StdDuration::from_millis(60)).await;
    assert_eq!(h.sender.call_count(), 2);

    h.engine.drain().await;
    assert_eq!(h.sender.call_count(), 3);
    assert!(h.sender.peak_concurrency() <= 2);
}

#[tokio::test]
async fn fallback_cascade_escalates_to_voice_after_24_hours() {
    let h = harness(StdDuration::ZERO).await;
    let rule = DialingRule::new("omnichannel", Channel::Whatsapp)
        .with_plan(ChannelPlan {
            priority: vec![Channel::Whatsapp, Channel::Voice],
            fallback_after_secs: 86_400,
        })
        .with_redial(
            FailureType::NoAnswer,
            RedialInterval {
                interval_minutes: 60,
                max_attempts: 3,
            },
        );
    h.store.insert_dialing_rule(&rule).await.unwrap();

    let lead = Lead::new("Bruno")
        .with_address(Channel::Whatsapp, "+5511987650001")
        .with_address(Channel::Voice, "+5511987650001");
    h.store.upsert_lead(&lead).await.unwrap();

    // First cycle bootstraps the cascade on whatsapp.
    let t0 = Utc::now();
    h.engine.run_cycle(t0).await.unwrap();
    h.engine.drain().await;
    let wa = h.store.pair_history(lead.id, Channel::Whatsapp).await.unwrap();
    assert_eq!(wa.len(), 1);
    assert_eq!(wa[0].status, AttemptStatus::Delivered);

    // Delivered but unanswered: within the threshold nothing more happens.
    let summary = h.engine.run_cycle(t0 + Duration::hours(1)).await.unwrap();
    h.engine.drain().await;
    assert_eq!(summary.dispatched, 0);

    // Past 24h of silence the lead escalates to voice with fresh counters.
    h.engine.run_cycle(t0 + Duration::hours(25)).await.unwrap();
    h.engine.drain().await;

    let voice = h.store.pair_history(lead.id, Channel::Voice).await.unwrap();
    assert_eq!(voice.len(), 1);
    assert_eq!(voice[0].sequence, 1);
    assert_eq!(
        h.store.pair_history(lead.id, Channel::Whatsapp).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn out_of_window_dispatch_is_deferred_not_dropped() {
    let h = harness(StdDuration::ZERO).await;
    let rule = retry_rule()
        .with_dates(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), None)
        .with_window(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        );
    h.store.insert_dialing_rule(&rule).await.unwrap();

    let lead = Lead::new("Carla").with_address(Channel::Voice, "+15551230002");
    h.store.upsert_lead(&lead).await.unwrap();

    let seed_at = NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_time(NaiveTime::from_hms_opt(16, 0, 0).unwrap())
        .and_utc();
    seed_attempt(
        &h.store,
        lead.id,
        rule.id,
        Channel::Voice,
        AttemptStatus::NoAnswer,
        seed_at,
        1,
    )
    .await;

    // Backoff elapsed at 17:00, but the evening is out of window.
    let evening = seed_at + Duration::hours(4);
    let summary = h.engine.run_cycle(evening).await.unwrap();
    h.engine.drain().await;
    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.deferred, 1);
    assert_eq!(
        h.store.pair_history(lead.id, Channel::Voice).await.unwrap().len(),
        1
    );

    // Next morning the deferred attempt goes out.
    let morning = NaiveDate::from_ymd_opt(2025, 6, 3)
        .unwrap()
        .and_time(NaiveTime::from_hms_opt(9, 30, 0).unwrap())
        .and_utc();
    h.engine.run_cycle(morning).await.unwrap();
    h.engine.drain().await;

    let history = h.store.pair_history(lead.id, Channel::Voice).await.unwrap();
    assert_eq!(history.len(), 2);

    // Window containment: every recorded attempt is inside the window.
    for attempt in &history {
        assert!(
            rule.window_contains(attempt.attempted_at),
            "attempt at {} outside window",
            attempt.attempted_at
        );
    }
}

#[tokio::test]
async fn duplicate_rules_on_one_channel_fire_once_via_the_older_rule() {
    let h = harness(StdDuration::ZERO).await;

    let mut older = retry_rule();
    older.name = "older".into();
    older.created_at = Utc::now() - Duration::days(30);
    let mut newer = retry_rule();
    newer.name = "newer".into();
    h.store.insert_dialing_rule(&older).await.unwrap();
    h.store.insert_dialing_rule(&newer).await.unwrap();

    let lead = Lead::new("Davi").with_address(Channel::Voice, "+15551230003");
    h.store.upsert_lead(&lead).await.unwrap();
    let now = Utc::now();
    seed_attempt(
        &h.store,
        lead.id,
        older.id,
        Channel::Voice,
        AttemptStatus::NoAnswer,
        now - Duration::hours(2),
        1,
    )
    .await;

    h.engine.run_cycle(now).await.unwrap();
    h.engine.drain().await;

    let history = h.store.pair_history(lead.id, Channel::Voice).await.unwrap();
    assert_eq!(history.len(), 2, "exactly one rule may fire per channel");
    assert_eq!(history[0].rule_id, older.id);
}

#[tokio::test]
async fn reengagement_triggers_on_silence_and_fresh_leads() {
    let h = harness(StdDuration::ZERO).await;
    let rule = ReengagementRule::new("winback", Channel::Email, 86_400).with_template("tmpl-9");
    h.store.insert_reengagement_rule(&rule).await.unwrap();

    let now = Utc::now();
    let never = Lead::new("never-contacted").with_address(Channel::Email, "n@uni.edu");
    let recent = Lead::new("recent")
        .with_address(Channel::Email, "r@uni.edu")
        .with_last_contact(now - Duration::hours(2));
    let silent = Lead::new("silent")
        .with_address(Channel::Email, "s@uni.edu")
        .with_last_contact(now - Duration::hours(30));
    for lead in [&never, &recent, &silent] {
        h.store.upsert_lead(lead).await.unwrap();
    }

    let summary = h.engine.run_cycle(now).await.unwrap();
    h.engine.drain().await;
    assert_eq!(summary.dispatched, 2);

    assert_eq!(
        h.store.pair_history(never.id, Channel::Email).await.unwrap().len(),
        1
    );
    assert!(h.store.pair_history(recent.id, Channel::Email).await.unwrap().is_empty());
    assert_eq!(
        h.store.pair_history(silent.id, Channel::Email).await.unwrap().len(),
        1
    );

    // The write-back that future reengagement triggers key off.
    let touched = h.store.get_lead(never.id).await.unwrap().unwrap();
    assert!(touched.last_contact_at.is_some());
    let untouched = h.store.get_lead(recent.id).await.unwrap().unwrap();
    let last = untouched.last_contact_at.unwrap();
    assert!((last - (now - Duration::hours(2))).num_seconds().abs() < 2);
}

#[tokio::test]
async fn overlapping_cycles_never_double_dispatch_a_pair() {
    let h = harness(StdDuration::from_millis(200)).await;
    let rule = ReengagementRule::new("winback", Channel::Email, 3_600);
    h.store.insert_reengagement_rule(&rule).await.unwrap();

    let lead = Lead::new("Eva").with_address(Channel::Email, "e@uni.edu");
    h.store.upsert_lead(&lead).await.unwrap();

    // Second cycle starts while the first dispatch is still in flight;
    // attempts on a pair are strictly sequential.
    let now = Utc::now();
    h.engine.run_cycle(now).await.unwrap();
    h.engine.run_cycle(now).await.unwrap();
    h.engine.drain().await;

    assert_eq!(
        h.store.pair_history(lead.id, Channel::Email).await.unwrap().len(),
        1
    );
    assert_eq!(h.sender.call_count(), 1);
}

#[tokio::test]
async fn malformed_rule_warns_without_blocking_others() {
    let h = harness(StdDuration::ZERO).await;

    // Dangling funnel reference: skipped with a warning.
    let broken = DialingRule::new("broken", Channel::Voice).with_segmentation(
        cadence::rules::Segmentation {
            funnels: vec![Uuid::new_v4()],
            ..Default::default()
        },
    );
    h.store.insert_dialing_rule(&broken).await.unwrap();
    let healthy = ReengagementRule::new("healthy", Channel::Email, 3_600);
    h.store.insert_reengagement_rule(&healthy).await.unwrap();

    let lead = Lead::new("Fabio").with_address(Channel::Email, "f@uni.edu");
    h.store.upsert_lead(&lead).await.unwrap();

    let summary = h.engine.run_cycle(Utc::now()).await.unwrap();
    h.engine.drain().await;

    assert_eq!(summary.dispatched, 1, "healthy rule still fires");
    let warnings = h.engine.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].rule_id, broken.id);
}

#[tokio::test]
async fn disabling_a_rule_stops_new_dispatches() {
    let h = harness(StdDuration::ZERO).await;
    let rule = retry_rule();
    h.store.insert_dialing_rule(&rule).await.unwrap();

    let lead = Lead::new("Gina").with_address(Channel::Voice, "+15551230004");
    h.store.upsert_lead(&lead).await.unwrap();
    let now = Utc::now();
    seed_attempt(
        &h.store,
        lead.id,
        rule.id,
        Channel::Voice,
        AttemptStatus::NoAnswer,
        now - Duration::hours(2),
        1,
    )
    .await;

    h.store.set_dialing_rule_enabled(rule.id, false).await.unwrap();

    h.engine.run_cycle(now).await.unwrap();
    h.engine.drain().await;
    assert_eq!(
        h.store.pair_history(lead.id, Channel::Voice).await.unwrap().len(),
        1,
        "disabled rule must not admit new dispatches"
    );
}
