//! Admission control — bounded in-flight attempts per rule and channel.
//!
//! Slot accounting is single-writer behind one mutex; a slot is released
//! exactly once because `SlotPermit` releases on drop and cannot be
//! cloned. Queued requests are served earliest-due-first so a burst of
//! newly-eligible leads cannot starve older pending ones.

use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::channels::Channel;
use crate::error::AdmissionError;

/// Budget identity: one budget per rule+channel.
pub type SlotKey = (Uuid, Channel);

/// A queued acquisition, ordered earliest-due-first.
///
/// The grant carries the permit itself: if the waiting future is dropped
/// after the grant is sent, the unclaimed permit drops with the receiver
/// and the slot is released rather than leaked.
struct Waiter {
    due_at: DateTime<Utc>,
    seq: u64,
    grant: oneshot::Sender<SlotPermit>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    // BinaryHeap is a max-heap; invert so the earliest due_at pops first,
    // with insertion order as the tie-break.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .due_at
            .cmp(&self.due_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Budget {
    limit: u32,
    in_flight: u32,
    next_seq: u64,
    waiters: BinaryHeap<Waiter>,
}

type SlotMap = HashMap<SlotKey, Budget>;

/// Enforces `simultaneous_channels` per rule+channel.
#[derive(Clone, Default)]
pub struct AdmissionController {
    slots: Arc<Mutex<SlotMap>>,
}

fn lock(slots: &Mutex<SlotMap>) -> MutexGuard<'_, SlotMap> {
    // A poisoning panic elsewhere must not wedge admission; the map itself
    // is always left consistent.
    slots.lock().unwrap_or_else(|e| e.into_inner())
}

impl AdmissionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire an in-flight slot, waiting in due-time order when the
    /// budget is full. The permit releases its slot on drop.
    pub async fn acquire(
        &self,
        rule_id: Uuid,
        channel: Channel,
        limit: u32,
        due_at: DateTime<Utc>,
    ) -> Result<SlotPermit, AdmissionError> {
        let key = (rule_id, channel);
        let grant_rx = {
            let mut slots = lock(&self.slots);
            let budget = slots.entry(key).or_default();
            // Rule edits can change the budget between ticks; the latest
            // snapshot wins.
            budget.limit = limit;

            if budget.in_flight < budget.limit {
                budget.in_flight += 1;
                return Ok(SlotPermit::new(Arc::clone(&self.slots), key));
            }

            let (tx, rx) = oneshot::channel();
            budget.next_seq += 1;
            budget.waiters.push(Waiter {
                due_at,
                seq: budget.next_seq,
                grant: tx,
            });
            rx
        };

        grant_rx.await.map_err(|_| AdmissionError::Closed)
    }

    /// In-flight count for a budget (observability and tests).
    pub fn in_flight(&self, rule_id: Uuid, channel: Channel) -> u32 {
        lock(&self.slots)
            .get(&(rule_id, channel))
            .map(|b| b.in_flight)
            .unwrap_or(0)
    }

    /// Queued acquisition count for a budget.
    pub fn queued(&self, rule_id: Uuid, channel: Channel) -> usize {
        lock(&self.slots)
            .get(&(rule_id, channel))
            .map(|b| b.waiters.len())
            .unwrap_or(0)
    }

    /// Total in-flight slots across all budgets.
    pub fn total_in_flight(&self) -> u64 {
        lock(&self.slots).values().map(|b| b.in_flight as u64).sum()
    }
}

/// An acquired in-flight slot. Dropping it releases the slot and hands it
/// to the earliest-due queued waiter, if any.
pub struct SlotPermit {
    slots: Arc<Mutex<SlotMap>>,
    key: SlotKey,
    armed: bool,
}

impl SlotPermit {
    fn new(slots: Arc<Mutex<SlotMap>>, key: SlotKey) -> Self {
        Self {
            slots,
            key,
            armed: true,
        }
    }

    /// Release explicitly. Equivalent to dropping the permit.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        let mut slots = lock(&self.slots);
        let Some(budget) = slots.get_mut(&self.key) else {
            debug_assert!(false, "admission budget vanished while a permit was live");
            return;
        };
        if budget.in_flight == 0 {
            debug_assert!(false, "admission slot released twice");
            return;
        }

        // Budget may have been lowered while this slot was out; shed the
        // slot instead of transferring it.
        if budget.in_flight > budget.limit {
            budget.in_flight -= 1;
            return;
        }

        // Hand the slot to the earliest-due waiter still listening.
        while let Some(waiter) = budget.waiters.pop() {
            let permit = SlotPermit::new(Arc::clone(&self.slots), self.key);
            match waiter.grant.send(permit) {
                Ok(()) => return,
                Err(mut unclaimed) => {
                    // Dead waiter; disarm so the drop below cannot try to
                    // re-lock the map we're holding.
                    unclaimed.armed = false;
                }
            }
        }
        budget.in_flight -= 1;
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn admits_up_to_the_budget() {
        let ctl = AdmissionController::new();
        let rule = Uuid::new_v4();
        let now = Utc::now();

        let p1 = ctl.acquire(rule, Channel::Voice, 2, now).await.unwrap();
        let _p2 = ctl.acquire(rule, Channel::Voice, 2, now).await.unwrap();
        assert_eq!(ctl.in_flight(rule, Channel::Voice), 2);

        // Third must queue.
        let pending = ctl.acquire(rule, Channel::Voice, 2, now);
        tokio::pin!(pending);
        assert!(
            tokio::time::timeout(StdDuration::from_millis(20), &mut pending)
                .await
                .is_err(),
            "third acquisition should be queued"
        );
        assert_eq!(ctl.queued(rule, Channel::Voice), 1);

        drop(p1);
        let p3 = tokio::time::timeout(StdDuration::from_millis(100), &mut pending)
            .await
            .expect("queued acquisition should resolve after a release")
            .unwrap();
        assert_eq!(ctl.in_flight(rule, Channel::Voice), 2);
        drop(p3);
    }

    #[tokio::test]
    async fn waiters_are_served_in_due_time_order() {
        let ctl = AdmissionController::new();
        let rule = Uuid::new_v4();
        let now = Utc::now();

        let held = ctl.acquire(rule, Channel::Voice, 1, now).await.unwrap();

        // Queue a later-due waiter first, then an earlier-due one.
        let late = {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                ctl.acquire(rule, Channel::Voice, 1, now + Duration::hours(3))
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        let early = {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                ctl.acquire(rule, Channel::Voice, 1, now + Duration::hours(1))
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(ctl.queued(rule, Channel::Voice), 2);

        drop(held);
        // The earlier-due waiter gets the slot despite queueing second.
        let early_permit = tokio::time::timeout(StdDuration::from_millis(200), early)
            .await
            .expect("early waiter should be granted first")
            .unwrap();
        assert!(!late.is_finished());

        drop(early_permit);
        let late_permit = tokio::time::timeout(StdDuration::from_millis(200), late)
            .await
            .expect("late waiter should be granted next")
            .unwrap();
        drop(late_permit);
    }

    #[tokio::test]
    async fn cancelled_waiters_do_not_leak_slots() {
        let ctl = AdmissionController::new();
        let rule = Uuid::new_v4();
        let now = Utc::now();

        let held = ctl.acquire(rule, Channel::Voice, 1, now).await.unwrap();

        let doomed = {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                let _ = ctl.acquire(rule, Channel::Voice, 1, now).await;
            })
        };
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        doomed.abort();
        let _ = doomed.await;

        drop(held);
        // The dead waiter is skipped; a fresh acquisition succeeds.
        let p = tokio::time::timeout(
            StdDuration::from_millis(100),
            ctl.acquire(rule, Channel::Voice, 1, now),
        )
        .await
        .expect("slot should be free after skipping the dead waiter")
        .unwrap();
        assert_eq!(ctl.in_flight(rule, Channel::Voice), 1);
        drop(p);
        assert_eq!(ctl.in_flight(rule, Channel::Voice), 0);
    }

    #[tokio::test]
    async fn budgets_are_independent_per_rule_and_channel() {
        let ctl = AdmissionController::new();
        let rule_a = Uuid::new_v4();
        let rule_b = Uuid::new_v4();
        let now = Utc::now();

        let _a = ctl.acquire(rule_a, Channel::Voice, 1, now).await.unwrap();
        // Same channel, different rule: no contention.
        let _b = tokio::time::timeout(
            StdDuration::from_millis(50),
            ctl.acquire(rule_b, Channel::Voice, 1, now),
        )
        .await
        .expect("different rule must not contend")
        .unwrap();
        // Same rule, different channel: no contention.
        let _c = tokio::time::timeout(
            StdDuration::from_millis(50),
            ctl.acquire(rule_a, Channel::Sms, 1, now),
        )
        .await
        .expect("different channel must not contend")
        .unwrap();
    }

    #[tokio::test]
    async fn lowered_budget_sheds_slots_on_release() {
        let ctl = AdmissionController::new();
        let rule = Uuid::new_v4();
        let now = Utc::now();

        let p1 = ctl.acquire(rule, Channel::Voice, 2, now).await.unwrap();
        let p2 = ctl.acquire(rule, Channel::Voice, 2, now).await.unwrap();

        // Budget drops to 1; a new acquisition queues.
        let pending = ctl.acquire(rule, Channel::Voice, 1, now);
        tokio::pin!(pending);
        assert!(
            tokio::time::timeout(StdDuration::from_millis(20), &mut pending)
                .await
                .is_err()
        );

        // First release sheds the excess slot rather than granting it.
        drop(p1);
        assert!(
            tokio::time::timeout(StdDuration::from_millis(20), &mut pending)
                .await
                .is_err()
        );
        assert_eq!(ctl.in_flight(rule, Channel::Voice), 1);

        // Second release grants the waiter within the new budget.
        drop(p2);
        let p3 = tokio::time::timeout(StdDuration::from_millis(100), &mut pending)
            .await
            .expect("waiter should be granted under the new budget")
            .unwrap();
        assert_eq!(ctl.in_flight(rule, Channel::Voice), 1);
        drop(p3);
    }
}
