use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use processing_core::{ConstraintChecker, ExecutionId, QuotaUsage};
use tracing::debug;
use uuid::Uuid;

use crate::traits::{QuotaLedger, QuotaReservation, ReserveOutcome};

struct Held {
    reservation: QuotaReservation,
    slot: bool,
    bytes: bool,
}

#[derive(Default)]
struct LedgerState {
    parallel_by_user: HashMap<String, u64>,
    bytes_by_process: HashMap<Uuid, u64>,
    held: HashMap<ExecutionId, Held>,
}

impl LedgerState {
    fn usage(&self, user: &str, process_business_id: Uuid) -> QuotaUsage {
        QuotaUsage {
            parallel_executions_for_user: self.parallel_by_user.get(user).copied().unwrap_or(0),
            bytes_in_cache: self
                .bytes_by_process
                .get(&process_business_id)
                .copied()
                .unwrap_or(0),
        }
    }

    fn projected(&self, reservation: &QuotaReservation) -> QuotaUsage {
        let current = self.usage(&reservation.user, reservation.process_business_id);
        QuotaUsage {
            parallel_executions_for_user: current.parallel_executions_for_user.saturating_add(1),
            bytes_in_cache: current.bytes_in_cache.saturating_add(reservation.bytes),
        }
    }

    fn release_slot(&mut self, reservation: &QuotaReservation) {
        if let Some(count) = self.parallel_by_user.get_mut(&reservation.user) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.parallel_by_user.remove(&reservation.user);
            }
        }
    }

    fn release_bytes(&mut self, reservation: &QuotaReservation) {
        if let Some(bytes) = self.bytes_by_process.get_mut(&reservation.process_business_id) {
            *bytes = bytes.saturating_sub(reservation.bytes);
            if *bytes == 0 {
                self.bytes_by_process.remove(&reservation.process_business_id);
            }
        }
    }
}

/// Quota ledger keeping counters in memory under a single lock.
///
/// The check and the increment of [`QuotaLedger::try_reserve`] happen under
/// the same lock, so concurrent submissions cannot both pass a limit that
/// only one of them fits under.
#[derive(Default)]
pub struct InMemoryQuotaLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryQuotaLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current usage for a user and process, excluding any new submission.
    #[must_use]
    pub fn usage(&self, user: &str, process_business_id: Uuid) -> QuotaUsage {
        self.state.lock().usage(user, process_business_id)
    }
}

#[async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn projected(&self, reservation: &QuotaReservation) -> anyhow::Result<QuotaUsage> {
        Ok(self.state.lock().projected(reservation))
    }

    async fn try_reserve(
        &self,
        reservation: QuotaReservation,
        limits: &ConstraintChecker<QuotaUsage>,
    ) -> anyhow::Result<ReserveOutcome> {
        let mut state = self.state.lock();
        if state.held.contains_key(&reservation.execution_id) {
            return Ok(ReserveOutcome::AlreadyHeld);
        }
        let violations = limits.check(&state.projected(&reservation));
        if !violations.is_empty() {
            return Ok(ReserveOutcome::Rejected(violations));
        }

        *state
            .parallel_by_user
            .entry(reservation.user.clone())
            .or_insert(0) += 1;
        let bytes = state
            .bytes_by_process
            .entry(reservation.process_business_id)
            .or_insert(0);
        *bytes = bytes.saturating_add(reservation.bytes);
        debug!(
            execution_id = %reservation.execution_id,
            user = %reservation.user,
            bytes = reservation.bytes,
            "quota reserved"
        );
        state.held.insert(
            reservation.execution_id,
            Held {
                reservation,
                slot: true,
                bytes: true,
            },
        );
        Ok(ReserveOutcome::Reserved)
    }

    async fn release(&self, execution_id: ExecutionId, keep_cached: bool) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        let Some(mut held) = state.held.remove(&execution_id) else {
            return Ok(());
        };
        if held.slot {
            state.release_slot(&held.reservation);
            held.slot = false;
        }
        if held.bytes && !keep_cached {
            state.release_bytes(&held.reservation);
            held.bytes = false;
        }
        if held.bytes {
            state.held.insert(execution_id, held);
        }
        Ok(())
    }

    async fn evict_cached(&self, execution_id: ExecutionId) -> anyhow::Result<bool> {
        let mut state = self.state.lock();
        let Some(held) = state.held.remove(&execution_id) else {
            return Ok(false);
        };
        let had_bytes = held.bytes;
        if had_bytes {
            state.release_bytes(&held.reservation);
        }
        if held.slot {
            // Still running: the slot stays held.
            state.held.insert(
                execution_id,
                Held {
                    bytes: false,
                    ..held
                },
            );
        }
        Ok(had_bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use processing_core::QuotaLimits;
    use proptest::prelude::*;

    use super::*;

    fn reservation(user: &str, process: Uuid, bytes: u64) -> QuotaReservation {
        QuotaReservation {
            execution_id: ExecutionId::random(),
            user: user.to_string(),
            process_business_id: process,
            bytes,
        }
    }

    fn limits(parallel: Option<u64>, bytes: Option<u64>) -> ConstraintChecker<QuotaUsage> {
        QuotaLimits {
            max_parallel_executions_for_user: parallel,
            max_bytes_in_cache: bytes,
        }
        .checker()
    }

    #[tokio::test]
    async fn projection_adds_the_submission() {
        let ledger = InMemoryQuotaLedger::new();
        let process = Uuid::new_v4();
        ledger
            .try_reserve(reservation("u", process, 10), &limits(None, None))
            .await
            .unwrap();

        let projected = ledger.projected(&reservation("u", process, 5)).await.unwrap();
        assert_eq!(projected.parallel_executions_for_user, 2);
        assert_eq!(projected.bytes_in_cache, 15);
    }

    #[tokio::test]
    async fn reserve_rejects_over_parallel_limit() {
        let ledger = InMemoryQuotaLedger::new();
        let process = Uuid::new_v4();
        let checker = limits(Some(2), None);
        for _ in 0..2 {
            let outcome = ledger
                .try_reserve(reservation("u", process, 0), &checker)
                .await
                .unwrap();
            assert_eq!(outcome, ReserveOutcome::Reserved);
        }

        let outcome = ledger
            .try_reserve(reservation("u", process, 0), &checker)
            .await
            .unwrap();
        assert!(matches!(outcome, ReserveOutcome::Rejected(ref v) if v.len() == 1));
        assert_eq!(ledger.usage("u", process).parallel_executions_for_user, 2);

        // Another user is counted separately.
        let outcome = ledger
            .try_reserve(reservation("v", process, 0), &checker)
            .await
            .unwrap();
        assert_eq!(outcome, ReserveOutcome::Reserved);
    }

    #[tokio::test]
    async fn reserving_same_execution_twice_counts_once() {
        let ledger = InMemoryQuotaLedger::new();
        let res = reservation("u", Uuid::new_v4(), 7);
        let first = ledger.try_reserve(res.clone(), &limits(None, None)).await.unwrap();
        // A limit the hold already exceeds is not checked again.
        let second = ledger.try_reserve(res.clone(), &limits(Some(0), None)).await.unwrap();

        assert_eq!(first, ReserveOutcome::Reserved);
        assert_eq!(second, ReserveOutcome::AlreadyHeld);
        assert_eq!(
            ledger.usage("u", res.process_business_id),
            QuotaUsage {
                parallel_executions_for_user: 1,
                bytes_in_cache: 7
            }
        );
    }

    #[tokio::test]
    async fn failed_release_frees_slot_and_bytes() {
        let ledger = InMemoryQuotaLedger::new();
        let res = reservation("u", Uuid::new_v4(), 7);
        ledger.try_reserve(res.clone(), &limits(None, None)).await.unwrap();

        ledger.release(res.execution_id, false).await.unwrap();
        assert_eq!(ledger.usage("u", res.process_business_id), QuotaUsage::default());
        assert!(!ledger.evict_cached(res.execution_id).await.unwrap());
    }

    #[tokio::test]
    async fn success_keeps_bytes_until_evicted() {
        let ledger = InMemoryQuotaLedger::new();
        let res = reservation("u", Uuid::new_v4(), 7);
        ledger.try_reserve(res.clone(), &limits(None, None)).await.unwrap();

        ledger.release(res.execution_id, true).await.unwrap();
        let usage = ledger.usage("u", res.process_business_id);
        assert_eq!(usage.parallel_executions_for_user, 0);
        assert_eq!(usage.bytes_in_cache, 7);

        assert!(ledger.evict_cached(res.execution_id).await.unwrap());
        assert_eq!(ledger.usage("u", res.process_business_id), QuotaUsage::default());
        assert!(!ledger.evict_cached(res.execution_id).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_reservations_never_exceed_limit() {
        let ledger = Arc::new(InMemoryQuotaLedger::new());
        let process = Uuid::new_v4();
        let checker = limits(Some(3), None);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let checker = checker.clone();
                tokio::spawn(async move {
                    ledger
                        .try_reserve(reservation("u", process, 0), &checker)
                        .await
                        .unwrap()
                        == ReserveOutcome::Reserved
                })
            })
            .collect();
        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 3);
        assert_eq!(ledger.usage("u", process).parallel_executions_for_user, 3);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(u64),
        Release { index: usize, keep_cached: bool },
        Evict(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..100).prop_map(Op::Reserve),
            (any::<usize>(), any::<bool>())
                .prop_map(|(index, keep_cached)| Op::Release { index, keep_cached }),
            any::<usize>().prop_map(Op::Evict),
        ]
    }

    proptest! {
        /// Counters always equal what the held reservations add up to, and the
        /// parallel limit is never exceeded.
        #[test]
        fn counters_match_held_reservations(ops in prop::collection::vec(op(), 1..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let ledger = InMemoryQuotaLedger::new();
                let process = Uuid::new_v4();
                let checker = limits(Some(4), None);
                // (id, holds a slot, cached bytes still held)
                let mut model: Vec<(ExecutionId, bool, Option<u64>)> = Vec::new();

                for op in ops {
                    match op {
                        Op::Reserve(bytes) => {
                            let res = reservation("u", process, bytes);
                            let id = res.execution_id;
                            let accepted = ledger.try_reserve(res, &checker).await.unwrap()
                                == ReserveOutcome::Reserved;
                            let running = model.iter().filter(|(_, r, _)| *r).count();
                            prop_assert_eq!(accepted, running < 4);
                            if accepted {
                                model.push((id, true, Some(bytes)));
                            }
                        }
                        Op::Release { index, keep_cached } if !model.is_empty() => {
                            let len = model.len();
                            let entry = &mut model[index % len];
                            ledger.release(entry.0, keep_cached).await.unwrap();
                            entry.1 = false;
                            if !keep_cached {
                                entry.2 = None;
                            }
                        }
                        Op::Evict(index) if !model.is_empty() => {
                            let len = model.len();
                            let entry = &mut model[index % len];
                            let evicted = ledger.evict_cached(entry.0).await.unwrap();
                            prop_assert_eq!(evicted, entry.2.is_some());
                            entry.2 = None;
                        }
                        _ => {}
                    }

                    let usage = ledger.usage("u", process);
                    let running = model.iter().filter(|(_, r, _)| *r).count() as u64;
                    let cached: u64 = model.iter().filter_map(|(_, _, b)| *b).sum();
                    prop_assert!(usage.parallel_executions_for_user <= 4);
                    prop_assert_eq!(usage.parallel_executions_for_user, running);
                    prop_assert_eq!(usage.bytes_in_cache, cached);
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
