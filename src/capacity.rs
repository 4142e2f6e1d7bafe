// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Capacity gate for the Scheduler (spec 4.1, 4.5, 9) — caps live Ships at
//! `MAX_SHIP_NUM` and implements the `reject`/`wait` back-pressure policies.
//!
//! Resolves spec.md 9's "waiter queue vs. semaphore" note in favor of a
//! `tokio::sync::Semaphore`: `acquire_owned` gives FIFO fairness and a permit
//! that, once dropped, signals the next waiter automatically — no hand-rolled
//! queue bookkeeping needed. `BEHAVIOR_AFTER_MAX_SHIP=reject` does a
//! non-blocking `try_acquire_owned` instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{AcquireError, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

use crate::error::ShipyardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    Reject,
    Wait,
}

impl std::str::FromStr for AdmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(AdmissionPolicy::Reject),
            "wait" => Ok(AdmissionPolicy::Wait),
            other => Err(format!("unknown BEHAVIOR_AFTER_MAX_SHIP value: {other}")),
        }
    }
}

/// An owned permit reserving one of `MAX_SHIP_NUM` fleet slots. Dropping it
/// (e.g. when a Ship transitions to `Stopped`) releases the slot and wakes
/// the next FIFO waiter.
pub struct Slot {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

pub struct Capacity {
    semaphore: Arc<Semaphore>,
    policy: AdmissionPolicy,
    max: usize,
    waiters: AtomicUsize,
    /// Slots held on behalf of a live Ship, keyed by Ship id, so the Reaper
    /// (or an explicit DELETE) can release the permit on transition to
    /// `Stopped` without the Scheduler call stack that acquired it staying
    /// alive that whole time.
    held: parking_lot::Mutex<std::collections::HashMap<uuid::Uuid, Slot>>,
}

impl Capacity {
    pub fn new(max_ship_num: usize, policy: AdmissionPolicy) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_ship_num)),
            policy,
            max: max_ship_num,
            waiters: AtomicUsize::new(0),
            held: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Transfers ownership of a reserved slot to the registry, keyed by Ship
    /// id, so it outlives the `CreateShip` call that acquired it.
    pub fn hold(&self, ship_id: uuid::Uuid, slot: Slot) {
        self.held.lock().insert(ship_id, slot);
    }

    /// Drops the slot held for a Ship, releasing it back to the semaphore and
    /// waking the next FIFO waiter. No-op if nothing was held (e.g. the Ship
    /// never got past the reservation step).
    pub fn release(&self, ship_id: uuid::Uuid) {
        self.held.lock().remove(&ship_id);
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Current number of reserved (in-use) slots.
    pub fn live_count(&self) -> usize {
        self.max.saturating_sub(self.semaphore.available_permits())
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }

    /// Reserves a slot per `BEHAVIOR_AFTER_MAX_SHIP`: `reject` fails immediately
    /// when the fleet is full; `wait` blocks FIFO until one is released or
    /// `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Slot, ShipyardError> {
        match self.policy {
            AdmissionPolicy::Reject => match Arc::clone(&self.semaphore).try_acquire_owned() {
                Ok(permit) => Ok(Slot { _permit: permit }),
                Err(TryAcquireError::NoPermits) => Err(ShipyardError::CapacityExhausted(
                    "fleet at MAX_SHIP_NUM".into(),
                )),
                Err(TryAcquireError::Closed) => {
                    Err(ShipyardError::Internal("capacity semaphore closed".into()))
                }
            },
            AdmissionPolicy::Wait => {
                self.waiters.fetch_add(1, Ordering::Relaxed);
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ShipyardError::InvalidArgument(
                        "CreateShip cancelled while waiting for capacity".into(),
                    )),
                    permit = Arc::clone(&self.semaphore).acquire_owned() => {
                        permit.map(|p| Slot { _permit: p }).map_err(|e: AcquireError| {
                            ShipyardError::Internal(format!("capacity semaphore closed: {e}"))
                        })
                    }
                };
                self.waiters.fetch_sub(1, Ordering::Relaxed);
                result
            }
        }
    }

    /// Used by Recovery (spec 4.9 step 6) to initialize the live-count from
    /// Ships restored as `Running`, holding one slot per id for the rest of
    /// their life exactly as `CreateShip` would have.
    pub fn reserve_restored(&self, ship_ids: &[uuid::Uuid]) -> usize {
        let mut reserved = 0;
        for &id in ship_ids {
            if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
                self.hold(id, Slot { _permit: permit });
                reserved += 1;
            }
        }
        reserved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn reject_policy_fails_fast_when_full() {
        let cap = Capacity::new(1, AdmissionPolicy::Reject);
        let cancel = CancellationToken::new();
        let slot = cap.acquire(&cancel).await.unwrap();
        let err = cap.acquire(&cancel).await.unwrap_err();
        assert!(matches!(err, ShipyardError::CapacityExhausted(_)));
        drop(slot);
        assert!(cap.acquire(&cancel).await.is_ok());
    }

    #[tokio::test]
    async fn wait_policy_unblocks_in_fifo_order_on_release() {
        let cap = Arc::new(Capacity::new(1, AdmissionPolicy::Wait));
        let cancel = CancellationToken::new();
        let first = cap.acquire(&cancel).await.unwrap();

        let cap2 = Arc::clone(&cap);
        let waiter = tokio::spawn(async move {
            let cancel = CancellationToken::new();
            cap2.acquire(&cancel).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cap.waiter_count(), 1);
        drop(first);

        let second = waiter.await.unwrap().unwrap();
        assert_eq!(cap.live_count(), 1);
        drop(second);
    }

    #[tokio::test]
    async fn wait_policy_honors_cancellation() {
        let cap = Arc::new(Capacity::new(1, AdmissionPolicy::Wait));
        let outer_cancel = CancellationToken::new();
        let _held = cap.acquire(&outer_cancel).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cap.acquire(&cancel).await.unwrap_err();
        assert!(matches!(err, ShipyardError::InvalidArgument(_)));
    }

    #[test]
    fn policy_parses_from_env_style_strings() {
        assert_eq!("reject".parse::<AdmissionPolicy>().unwrap(), AdmissionPolicy::Reject);
        assert_eq!("WAIT".parse::<AdmissionPolicy>().unwrap(), AdmissionPolicy::Wait);
        assert!("bogus".parse::<AdmissionPolicy>().is_err());
    }
}
