// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! TTL Reaper (spec 4.5) — a single background task, grounded in the shape of
//! the teacher's `LifecycleManager::run_cleanup_task` periodic-scan loop, that
//! expires Ships past their deadline and exposes `ExtendTTL`.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::affinity::AffinityIndex;
use crate::capacity::Capacity;
use crate::driver::ContainerDriver;
use crate::error::ShipyardError;
use crate::model::ShipStatus;
use crate::repository::ShipRepository;

/// Bounded retries for a stop that fails mid-teardown (spec.md 4.5): after
/// exhaustion the record is marked Stopped anyway and the container id is
/// logged for manual cleanup.
const MAX_STOP_RETRIES: u32 = 3;

pub struct Reaper {
    driver: Arc<dyn ContainerDriver>,
    repository: Arc<dyn ShipRepository>,
    affinity: Arc<AffinityIndex>,
    capacity: Arc<Capacity>,
    scan_interval: Duration,
}

impl Reaper {
    pub fn new(
        driver: Arc<dyn ContainerDriver>,
        repository: Arc<dyn ShipRepository>,
        affinity: Arc<AffinityIndex>,
        capacity: Arc<Capacity>,
        scan_interval: Duration,
    ) -> Self {
        Self { driver, repository, affinity, capacity, scan_interval }
    }

    /// Runs until cancelled. Correctness only requires expiries fire within
    /// one tick of deadline (spec.md 4.5), so a periodic scan at a bounded
    /// interval is sufficient implementation freedom — no min-heap needed.
    pub async fn run(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken) {
        let mut ticker = interval(self.scan_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("ttl reaper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    async fn sweep(&self) {
        let live = match self.repository.list_live().await {
            Ok(ships) => ships,
            Err(e) => {
                error!("reaper failed to list live ships: {e}");
                return;
            }
        };

        let now = chrono::Utc::now();
        for ship in live {
            if ship.status == ShipStatus::Running && ship.is_expired(now) {
                self.expire(ship.id).await;
            }
        }

        self.sweep_orphan_containers().await;
    }

    /// Removes containers the driver recognizes as Ship containers but that
    /// no Ship record references (spec 4.5: a failed stop/remove leaves one
    /// behind; this catches it on the next tick instead of waiting for a
    /// human to notice the logged orphan id).
    async fn sweep_orphan_containers(&self) {
        let managed = match self.driver.list_managed_containers().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("reaper failed to list managed containers: {e}");
                return;
            }
        };
        if managed.is_empty() {
            return;
        }

        let known: std::collections::HashSet<String> = match self
            .repository
            .list(&Default::default())
            .await
        {
            Ok(ships) => ships.into_iter().filter_map(|s| s.container_id).collect(),
            Err(e) => {
                warn!("reaper failed to list ship records for orphan sweep: {e}");
                return;
            }
        };

        for container_id in managed {
            if !known.contains(&container_id) {
                warn!(%container_id, "removing orphan ship container with no matching record");
                let _ = self.driver.stop(&container_id, Duration::from_secs(5)).await;
                let _ = self.driver.remove(&container_id).await;
            }
        }
    }

    async fn expire(&self, ship_id: Uuid) {
        let mut ship = match self.repository.get(ship_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(%ship_id, "reaper could not reload ship before expiry: {e}");
                return;
            }
        };

        debug!(%ship_id, "deadline reached, expiring ship");

        if let Err(e) = self.affinity.unbind(ship_id).await {
            warn!(%ship_id, "failed to unbind sessions during expiry: {e}");
        }

        if let Some(container_id) = ship.container_id.clone() {
            let mut stopped = false;
            for attempt in 1..=MAX_STOP_RETRIES {
                match self.driver.stop(&container_id, Duration::from_secs(10)).await {
                    Ok(()) => {
                        stopped = true;
                        break;
                    }
                    Err(e) => warn!(%ship_id, attempt, "reaper stop attempt failed: {e}"),
                }
            }
            if !stopped {
                error!(
                    %ship_id, %container_id,
                    "reaper exhausted stop retries; marking stopped with orphan container for manual cleanup"
                );
            } else if let Err(e) = self.driver.remove(&container_id).await {
                warn!(%ship_id, %container_id, "reaper remove failed after stop: {e}");
            }
        }

        ship.status = ShipStatus::Stopped;
        ship.updated_at = chrono::Utc::now();
        if let Err(e) = self.repository.update(&ship).await {
            error!(%ship_id, "failed to persist Stopped transition: {e}");
        }

        self.capacity.release(ship_id);
        info!(%ship_id, "ship expired and torn down");
    }

    /// ExtendTTL(ship_id, seconds), spec.md 4.5. `deadline = now + seconds`,
    /// an absolute recompute rather than additive extension of the old one.
    pub async fn extend_ttl(&self, ship_id: Uuid, seconds: i64) -> Result<crate::model::Ship, ShipyardError> {
        if seconds <= 0 {
            return Err(ShipyardError::InvalidArgument("ttl seconds must be positive".into()));
        }

        let mut ship = self.repository.get(ship_id).await?;
        if ship.status == ShipStatus::Stopped {
            return Err(ShipyardError::IllegalState(format!("ship {ship_id} is stopped")));
        }

        ship.extend(seconds, chrono::Utc::now());
        self.repository.update(&ship).await?;
        info!(%ship_id, new_deadline = %ship.deadline, "ttl extended");
        Ok(ship)
    }

    /// Explicit DELETE /ship/{id}: tears down immediately regardless of deadline.
    pub async fn stop_now(&self, ship_id: Uuid) -> Result<(), ShipyardError> {
        let ship = self.repository.get(ship_id).await?;
        if ship.status == ShipStatus::Stopped {
            return Ok(());
        }
        self.expire(ship_id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::AdmissionPolicy;
    use crate::driver::fake::FakeDriver;
    use crate::model::{Ship, ShipSpec};
    use crate::repository::fake::FakeRepository;

    fn harness() -> (Reaper, Arc<FakeRepository>, Arc<Capacity>, Arc<FakeDriver>) {
        let repository = Arc::new(FakeRepository::new());
        let driver = Arc::new(FakeDriver::new());
        let affinity = Arc::new(AffinityIndex::new(repository.clone()));
        let capacity = Arc::new(Capacity::new(4, AdmissionPolicy::Reject));
        let reaper = Reaper::new(
            driver.clone(),
            repository.clone(),
            affinity,
            capacity.clone(),
            Duration::from_millis(20),
        );
        (reaper, repository, capacity, driver)
    }

    #[tokio::test]
    async fn sweep_expires_ships_past_deadline() {
        let (reaper, repository, capacity, _driver) = harness();
        let cancel_token = tokio_util::sync::CancellationToken::new();
        let slot = capacity.acquire(&cancel_token).await.unwrap();

        let mut ship = Ship::new(Uuid::new_v4(), 1, 1, ShipSpec::default());
        ship.status = ShipStatus::Running;
        ship.deadline = chrono::Utc::now() - chrono::Duration::seconds(1);
        repository.insert(&ship).await.unwrap();
        capacity.hold(ship.id, slot);

        reaper.sweep().await;

        let reloaded = repository.get(ship.id).await.unwrap();
        assert_eq!(reloaded.status, ShipStatus::Stopped);
        assert_eq!(capacity.live_count(), 0);
    }

    #[tokio::test]
    async fn sweep_removes_orphan_containers_with_no_ship_record() {
        let (reaper, repository, _capacity, driver) = harness();

        let tracked_ship_id = Uuid::new_v4();
        let tracked_container = driver.create(tracked_ship_id, &ShipSpec::default()).await.unwrap();
        let mut ship = Ship::new(tracked_ship_id, 60, 1, ShipSpec::default());
        ship.status = ShipStatus::Running;
        ship.container_id = Some(tracked_container.clone());
        repository.insert(&ship).await.unwrap();

        let orphan_container = driver.create(Uuid::new_v4(), &ShipSpec::default()).await.unwrap();

        reaper.sweep().await;

        assert_eq!(driver.state_of(&tracked_container), Some(crate::driver::fake::FakeState::Created));
        assert_eq!(driver.state_of(&orphan_container), Some(crate::driver::fake::FakeState::Removed));
    }

    #[tokio::test]
    async fn extend_ttl_rejects_non_positive_seconds() {
        let (reaper, repository, _capacity, _driver) = harness();
        let ship = Ship::new(Uuid::new_v4(), 60, 1, ShipSpec::default());
        repository.insert(&ship).await.unwrap();
        let err = reaper.extend_ttl(ship.id, 0).await.unwrap_err();
        assert!(matches!(err, ShipyardError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn extend_ttl_fails_on_stopped_ship() {
        let (reaper, repository, _capacity, _driver) = harness();
        let mut ship = Ship::new(Uuid::new_v4(), 60, 1, ShipSpec::default());
        ship.status = ShipStatus::Stopped;
        repository.insert(&ship).await.unwrap();
        let err = reaper.extend_ttl(ship.id, 30).await.unwrap_err();
        assert!(matches!(err, ShipyardError::IllegalState(_)));
    }

    #[tokio::test]
    async fn extend_ttl_recomputes_deadline_absolutely() {
        let (reaper, repository, _capacity, _driver) = harness();
        let mut ship = Ship::new(Uuid::new_v4(), 60, 1, ShipSpec::default());
        ship.status = ShipStatus::Running;
        let original = ship.deadline;
        repository.insert(&ship).await.unwrap();

        let updated = reaper.extend_ttl(ship.id, 5).await.unwrap();
        assert!(updated.deadline < original);
    }
}
