// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Scheduler / Admission (spec 4.1) — the 8-step CreateShip algorithm and the
//! AcquireForSession reuse policy.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::affinity::AffinityIndex;
use crate::capacity::{Capacity, Slot};
use crate::driver::ContainerDriver;
use crate::error::ShipyardError;
use crate::health::{HealthProber, ProbeError};
use crate::model::{Ship, ShipSpec, ShipStatus};
use crate::repository::ShipRepository;

pub struct Scheduler {
    capacity: Arc<Capacity>,
    driver: Arc<dyn ContainerDriver>,
    repository: Arc<dyn ShipRepository>,
    affinity: Arc<AffinityIndex>,
    prober: Arc<HealthProber>,
    health_timeout: Duration,
}

impl Scheduler {
    pub fn new(
        capacity: Arc<Capacity>,
        driver: Arc<dyn ContainerDriver>,
        repository: Arc<dyn ShipRepository>,
        affinity: Arc<AffinityIndex>,
        prober: Arc<HealthProber>,
        health_timeout: Duration,
    ) -> Self {
        Self { capacity, driver, repository, affinity, prober, health_timeout }
    }

    pub fn capacity(&self) -> &Capacity {
        &self.capacity
    }

    /// CreateShip(session, ttl, spec, max_session_num) -> Ship, spec.md 4.1.
    pub async fn create_ship(
        &self,
        session: &str,
        ttl_seconds: i64,
        spec: ShipSpec,
        max_session_num: i32,
        cancel: &CancellationToken,
    ) -> Result<Ship, ShipyardError> {
        if ttl_seconds <= 0 {
            return Err(ShipyardError::InvalidArgument("ttl must be positive".into()));
        }
        if max_session_num < 1 {
            return Err(ShipyardError::InvalidArgument("max_session_num must be >= 1".into()));
        }

        // Steps 1-3: reserve a fleet slot per BEHAVIOR_AFTER_MAX_SHIP.
        let slot = self.capacity.acquire(cancel).await?;

        match self.allocate(session, ttl_seconds, spec, max_session_num, slot, cancel).await {
            Ok(ship) => Ok(ship),
            Err((err, slot)) => {
                // Releasing `slot` here (by dropping it) signals the next waiter,
                // satisfying step 4's "release the reserved slot" on failure.
                drop(slot);
                Err(err)
            }
        }
    }

    async fn allocate(
        &self,
        session: &str,
        ttl_seconds: i64,
        spec: ShipSpec,
        max_session_num: i32,
        slot: Slot,
        cancel: &CancellationToken,
    ) -> Result<Ship, (ShipyardError, Slot)> {
        // The Ship id is minted up front so the Container Driver can name the
        // container after it (spec 4.5's orphan sweep keys off that name).
        let id = Uuid::new_v4();

        // Step 4: Create + Start.
        let container_id = match self.driver.create(id, &spec).await {
            Ok(id) => id,
            Err(e) => {
                return Err((
                    ShipyardError::Unavailable(format!("container create failed: {e}")),
                    slot,
                ))
            }
        };

        let address = match self.driver.start(&container_id).await {
            Ok(addr) => addr,
            Err(e) => {
                let _ = self.driver.remove(&container_id).await;
                return Err((
                    ShipyardError::Unavailable(format!("container start failed: {e}")),
                    slot,
                ));
            }
        };

        // Step 5: persist as Starting.
        let mut ship = Ship::new(id, ttl_seconds, max_session_num, spec);
        ship.container_id = Some(container_id.clone());
        ship.address = Some(address.clone());

        if let Err(e) = self.repository.insert(&ship).await {
            let _ = self.driver.stop(&container_id, Duration::from_secs(5)).await;
            let _ = self.driver.remove(&container_id).await;
            return Err((ShipyardError::from(e), slot));
        }

        // Step 6: health gate.
        match self.prober.wait_ready(&address, cancel).await {
            Ok(()) => {
                ship.status = ShipStatus::Running;
                ship.updated_at = chrono::Utc::now();
                if let Err(e) = self.repository.update(&ship).await {
                    warn!(ship_id = %id, "failed to persist Running transition: {e}");
                }
            }
            Err(ProbeError::Timeout) => {
                warn!(ship_id = %id, "health probe timed out, tearing down");
                self.teardown_failed_ship(&mut ship, &container_id).await;
                return Err((
                    ShipyardError::StartupFailed(format!("ship {id} never became healthy")),
                    slot,
                ));
            }
            Err(ProbeError::Cancelled) => {
                self.teardown_failed_ship(&mut ship, &container_id).await;
                return Err((
                    ShipyardError::InvalidArgument("CreateShip cancelled during health probe".into()),
                    slot,
                ));
            }
        }

        // Step 7: bind creator session.
        if let Err(e) = self.affinity.bind(session, id, max_session_num, ship.status).await {
            return Err((e, slot));
        }

        info!(ship_id = %id, %address, "ship created and running");

        // The slot stays reserved for the Ship's life; the Reaper (or an
        // explicit DELETE) releases it via `Capacity::release` when the Ship
        // transitions to Stopped.
        self.capacity.hold(id, slot);

        Ok(ship)
    }

    async fn teardown_failed_ship(&self, ship: &mut Ship, container_id: &str) {
        let _ = self.driver.stop(container_id, Duration::from_secs(5)).await;
        let _ = self.driver.remove(container_id).await;
        ship.status = ShipStatus::Stopped;
        ship.updated_at = chrono::Utc::now();
        let _ = self.repository.update(ship).await;
    }

    /// AcquireForSession(session) -> Ship | None, spec.md 4.1's reuse policy.
    /// Preference order: (a) existing binding; (b) any Running Ship with free
    /// Session slots and a spec no tighter than requested, oldest-first.
    pub async fn acquire_for_session(
        &self,
        session: &str,
        requested_spec: Option<&ShipSpec>,
    ) -> Result<Option<Ship>, ShipyardError> {
        if let Some(ship_id) = self.affinity.lookup(session) {
            return Ok(Some(self.repository.get(ship_id).await?));
        }

        let mut live = self
            .repository
            .list_live()
            .await?
            .into_iter()
            .filter(|s| s.status == ShipStatus::Running)
            .filter(|s| (self.affinity.session_count(s.id) as i32) < s.max_session_num)
            .filter(|s| match requested_spec {
                Some(want) => want.fits_within(&s.spec),
                None => true,
            })
            .collect::<Vec<_>>();

        live.sort_by_key(|s| s.created_at);
        Ok(live.into_iter().next())
    }
}
