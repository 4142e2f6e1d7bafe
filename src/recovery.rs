// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Boot-time Recovery (spec 4.9) — reconciles persisted Ship records with
//! live containers, the async-boot analogue of the teacher's
//! `run_orphan_detection_task` scan, run once at startup instead of on a timer.

use std::sync::Arc;
use tracing::{info, warn};

use crate::affinity::AffinityIndex;
use crate::capacity::Capacity;
use crate::driver::ContainerDriver;
use crate::model::ShipStatus;
use crate::repository::{RepositoryError, ShipRepository};

pub struct RecoveryReport {
    pub restored_running: usize,
    pub marked_stopped: usize,
}

pub async fn recover(
    driver: &Arc<dyn ContainerDriver>,
    repository: &Arc<dyn ShipRepository>,
    affinity: &Arc<AffinityIndex>,
    capacity: &Arc<Capacity>,
) -> Result<RecoveryReport, RepositoryError> {
    // Step 1.
    let records = repository.list(&Default::default()).await?;

    let mut restored_ids = Vec::new();
    let mut restored_running = 0;
    let mut marked_stopped = 0;

    for mut ship in records {
        if ship.status == ShipStatus::Stopped {
            continue;
        }

        // Step 2.
        let Some(container_id) = ship.container_id.clone() else {
            warn!(ship_id = %ship.id, "non-stopped ship has no container id, marking stopped");
            ship.status = ShipStatus::Stopped;
            repository.update(&ship).await?;
            affinity.unbind(ship.id).await.ok();
            marked_stopped += 1;
            continue;
        };

        let inspection = driver.inspect(&container_id).await;

        match inspection {
            // Step 3.
            Ok(insp) if insp.running => {
                ship.status = ShipStatus::Running;
                if let Some(address) = insp.address {
                    ship.address = Some(address);
                }
                repository.update(&ship).await?;
                restored_ids.push(ship.id);
                restored_running += 1;
                info!(ship_id = %ship.id, "restored ship as running");
            }
            // Step 4.
            _ => {
                warn!(ship_id = %ship.id, %container_id, "ship container missing or unhealthy, marking stopped");
                ship.status = ShipStatus::Stopped;
                repository.update(&ship).await?;
                affinity.unbind(ship.id).await.ok();
                let _ = driver.remove(&container_id).await;
                marked_stopped += 1;
            }
        }
    }

    // Step 5: rebuild Affinity Index from bindings of surviving Ships.
    for &ship_id in &restored_ids {
        let sessions = repository.sessions_for(ship_id).await?;
        affinity.restore(ship_id, sessions);
    }

    // Step 6: initialize live-count from restored Running Ships.
    let reserved = capacity.reserve_restored(&restored_ids);
    if reserved < restored_ids.len() {
        warn!(
            restored = restored_ids.len(),
            reserved, "fewer capacity slots available than restored ships; MAX_SHIP_NUM may have shrunk"
        );
    }

    info!(restored_running, marked_stopped, "recovery complete");
    Ok(RecoveryReport { restored_running, marked_stopped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::AdmissionPolicy;
    use crate::driver::fake::FakeDriver;
    use crate::model::{Ship, ShipSpec};
    use crate::repository::fake::FakeRepository;

    #[tokio::test]
    async fn running_container_is_restored_as_running() {
        let driver: Arc<dyn ContainerDriver> = Arc::new(FakeDriver::new());
        let repository: Arc<dyn ShipRepository> = Arc::new(FakeRepository::new());
        let affinity = Arc::new(AffinityIndex::new(repository.clone()));
        let capacity = Arc::new(Capacity::new(4, AdmissionPolicy::Reject));

        let ship_id = uuid::Uuid::new_v4();
        let container_id = driver.create(ship_id, &ShipSpec::default()).await.unwrap();
        driver.start(&container_id).await.unwrap();

        let mut ship = Ship::new(uuid::Uuid::new_v4(), 60, 1, ShipSpec::default());
        ship.status = ShipStatus::Starting;
        ship.container_id = Some(container_id);
        repository.insert(&ship).await.unwrap();

        let report = recover(&driver, &repository, &affinity, &capacity).await.unwrap();
        assert_eq!(report.restored_running, 1);
        assert_eq!(report.marked_stopped, 0);
        assert_eq!(capacity.live_count(), 1);

        let reloaded = repository.get(ship.id).await.unwrap();
        assert_eq!(reloaded.status, ShipStatus::Running);
    }

    #[tokio::test]
    async fn missing_container_is_marked_stopped() {
        let driver: Arc<dyn ContainerDriver> = Arc::new(FakeDriver::new());
        let repository: Arc<dyn ShipRepository> = Arc::new(FakeRepository::new());
        let affinity = Arc::new(AffinityIndex::new(repository.clone()));
        let capacity = Arc::new(Capacity::new(4, AdmissionPolicy::Reject));

        let mut ship = Ship::new(uuid::Uuid::new_v4(), 60, 1, ShipSpec::default());
        ship.status = ShipStatus::Starting;
        ship.container_id = Some("never-existed".to_string());
        repository.insert(&ship).await.unwrap();

        let report = recover(&driver, &repository, &affinity, &capacity).await.unwrap();
        assert_eq!(report.restored_running, 0);
        assert_eq!(report.marked_stopped, 1);
        assert_eq!(capacity.live_count(), 0);

        let reloaded = repository.get(ship.id).await.unwrap();
        assert_eq!(reloaded.status, ShipStatus::Stopped);
    }
}
