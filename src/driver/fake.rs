// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! In-memory `ContainerDriver` used by Scheduler/Reaper/Router tests so they
//! never touch a real Docker daemon.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use super::{ContainerDriver, ContainerInspection, DriverError};
use crate::model::ShipSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeState {
    Created,
    Running,
    Stopped,
    Removed,
}

struct Inner {
    containers: HashMap<String, FakeState>,
    fail_create: bool,
    fail_start: bool,
    address: Option<String>,
}

/// Deterministic fake: `create` assigns a fresh id, `start` flips it to
/// `Running` and hands back a fake loopback address, `stop`/`remove` are
/// idempotent regardless of prior state.
pub struct FakeDriver {
    inner: Mutex<Inner>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                containers: HashMap::new(),
                fail_create: false,
                fail_start: false,
                address: None,
            }),
        }
    }

    pub fn with_create_failure() -> Self {
        Self {
            inner: Mutex::new(Inner {
                containers: HashMap::new(),
                fail_create: true,
                fail_start: false,
                address: None,
            }),
        }
    }

    pub fn with_start_failure() -> Self {
        Self {
            inner: Mutex::new(Inner {
                containers: HashMap::new(),
                fail_create: false,
                fail_start: true,
                address: None,
            }),
        }
    }

    /// Points every started container at a real reachable address, so a
    /// `HealthProber` probing it can actually succeed — used by tests that
    /// exercise the full `CreateShip` happy path against a local HTTP stub.
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                containers: HashMap::new(),
                fail_create: false,
                fail_start: false,
                address: Some(address.into()),
            }),
        }
    }

    pub fn state_of(&self, container_id: &str) -> Option<FakeState> {
        self.inner.lock().containers.get(container_id).cloned()
    }

    pub fn container_count(&self) -> usize {
        self.inner.lock().containers.len()
    }
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerDriver for FakeDriver {
    async fn create(&self, ship_id: Uuid, _spec: &ShipSpec) -> Result<String, DriverError> {
        let mut inner = self.inner.lock();
        if inner.fail_create {
            return Err(DriverError::BackendUnavailable("fake: create configured to fail".into()));
        }
        let id = format!("shipyard-ship-{ship_id}");
        inner.containers.insert(id.clone(), FakeState::Created);
        Ok(id)
    }

    async fn start(&self, container_id: &str) -> Result<String, DriverError> {
        let mut inner = self.inner.lock();
        if inner.fail_start {
            return Err(DriverError::Timeout("fake: start configured to fail".into()));
        }
        let fallback = format!("127.0.0.1:0/{container_id}");
        let address = inner.address.clone().unwrap_or(fallback);
        match inner.containers.get_mut(container_id) {
            Some(state) => {
                *state = FakeState::Running;
                Ok(address)
            }
            None => Err(DriverError::NotFound(container_id.to_string())),
        }
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerInspection, DriverError> {
        let inner = self.inner.lock();
        let fallback = format!("127.0.0.1:0/{container_id}");
        let address = inner.address.clone().unwrap_or(fallback);
        match inner.containers.get(container_id) {
            Some(FakeState::Running) => Ok(ContainerInspection {
                running: true,
                address: Some(address),
            }),
            Some(_) => Ok(ContainerInspection { running: false, address: None }),
            None => Err(DriverError::NotFound(container_id.to_string())),
        }
    }

    async fn logs(&self, container_id: &str, _tail: Option<usize>) -> Result<Vec<u8>, DriverError> {
        let inner = self.inner.lock();
        if inner.containers.contains_key(container_id) {
            Ok(format!("fake logs for {container_id}").into_bytes())
        } else {
            Err(DriverError::NotFound(container_id.to_string()))
        }
    }

    async fn stop(&self, container_id: &str, _grace: Duration) -> Result<(), DriverError> {
        let mut inner = self.inner.lock();
        inner.containers.insert(container_id.to_string(), FakeState::Stopped);
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> Result<(), DriverError> {
        let mut inner = self.inner.lock();
        inner.containers.insert(container_id.to_string(), FakeState::Removed);
        Ok(())
    }

    async fn list_managed_containers(&self) -> Result<Vec<String>, DriverError> {
        let inner = self.inner.lock();
        Ok(inner
            .containers
            .iter()
            .filter(|(_, state)| **state != FakeState::Removed)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_start_reports_running() {
        let driver = FakeDriver::new();
        let id = driver.create(Uuid::new_v4(), &ShipSpec::default()).await.unwrap();
        assert_eq!(driver.state_of(&id), Some(FakeState::Created));
        driver.start(&id).await.unwrap();
        assert_eq!(driver.state_of(&id), Some(FakeState::Running));
        let inspection = driver.inspect(&id).await.unwrap();
        assert!(inspection.running);
    }

    #[tokio::test]
    async fn stop_and_remove_are_idempotent_on_unknown_ids() {
        let driver = FakeDriver::new();
        driver.stop("missing", Duration::from_secs(1)).await.unwrap();
        driver.remove("missing").await.unwrap();
    }

    #[tokio::test]
    async fn configured_create_failure_surfaces_as_backend_unavailable() {
        let driver = FakeDriver::with_create_failure();
        let err = driver.create(Uuid::new_v4(), &ShipSpec::default()).await.unwrap_err();
        assert!(matches!(err, DriverError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn list_managed_containers_excludes_removed() {
        let driver = FakeDriver::new();
        let kept = driver.create(Uuid::new_v4(), &ShipSpec::default()).await.unwrap();
        let removed = driver.create(Uuid::new_v4(), &ShipSpec::default()).await.unwrap();
        driver.remove(&removed).await.unwrap();

        let managed = driver.list_managed_containers().await.unwrap();
        assert!(managed.contains(&kept));
        assert!(!managed.contains(&removed));
    }
}
