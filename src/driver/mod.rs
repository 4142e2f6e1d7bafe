// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Container Driver contract (spec 4.2) — the seam between the Scheduler and
//! whatever container runtime actually backs a Ship. Pure: the driver holds no
//! Ship state of its own, only a runtime handle.

mod docker;
#[cfg(test)]
pub mod fake;

pub use docker::DockerDriver;

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::model::ShipSpec;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    BackendUnavailable(String),
    #[error("{0}")]
    Timeout(String),
}

/// Result of `Inspect`, used by Recovery and the TTL Reaper's orphan check.
#[derive(Debug, Clone)]
pub struct ContainerInspection {
    pub running: bool,
    pub address: Option<String>,
}

#[async_trait]
pub trait ContainerDriver: Send + Sync {
    /// Pulls `DOCKER_IMAGE` if missing, attaches `DOCKER_NETWORK`, applies the
    /// spec's resource hints. `ship_id` names the container so the orphan
    /// sweep (`list_managed_containers`) can recognize it later. Returns the
    /// runtime's container id.
    async fn create(&self, ship_id: Uuid, spec: &ShipSpec) -> Result<String, DriverError>;

    /// Starts a created container and returns its Bay-reachable address
    /// (`host:port`) on the Ship's fixed service port.
    async fn start(&self, container_id: &str) -> Result<String, DriverError>;

    async fn inspect(&self, container_id: &str) -> Result<ContainerInspection, DriverError>;

    /// Recent stdout+stderr, capped at `tail` bytes if given.
    async fn logs(&self, container_id: &str, tail: Option<usize>) -> Result<Vec<u8>, DriverError>;

    /// Graceful stop (SIGTERM, honoring `grace`) then forceful if it doesn't exit.
    async fn stop(&self, container_id: &str, grace: Duration) -> Result<(), DriverError>;

    /// Idempotent: removing an already-removed container is not an error.
    async fn remove(&self, container_id: &str) -> Result<(), DriverError>;

    /// Lists ids of containers this driver recognizes as Ship containers by
    /// naming scheme, regardless of whether Bay still has a record of them.
    /// Used by the Reaper's orphan sweep (spec 4.5) to catch containers a
    /// failed stop/remove left running. Backends that can't filter by name
    /// return an empty list, making the sweep a no-op.
    async fn list_managed_containers(&self) -> Result<Vec<String>, DriverError> {
        Ok(Vec::new())
    }
}
