// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Ship Repository contract (spec 4.6) — the durable record of every Ship and
//! its Session bindings, used both by the hot path and by Recovery on boot.

mod postgres;
#[cfg(test)]
pub mod fake;

pub use postgres::{init_pool, run_migrations, PostgresRepository};

use async_trait::async_trait;

use crate::model::{Ship, ShipFilter};

#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait ShipRepository: Send + Sync {
    async fn insert(&self, ship: &Ship) -> Result<(), RepositoryError>;

    async fn get(&self, id: uuid::Uuid) -> Result<Ship, RepositoryError>;

    /// Full replace of the mutable fields (status, container_id, address,
    /// deadline, updated_at) — the scheduling hot path never needs partial
    /// column updates, unlike the teacher's per-field `db::sessions` calls.
    async fn update(&self, ship: &Ship) -> Result<(), RepositoryError>;

    async fn list(&self, filter: &ShipFilter) -> Result<Vec<Ship>, RepositoryError>;

    /// All non-`Stopped` Ships, used by the Reaper's sweep and by boot Recovery.
    async fn list_live(&self) -> Result<Vec<Ship>, RepositoryError>;

    /// Persists a Session -> Ship binding (idempotent on repeat calls).
    async fn bind_session(&self, ship_id: uuid::Uuid, session_id: &str) -> Result<(), RepositoryError>;

    /// Drops every Session binding for a Ship, e.g. when it is stopped.
    async fn unbind_all(&self, ship_id: uuid::Uuid) -> Result<(), RepositoryError>;

    /// All Session ids currently bound to a Ship.
    async fn sessions_for(&self, ship_id: uuid::Uuid) -> Result<Vec<String>, RepositoryError>;
}
