// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! In-memory `ShipRepository` for Scheduler/Reaper/Recovery tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{RepositoryError, ShipRepository};
use crate::model::{Ship, ShipFilter};

#[derive(Default)]
pub struct FakeRepository {
    ships: Mutex<HashMap<Uuid, Ship>>,
    bindings: Mutex<HashMap<Uuid, HashSet<String>>>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShipRepository for FakeRepository {
    async fn insert(&self, ship: &Ship) -> Result<(), RepositoryError> {
        self.ships.lock().insert(ship.id, ship.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Ship, RepositoryError> {
        self.ships
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn update(&self, ship: &Ship) -> Result<(), RepositoryError> {
        let mut ships = self.ships.lock();
        if !ships.contains_key(&ship.id) {
            return Err(RepositoryError::NotFound(ship.id.to_string()));
        }
        ships.insert(ship.id, ship.clone());
        Ok(())
    }

    async fn list(&self, filter: &ShipFilter) -> Result<Vec<Ship>, RepositoryError> {
        let ships = self.ships.lock();
        Ok(ships
            .values()
            .filter(|s| match filter.status {
                Some(want) => s.status == want,
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn list_live(&self) -> Result<Vec<Ship>, RepositoryError> {
        let ships = self.ships.lock();
        Ok(ships.values().filter(|s| s.status.is_live()).cloned().collect())
    }

    async fn bind_session(&self, ship_id: Uuid, session_id: &str) -> Result<(), RepositoryError> {
        self.bindings
            .lock()
            .entry(ship_id)
            .or_default()
            .insert(session_id.to_string());
        Ok(())
    }

    async fn unbind_all(&self, ship_id: Uuid) -> Result<(), RepositoryError> {
        self.bindings.lock().remove(&ship_id);
        Ok(())
    }

    async fn sessions_for(&self, ship_id: Uuid) -> Result<Vec<String>, RepositoryError> {
        Ok(self
            .bindings
            .lock()
            .get(&ship_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect())
    }
}
