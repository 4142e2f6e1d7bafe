// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Affinity Index (spec 4.4) — Session <-> Ship bindings, held under a single
//! mutex and write-through to the repository so Recovery can rebuild it on boot.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::model::ShipStatus;
use crate::repository::ShipRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Bound,
    AlreadyBound,
    SessionCapExceeded,
}

struct Inner {
    session_to_ship: HashMap<String, Uuid>,
    ship_to_sessions: HashMap<Uuid, HashSet<String>>,
}

pub struct AffinityIndex {
    inner: Mutex<Inner>,
    repository: Arc<dyn ShipRepository>,
}

impl AffinityIndex {
    pub fn new(repository: Arc<dyn ShipRepository>) -> Self {
        Self {
            inner: Mutex::new(Inner { session_to_ship: HashMap::new(), ship_to_sessions: HashMap::new() }),
            repository,
        }
    }

    pub fn lookup(&self, session: &str) -> Option<Uuid> {
        self.inner.lock().session_to_ship.get(session).copied()
    }

    pub fn session_count(&self, ship_id: Uuid) -> usize {
        self.inner
            .lock()
            .ship_to_sessions
            .get(&ship_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Binds `session` to `ship_id`, enforcing `max_session_num`. The write-through
    /// to the repository happens outside the lock (never held across I/O, per
    /// spec.md 5's lock-ordering rule).
    pub async fn bind(
        &self,
        session: &str,
        ship_id: Uuid,
        max_session_num: i32,
        ship_status: ShipStatus,
    ) -> Result<BindOutcome, crate::error::ShipyardError> {
        {
            let inner = self.inner.lock();
            if let Some(&existing) = inner.session_to_ship.get(session) {
                if existing == ship_id {
                    return Ok(BindOutcome::AlreadyBound);
                }
                // A rebind to a different Ship is only legal once the prior one is
                // Stopped; the caller is expected to have already pruned dead
                // bindings via `unbind`. Treat a live prior binding as a conflict.
                return Err(crate::error::ShipyardError::IllegalState(format!(
                    "session {session} already bound to ship {existing}"
                )));
            }
        }

        if !ship_status.is_live() {
            return Err(crate::error::ShipyardError::IllegalState(format!(
                "ship {ship_id} is not live"
            )));
        }

        let bound = {
            let mut inner = self.inner.lock();
            let sessions = inner.ship_to_sessions.entry(ship_id).or_default();
            if sessions.len() as i32 >= max_session_num && !sessions.contains(session) {
                false
            } else {
                sessions.insert(session.to_string());
                inner.session_to_ship.insert(session.to_string(), ship_id);
                true
            }
        };

        if !bound {
            return Ok(BindOutcome::SessionCapExceeded);
        }

        self.repository
            .bind_session(ship_id, session)
            .await
            .map_err(crate::error::ShipyardError::from)?;

        Ok(BindOutcome::Bound)
    }

    /// Drops every binding for a Ship (called on Stop). Write-through happens
    /// outside the lock.
    pub async fn unbind(&self, ship_id: Uuid) -> Result<(), crate::error::ShipyardError> {
        {
            let mut inner = self.inner.lock();
            if let Some(sessions) = inner.ship_to_sessions.remove(&ship_id) {
                for session in sessions {
                    inner.session_to_ship.remove(&session);
                }
            }
        }
        self.repository
            .unbind_all(ship_id)
            .await
            .map_err(crate::error::ShipyardError::from)?;
        Ok(())
    }

    /// Rebuilds in-memory state from persisted bindings of surviving Ships
    /// (Recovery step 5).
    pub fn restore(&self, ship_id: Uuid, sessions: Vec<String>) {
        let mut inner = self.inner.lock();
        let set: HashSet<String> = sessions.into_iter().collect();
        for session in &set {
            inner.session_to_ship.insert(session.clone(), ship_id);
        }
        inner.ship_to_sessions.insert(ship_id, set);
    }
}
