// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Core data model: Ship records, status transitions, and Session bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Lifecycle status of a Ship.
///
/// `Stopped` is terminal: invariant 6 requires a record never leaves it once entered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShipStatus {
    Starting,
    Running,
    Stopped,
}

impl ShipStatus {
    /// Whether this status counts against `MAX_SHIP_NUM` (invariant 1).
    pub fn is_live(self) -> bool {
        !matches!(self, ShipStatus::Stopped)
    }
}

impl std::fmt::Display for ShipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShipStatus::Starting => write!(f, "starting"),
            ShipStatus::Running => write!(f, "running"),
            ShipStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for ShipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "starting" => Ok(ShipStatus::Starting),
            "running" => Ok(ShipStatus::Running),
            "stopped" => Ok(ShipStatus::Stopped),
            other => Err(format!("unknown ship status: {other}")),
        }
    }
}

/// Resource hints passed through to the Container Driver at creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ShipSpec {
    pub cpus: Option<f64>,
    pub memory: Option<String>,
}

impl ShipSpec {
    /// A spec is "looser or equal" to a candidate's if it asks for no more than the
    /// candidate already has reserved — used by reuse-preference ordering in
    /// `AcquireForSession` (spec.md 4.1).
    pub fn fits_within(&self, existing: &ShipSpec) -> bool {
        let cpu_ok = match (self.cpus, existing.cpus) {
            (Some(want), Some(have)) => want <= have,
            (Some(_), None) => false,
            (None, _) => true,
        };
        let mem_ok = match (&self.memory, &existing.memory) {
            (Some(want), Some(have)) => want == have,
            (Some(_), None) => false,
            (None, _) => true,
        };
        cpu_ok && mem_ok
    }
}

/// The central entity: a single isolated container and its scheduling metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ship {
    pub id: Uuid,
    pub status: ShipStatus,
    pub container_id: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ttl_seconds: i64,
    pub deadline: DateTime<Utc>,
    pub max_session_num: i32,
    pub spec: ShipSpec,
}

impl Ship {
    pub fn new(id: Uuid, ttl_seconds: i64, max_session_num: i32, spec: ShipSpec) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: ShipStatus::Starting,
            container_id: None,
            address: None,
            created_at: now,
            updated_at: now,
            ttl_seconds,
            deadline: now + chrono::Duration::seconds(ttl_seconds),
            max_session_num,
            spec,
        }
    }

    /// Recompute `deadline` from `now`, per `ExtendTTL` semantics (spec.md 4.5):
    /// `deadline = now + seconds`, not `deadline + seconds`.
    pub fn extend(&mut self, seconds: i64, now: DateTime<Utc>) {
        self.ttl_seconds = seconds;
        self.deadline = now + chrono::Duration::seconds(seconds);
        self.updated_at = now;
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

/// Snapshot of the Session <-> Ship binding table, mirrored in-memory by the
/// Affinity Index and persisted by the Ship Repository for recovery.
#[derive(Debug, Clone, Default)]
pub struct SessionBindings {
    pub ship_id: Uuid,
    pub sessions: HashSet<String>,
}

/// A filter for `ShipRepository::list`.
#[derive(Debug, Clone, Default)]
pub struct ShipFilter {
    pub status: Option<ShipStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_status_excludes_stopped() {
        assert!(ShipStatus::Starting.is_live());
        assert!(ShipStatus::Running.is_live());
        assert!(!ShipStatus::Stopped.is_live());
    }

    #[test]
    fn extend_is_absolute_from_now_not_relative_to_old_deadline() {
        let mut ship = Ship::new(Uuid::new_v4(), 10, 1, ShipSpec::default());
        let original_deadline = ship.deadline;
        let later = Utc::now() + chrono::Duration::seconds(5);
        ship.extend(100, later);
        assert!(ship.deadline > original_deadline);
        assert_eq!(ship.deadline, later + chrono::Duration::seconds(100));
    }

    #[test]
    fn spec_fit_requires_no_more_than_reserved() {
        let want = ShipSpec { cpus: Some(1.0), memory: None };
        let have = ShipSpec { cpus: Some(2.0), memory: Some("512m".into()) };
        assert!(want.fits_within(&have));

        let want_too_much = ShipSpec { cpus: Some(4.0), memory: None };
        assert!(!want_too_much.fits_within(&have));
    }

    #[test]
    fn status_round_trips_through_string() {
        for s in [ShipStatus::Starting, ShipStatus::Running, ShipStatus::Stopped] {
            let parsed: ShipStatus = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
