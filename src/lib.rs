// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Bay: the container-sandbox orchestration service described in
//! `SPEC_FULL.md` — Scheduler, Container Driver, Ship Repository, Affinity
//! Index, TTL Reaper, Operation Router, Recovery, and the HTTP Front that
//! wires them together.

pub mod affinity;
pub mod capacity;
pub mod config;
pub mod driver;
pub mod error;
pub mod health;
pub mod http;
pub mod model;
pub mod reaper;
pub mod recovery;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod security;

pub use error::ShipyardError;
pub use model::{Ship, ShipSpec, ShipStatus};

pub use uuid::Uuid;

/// Version information, surfaced on `/health/detailed`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_TIME: &str = include_str!(concat!(env!("OUT_DIR"), "/build_time.txt"));
