// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Shared application state handed to every axum handler.

use std::sync::Arc;

use crate::affinity::AffinityIndex;
use crate::capacity::Capacity;
use crate::config::Config;
use crate::driver::ContainerDriver;
use crate::reaper::Reaper;
use crate::repository::ShipRepository;
use crate::router::OperationRouter;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scheduler: Arc<Scheduler>,
    pub reaper: Arc<Reaper>,
    pub router: Arc<OperationRouter>,
    pub affinity: Arc<AffinityIndex>,
    pub capacity: Arc<Capacity>,
    pub driver: Arc<dyn ContainerDriver>,
    pub repository: Arc<dyn ShipRepository>,
}
