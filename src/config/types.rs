// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Configuration type definitions for Bay.

use std::net::SocketAddr;
use std::str::FromStr;

use crate::capacity::AdmissionPolicy;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub fleet: FleetConfig,
    pub driver: DriverConfig,
    pub repository: RepositoryConfig,
    pub security: SecurityConfig,
    pub observability: ObservabilityConfig,
}

/// Server binding configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub listen_addr: SocketAddr,
    pub environment: Environment,
    pub graceful_shutdown_timeout_secs: u64,
    pub access_token: String,
    pub upstream_request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" | "stage" => Ok(Environment::Staging),
            "development" | "dev" | "" => Ok(Environment::Development),
            _ => Err(format!("Unknown environment: {s}")),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Staging => write!(f, "staging"),
            Environment::Development => write!(f, "development"),
        }
    }
}

/// Fleet/Scheduler configuration (spec 4.1, 6).
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub max_ship_num: usize,
    pub behavior_after_max_ship: AdmissionPolicy,
    pub ttl_reaper_scan_interval_secs: u64,
    pub ship_health_check_timeout_secs: u64,
    pub ship_health_check_interval_secs: u64,
}

/// Container Driver configuration (spec 4.2, 6).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub docker_image: String,
    pub docker_network: String,
    pub stop_timeout_secs: u64,
}

/// Ship Repository configuration (spec 4.6).
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Ambient input-validation configuration, carried from the teacher's
/// `security.rs` (dangerous-command and path-traversal checks on exec bodies).
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub validate_commands: bool,
    pub block_dangerous_commands: bool,
    pub log_security_events: bool,
    pub max_input_length: usize,
    pub trusted_proxies: Vec<String>,
}

/// Logging/metrics configuration (SPEC_FULL 0.1, 0.6).
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logs: bool,
    pub metrics_enabled: bool,
    pub metrics_path: String,
}
