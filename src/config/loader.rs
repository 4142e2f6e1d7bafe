// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//! Configuration loading from environment variables.
//!
//! Honors the spec's bare env var names verbatim (`ACCESS_TOKEN`,
//! `MAX_SHIP_NUM`, `BEHAVIOR_AFTER_MAX_SHIP`, `DATABASE_URL`, `DOCKER_IMAGE`,
//! `DOCKER_NETWORK`, `SHIP_HEALTH_CHECK_TIMEOUT`,
//! `SHIP_HEALTH_CHECK_INTERVAL`) alongside `SHIPYARD_*`-prefixed ones for
//! everything the distilled spec left as an implementation detail.

use std::env;
use std::str::FromStr;
use tracing::{info, warn};

use super::error::ConfigError;
use super::types::*;
use crate::capacity::AdmissionPolicy;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if e.not_found() {
                info!("no .env file found, using environment variables only");
            } else {
                warn!("error loading .env file: {e}");
            }
        }

        let host = env_or("SHIPYARD_HOST", "0.0.0.0");
        let port = env_parse("SHIPYARD_PORT", 8080u16)?;
        let listen_addr = format!("{host}:{port}").parse().map_err(|e| ConfigError::InvalidValue {
            key: "SHIPYARD_HOST/SHIPYARD_PORT".to_string(),
            value: format!("{host}:{port}"),
            reason: format!("invalid socket address: {e}"),
        })?;

        let environment = env_parse("SHIPYARD_ENVIRONMENT", Environment::Development)?;

        Ok(Config {
            server: ServerConfig {
                host,
                port,
                listen_addr,
                environment,
                graceful_shutdown_timeout_secs: env_parse("SHIPYARD_SHUTDOWN_TIMEOUT", 30u64)?,
                access_token: env_or("ACCESS_TOKEN", "secret-token"),
                upstream_request_timeout_secs: env_parse("SHIPYARD_UPSTREAM_TIMEOUT", 30u64)?,
            },
            fleet: FleetConfig {
                max_ship_num: env_parse("MAX_SHIP_NUM", 10usize)?,
                behavior_after_max_ship: env_parse_policy("BEHAVIOR_AFTER_MAX_SHIP", AdmissionPolicy::Wait)?,
                ttl_reaper_scan_interval_secs: env_parse("SHIPYARD_REAPER_SCAN_INTERVAL", 1u64)?,
                ship_health_check_timeout_secs: env_parse("SHIP_HEALTH_CHECK_TIMEOUT", 60u64)?,
                ship_health_check_interval_secs: env_parse("SHIP_HEALTH_CHECK_INTERVAL", 2u64)?,
            },
            driver: DriverConfig {
                docker_image: env_or("DOCKER_IMAGE", "shipyard/ship:latest"),
                docker_network: env_or("DOCKER_NETWORK", "bridge"),
                stop_timeout_secs: env_parse("SHIPYARD_DOCKER_STOP_TIMEOUT", 10u64)?,
            },
            repository: RepositoryConfig {
                database_url: env::var("DATABASE_URL").ok(),
                max_connections: env_parse("SHIPYARD_DB_MAX_CONNECTIONS", 20u32)?,
                min_connections: env_parse("SHIPYARD_DB_MIN_CONNECTIONS", 2u32)?,
                connect_timeout_secs: env_parse("SHIPYARD_DB_CONNECT_TIMEOUT", 10u64)?,
                idle_timeout_secs: env_parse("SHIPYARD_DB_IDLE_TIMEOUT", 600u64)?,
            },
            security: SecurityConfig {
                validate_commands: env_parse("SHIPYARD_VALIDATE_COMMANDS", true)?,
                block_dangerous_commands: env_parse("SHIPYARD_BLOCK_DANGEROUS_COMMANDS", true)?,
                log_security_events: env_parse("SHIPYARD_LOG_SECURITY_EVENTS", true)?,
                max_input_length: env_parse("SHIPYARD_MAX_INPUT_LENGTH", 65536usize)?,
                trusted_proxies: env_list(
                    "SHIPYARD_TRUSTED_PROXIES",
                    vec!["127.0.0.1".to_string(), "::1".to_string()],
                ),
            },
            observability: ObservabilityConfig {
                log_level: env_or("SHIPYARD_LOG_LEVEL", "info"),
                json_logs: env_parse("SHIPYARD_JSON_LOGS", false)?,
                metrics_enabled: env_parse("SHIPYARD_METRICS_ENABLED", true)?,
                metrics_path: env_or("SHIPYARD_METRICS_PATH", "/metrics"),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == Environment::Production
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value.parse().map_err(|e| ConfigError::ParseError {
            key: key.to_string(),
            message: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_parse_policy(key: &str, default: AdmissionPolicy) -> Result<AdmissionPolicy, ConfigError> {
    match env::var(key) {
        Ok(value) => value.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
            reason: e,
        }),
        Err(_) => Ok(default),
    }
}

pub fn env_list(key: &str, default: Vec<String>) -> Vec<String> {
    match env::var(key) {
        Ok(value) => value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default,
    }
}
