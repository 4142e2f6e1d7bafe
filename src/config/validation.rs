// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Configuration validation

use tracing::warn;

use super::error::ConfigError;
use super::types::{Config, Environment};

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SHIPYARD_PORT".to_string(),
                value: "0".to_string(),
                reason: "port cannot be 0".to_string(),
            });
        }

        if self.fleet.max_ship_num == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_SHIP_NUM".to_string(),
                value: "0".to_string(),
                reason: "fleet must allow at least one live ship".to_string(),
            });
        }

        if self.fleet.ship_health_check_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SHIP_HEALTH_CHECK_TIMEOUT".to_string(),
                value: "0".to_string(),
                reason: "health check timeout must be positive".to_string(),
            });
        }

        if self.fleet.ship_health_check_interval_secs == 0
            || self.fleet.ship_health_check_interval_secs > self.fleet.ship_health_check_timeout_secs
        {
            return Err(ConfigError::InvalidValue {
                key: "SHIP_HEALTH_CHECK_INTERVAL".to_string(),
                value: self.fleet.ship_health_check_interval_secs.to_string(),
                reason: "interval must be positive and no greater than the timeout".to_string(),
            });
        }

        if self.repository.database_url.is_none() {
            return Err(ConfigError::MissingRequired { key: "DATABASE_URL".to_string() });
        }

        if self.server.environment == Environment::Production {
            if !self.security.validate_commands {
                warn!("command validation is disabled in production!");
            }
            if self.server.access_token == "secret-token" {
                warn!("ACCESS_TOKEN is left at its default value in production!");
            }
            if !self.security.log_security_events {
                warn!("security event logging is disabled in production");
            }
        }

        Ok(())
    }
}
