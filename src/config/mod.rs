// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Bay configuration module.
//! Values are loaded from `SHIPYARD_*` environment variables plus the spec's
//! bare names (`ACCESS_TOKEN`, `MAX_SHIP_NUM`, `BEHAVIOR_AFTER_MAX_SHIP`,
//! `DATABASE_URL`, `DOCKER_IMAGE`, `DOCKER_NETWORK`,
//! `SHIP_HEALTH_CHECK_TIMEOUT`, `SHIP_HEALTH_CHECK_INTERVAL`).

mod error;
mod loader;
mod types;
mod validation;

pub use error::ConfigError;
pub use loader::{env_list, env_or, env_parse};
pub use types::{
    Config, DriverConfig, Environment, FleetConfig, ObservabilityConfig, RepositoryConfig,
    SecurityConfig, ServerConfig,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("development".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(Environment::Development.to_string(), "development");
    }
}
