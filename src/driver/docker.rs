// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Docker-compatible Container Driver, backed by `bollard`.
//!
//! Connection setup mirrors the teacher's `connect_docker`: try `DOCKER_HOST`,
//! then the platform's well-known socket paths, before falling back to bollard's
//! local defaults. Unlike the teacher, this driver never attempts to install or
//! launch a Docker runtime itself — Bay is a control plane, not a bootstrapper,
//! and a missing daemon should fail fast as `BackendUnavailable`.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ContainerDriver, ContainerInspection, DriverError};
use crate::model::ShipSpec;

/// Ship containers are named `shipyard-ship-<12 hex chars>` so the orphan sweep
/// in the Reaper can filter them out from unrelated containers on the host.
pub const CONTAINER_NAME_PREFIX: &str = "shipyard-ship-";

/// Fixed port the Ship HTTP surface listens on inside the container.
pub const SHIP_SERVICE_PORT: u16 = 8088;

pub struct DockerDriver {
    docker: Docker,
    image: String,
    network: String,
}

impl DockerDriver {
    pub fn container_name(ship_id: uuid::Uuid) -> String {
        format!(
            "{CONTAINER_NAME_PREFIX}{}",
            ship_id.to_string().replace('-', "")[..12].to_lowercase()
        )
    }

    /// Connect using `DOCKER_HOST` if set, otherwise the platform's well-known
    /// unix socket paths, falling back to bollard's local defaults.
    pub async fn connect(image: String, network: String) -> Result<Self, DriverError> {
        if let Ok(host) = std::env::var("DOCKER_HOST") {
            info!("connecting to Docker via DOCKER_HOST={host}");
            let docker = Docker::connect_with_local_defaults()
                .map_err(|e| DriverError::BackendUnavailable(e.to_string()))?;
            return Ok(Self { docker, image, network });
        }

        let home = std::env::var("HOME").unwrap_or_default();
        let socket_paths: Vec<String> = if cfg!(target_os = "macos") {
            vec![
                "/var/run/docker.sock".to_string(),
                format!("{home}/.docker/run/docker.sock"),
                format!("{home}/.orbstack/run/docker.sock"),
                format!("{home}/.colima/default/docker.sock"),
            ]
        } else if cfg!(target_os = "windows") {
            vec!["npipe:////./pipe/docker_engine".to_string()]
        } else {
            vec![
                "/var/run/docker.sock".to_string(),
                "/run/docker.sock".to_string(),
                format!("{home}/.docker/run/docker.sock"),
            ]
        };

        for socket_path in &socket_paths {
            if !socket_path.starts_with("npipe:") && !Path::new(socket_path).exists() {
                continue;
            }
            if let Ok(docker) = Docker::connect_with_unix(socket_path, 120, bollard::API_DEFAULT_VERSION) {
                if docker.ping().await.is_ok() {
                    info!("connected to Docker at {socket_path}");
                    return Ok(Self { docker, image, network });
                }
            }
        }

        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DriverError::BackendUnavailable(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| DriverError::BackendUnavailable(format!("Docker daemon not responding: {e}")))?;
        Ok(Self { docker, image, network })
    }

    fn to_driver_error(e: bollard::errors::Error) -> DriverError {
        match &e {
            bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                DriverError::NotFound(e.to_string())
            }
            bollard::errors::Error::DockerResponseServerError { status_code: 409, .. } => {
                DriverError::AlreadyExists(e.to_string())
            }
            _ => DriverError::BackendUnavailable(e.to_string()),
        }
    }

    async fn ensure_image(&self) -> Result<(), DriverError> {
        let images = self
            .docker
            .list_images::<String>(None)
            .await
            .map_err(Self::to_driver_error)?;
        let present = images
            .iter()
            .any(|img| img.repo_tags.iter().any(|tag| tag == &self.image));
        if present {
            return Ok(());
        }

        info!(image = %self.image, "image not present locally, pulling");
        let options = CreateImageOptions { from_image: self.image.as_str(), ..Default::default() };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!("pull progress: {status}");
                    }
                }
                Err(e) => return Err(Self::to_driver_error(e)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerDriver for DockerDriver {
    async fn create(&self, ship_id: uuid::Uuid, spec: &ShipSpec) -> Result<String, DriverError> {
        self.ensure_image().await?;

        let memory_bytes = spec
            .memory
            .as_deref()
            .and_then(parse_memory_size)
            .unwrap_or(512 * 1024 * 1024);
        let cpu_quota = spec.cpus.map(|c| (c * 100_000.0) as i64);

        let config = Config {
            image: Some(self.image.clone()),
            cmd: Some(vec!["/bin/sh".to_string(), "-c".to_string(), "ship-serve".to_string()]),
            exposed_ports: Some(HashMap::from([(
                format!("{SHIP_SERVICE_PORT}/tcp"),
                HashMap::new(),
            )])),
            host_config: Some(HostConfig {
                memory: Some(memory_bytes as i64),
                cpu_quota,
                cpu_period: cpu_quota.map(|_| 100_000),
                network_mode: Some(self.network.clone()),
                publish_all_ports: Some(true),
                auto_remove: Some(false),
                privileged: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions::<String> {
            name: Self::container_name(ship_id),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(Self::to_driver_error)?;
        Ok(response.id)
    }

    async fn start(&self, container_id: &str) -> Result<String, DriverError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(Self::to_driver_error)?;

        let inspection = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(Self::to_driver_error)?;

        let ip = inspection
            .network_settings
            .as_ref()
            .and_then(|ns| ns.networks.as_ref())
            .and_then(|nets| nets.values().next())
            .and_then(|n| n.ip_address.clone())
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| DriverError::BackendUnavailable("container has no IP address".into()))?;

        Ok(format!("{ip}:{SHIP_SERVICE_PORT}"))
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerInspection, DriverError> {
        match self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspection) => {
                let running = inspection
                    .state
                    .as_ref()
                    .and_then(|s| s.running)
                    .unwrap_or(false);
                let address = inspection
                    .network_settings
                    .as_ref()
                    .and_then(|ns| ns.networks.as_ref())
                    .and_then(|nets| nets.values().next())
                    .and_then(|n| n.ip_address.clone())
                    .filter(|ip| !ip.is_empty())
                    .map(|ip| format!("{ip}:{SHIP_SERVICE_PORT}"));
                Ok(ContainerInspection { running, address })
            }
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                Err(DriverError::NotFound(container_id.to_string()))
            }
            Err(e) => Err(Self::to_driver_error(e)),
        }
    }

    async fn logs(&self, container_id: &str, tail: Option<usize>) -> Result<Vec<u8>, DriverError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.map(|t| t.to_string()).unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };
        let mut stream = self.docker.logs(container_id, Some(options));
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(log) => out.extend_from_slice(&log.into_bytes()),
                Err(e) => return Err(Self::to_driver_error(e)),
            }
        }
        Ok(out)
    }

    async fn stop(&self, container_id: &str, grace: Duration) -> Result<(), DriverError> {
        let stop_result = self
            .docker
            .stop_container(container_id, Some(StopContainerOptions { t: grace.as_secs() as i64 }))
            .await;

        match stop_result {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => {
                warn!(container_id, "graceful stop failed, killing: {e}");
                let _ = self.docker.kill_container::<String>(container_id, None).await;
                Ok(())
            }
        }
    }

    async fn remove(&self, container_id: &str) -> Result<(), DriverError> {
        match self
            .docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions { force: true, ..Default::default() }),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(Self::to_driver_error(e)),
        }
    }

    /// Lists container ids whose name carries [`CONTAINER_NAME_PREFIX`], used by
    /// the Reaper's orphan sweep (containers with no matching live Ship record).
    async fn list_managed_containers(&self) -> Result<Vec<String>, DriverError> {
        let mut filters = HashMap::new();
        filters.insert("name", vec![CONTAINER_NAME_PREFIX]);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions { all: true, filters, ..Default::default() }))
            .await
            .map_err(Self::to_driver_error)?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}

/// Parses size strings like `"512m"`, `"1g"`, `"2048k"` into bytes.
fn parse_memory_size(raw: &str) -> Option<u64> {
    let raw = raw.trim().to_lowercase();
    let (digits, multiplier) = if let Some(n) = raw.strip_suffix('g') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = raw.strip_suffix('m') {
        (n, 1024 * 1024)
    } else if let Some(n) = raw.strip_suffix('k') {
        (n, 1024)
    } else {
        (raw.as_str(), 1)
    };
    digits.trim().parse::<u64>().ok().map(|n| n * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_suffixes() {
        assert_eq!(parse_memory_size("512m"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory_size("1g"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_memory_size("2048k"), Some(2048 * 1024));
        assert_eq!(parse_memory_size("100"), Some(100));
        assert_eq!(parse_memory_size("bogus"), None);
    }

    #[test]
    fn container_name_is_stable_and_prefixed() {
        let id = uuid::Uuid::new_v4();
        let name = DockerDriver::container_name(id);
        assert!(name.starts_with(CONTAINER_NAME_PREFIX));
        assert_eq!(name.len(), CONTAINER_NAME_PREFIX.len() + 12);
    }
}
