// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Health Prober (spec 4.3) — polls a Ship's `/health` endpoint until ready or
//! deadline, the same shape as the teacher's `run_health_check_task` polling
//! loop in `lifecycle.rs`, but hitting the upstream Ship over HTTP via
//! `reqwest` instead of pulling `docker.stats()`.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    Timeout,
    Cancelled,
}

pub struct HealthProber {
    client: reqwest::Client,
    interval: Duration,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(client: reqwest::Client, interval: Duration, timeout: Duration) -> Self {
        Self { client, interval, timeout }
    }

    /// Polls `GET {address}/health` every `interval` until 200 OK, `timeout`
    /// elapses, or `cancel` fires. Must be called with `address` already
    /// resolved (post `Start`).
    pub async fn wait_ready(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProbeError> {
        let url = format!("http://{address}/health");
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(ProbeError::Cancelled);
            }

            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => debug!(status = %resp.status(), %url, "health probe not yet ready"),
                Err(e) => debug!(error = %e, %url, "health probe connection failed"),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ProbeError::Timeout);
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let sleep = self.interval.min(remaining.max(Duration::from_millis(1)));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
                _ = tokio::time::sleep(sleep) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn times_out_against_an_address_nothing_listens_on() {
        let prober = HealthProber::new(
            reqwest::Client::new(),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );
        let cancel = CancellationToken::new();
        // Port 1 is reserved/unassigned; connection should fail promptly.
        let result = prober.wait_ready("127.0.0.1:1", &cancel).await;
        assert_eq!(result, Err(ProbeError::Timeout));
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_the_deadline() {
        let prober = HealthProber::new(
            reqwest::Client::new(),
            Duration::from_millis(500),
            Duration::from_secs(10),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = prober.wait_ready("127.0.0.1:1", &cancel).await;
        assert_eq!(result, Err(ProbeError::Cancelled));
    }
}
