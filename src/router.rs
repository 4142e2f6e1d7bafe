// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Operation Router (spec 4.7) — resolves `POST /ship/{id}/exec/{oper_endpoint}`
//! and forwards it to the upstream Ship, streaming status and body back.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::affinity::{AffinityIndex, BindOutcome};
use crate::config::SecurityConfig;
use crate::error::ShipyardError;
use crate::model::ShipStatus;
use crate::repository::ShipRepository;
use crate::security;

pub struct UpstreamResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

pub struct OperationRouter {
    client: reqwest::Client,
    repository: Arc<dyn ShipRepository>,
    affinity: Arc<AffinityIndex>,
    request_timeout: Duration,
    security: SecurityConfig,
}

impl OperationRouter {
    pub fn new(
        client: reqwest::Client,
        repository: Arc<dyn ShipRepository>,
        affinity: Arc<AffinityIndex>,
        request_timeout: Duration,
        security: SecurityConfig,
    ) -> Self {
        Self { client, repository, affinity, request_timeout, security }
    }

    /// Resolution order per spec.md 4.7, steps 3-5 (auth and the X-SESSION-ID
    /// presence check happen in the HTTP Front before this is called).
    pub async fn forward(
        &self,
        ship_id: Uuid,
        session: &str,
        oper_endpoint: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<UpstreamResponse, ShipyardError> {
        let ship = self
            .repository
            .get(ship_id)
            .await
            .map_err(|_| ShipyardError::NotFound(ship_id.to_string()))?;

        if ship.status != ShipStatus::Running {
            return Err(ShipyardError::IllegalState(format!(
                "ship {ship_id} is not running"
            )));
        }

        if self.affinity.lookup(session) != Some(ship_id) {
            match self
                .affinity
                .bind(session, ship_id, ship.max_session_num, ship.status)
                .await?
            {
                BindOutcome::Bound | BindOutcome::AlreadyBound => {}
                BindOutcome::SessionCapExceeded => {
                    return Err(ShipyardError::CapacityExhausted(format!(
                        "ship {ship_id} has no free session slots"
                    )))
                }
            }
        }

        if self.security.validate_commands {
            let payload = String::from_utf8_lossy(&body);
            let result = security::validate_input(&payload);
            if !result.is_safe {
                if self.security.log_security_events {
                    tracing::warn!(
                        %ship_id, %session, endpoint = %oper_endpoint,
                        reason = ?result.reason, severity = ?result.severity,
                        "exec payload failed security validation"
                    );
                }
                if self.security.block_dangerous_commands {
                    return Err(ShipyardError::InvalidArgument(
                        result.reason.unwrap_or_else(|| "unsafe exec payload".to_string()),
                    ));
                }
            }
        }

        let address = ship
            .address
            .ok_or_else(|| ShipyardError::IllegalState(format!("ship {ship_id} has no address")))?;
        let url = format!("http://{address}/{oper_endpoint}");

        let mut request = self
            .client
            .post(&url)
            .header("X-SESSION-ID", session)
            .timeout(self.request_timeout)
            .body(body);
        if let Some(ct) = content_type {
            request = request.header("Content-Type", ct);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ShipyardError::DeadlineExceeded(format!("upstream timed out: {e}"))
            } else {
                ShipyardError::Unavailable(format!("upstream unreachable: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| ShipyardError::Unavailable(format!("failed reading upstream body: {e}")))?
            .to_vec();

        Ok(UpstreamResponse { status, body, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Ship, ShipSpec};
    use crate::repository::fake::FakeRepository;

    fn test_security() -> SecurityConfig {
        SecurityConfig {
            validate_commands: true,
            block_dangerous_commands: true,
            log_security_events: false,
            max_input_length: 10_000,
            trusted_proxies: Vec::new(),
        }
    }

    #[tokio::test]
    async fn forward_fails_not_found_for_unknown_ship() {
        let repository = Arc::new(FakeRepository::new());
        let affinity = Arc::new(AffinityIndex::new(repository.clone()));
        let router = OperationRouter::new(
            reqwest::Client::new(),
            repository,
            affinity,
            Duration::from_secs(1),
            test_security(),
        );
        let err = router
            .forward(Uuid::new_v4(), "s1", "fs/read_file", vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShipyardError::NotFound(_)));
    }

    #[tokio::test]
    async fn forward_fails_illegal_state_for_non_running_ship() {
        let repository = Arc::new(FakeRepository::new());
        let affinity = Arc::new(AffinityIndex::new(repository.clone()));
        let ship = Ship::new(Uuid::new_v4(), 60, 1, ShipSpec::default());
        repository.insert(&ship).await.unwrap();

        let router = OperationRouter::new(
            reqwest::Client::new(),
            repository,
            affinity,
            Duration::from_secs(1),
            test_security(),
        );
        let err = router
            .forward(ship.id, "s1", "fs/read_file", vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShipyardError::IllegalState(_)));
    }

    #[tokio::test]
    async fn forward_respects_session_cap_on_new_binding() {
        let repository = Arc::new(FakeRepository::new());
        let affinity = Arc::new(AffinityIndex::new(repository.clone()));
        let mut ship = Ship::new(Uuid::new_v4(), 60, 1, ShipSpec::default());
        ship.status = ShipStatus::Running;
        ship.address = Some("127.0.0.1:1".into());
        repository.insert(&ship).await.unwrap();
        affinity.bind("s1", ship.id, 1, ship.status).await.unwrap();

        let router = OperationRouter::new(
            reqwest::Client::new(),
            repository,
            affinity,
            Duration::from_secs(1),
            test_security(),
        );
        let err = router
            .forward(ship.id, "s2", "fs/read_file", vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShipyardError::CapacityExhausted(_)));
    }

    #[tokio::test]
    async fn forward_blocks_dangerous_exec_payload_before_proxying() {
        let repository = Arc::new(FakeRepository::new());
        let affinity = Arc::new(AffinityIndex::new(repository.clone()));
        let mut ship = Ship::new(Uuid::new_v4(), 60, 1, ShipSpec::default());
        ship.status = ShipStatus::Running;
        ship.address = Some("127.0.0.1:1".into());
        repository.insert(&ship).await.unwrap();

        let router = OperationRouter::new(
            reqwest::Client::new(),
            repository,
            affinity,
            Duration::from_secs(1),
            test_security(),
        );
        let body = br#"{"cmd":"rm -rf /"}"#.to_vec();
        let err = router
            .forward(ship.id, "s1", "shell/exec", body, Some("application/json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShipyardError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn forward_allows_dangerous_payload_when_blocking_disabled() {
        let repository = Arc::new(FakeRepository::new());
        let affinity = Arc::new(AffinityIndex::new(repository.clone()));
        let mut ship = Ship::new(Uuid::new_v4(), 60, 1, ShipSpec::default());
        ship.status = ShipStatus::Running;
        ship.address = Some("127.0.0.1:1".into());
        repository.insert(&ship).await.unwrap();

        let mut security = test_security();
        security.block_dangerous_commands = false;
        let router = OperationRouter::new(
            reqwest::Client::new(),
            repository,
            affinity,
            Duration::from_millis(50),
            security,
        );
        let body = br#"{"cmd":"rm -rf /"}"#.to_vec();
        let err = router
            .forward(ship.id, "s1", "shell/exec", body, Some("application/json"))
            .await
            .unwrap_err();
        // Validation is bypassed (block disabled); the call proceeds to the
        // unreachable upstream address and fails there instead.
        assert!(matches!(err, ShipyardError::Unavailable(_)));
    }
}
