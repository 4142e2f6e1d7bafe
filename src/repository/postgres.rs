// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Postgres-backed `ShipRepository`, grounded in the teacher's `db::sessions`
//! CRUD style: plain `sqlx::query`/`query_as` calls against a `PgPool`, JSON
//! columns for nested structures, `RETURNING *` on writes that need the row back.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use async_trait::async_trait;

use super::{RepositoryError, ShipRepository};
use crate::model::{Ship, ShipFilter, ShipSpec, ShipStatus};

pub type DbPool = PgPool;

pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    info!("connecting to PostgreSQL database");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;
    info!("PostgreSQL connection pool established");
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    info!("running database migrations");
    let migration_sql = include_str!("../../migrations/001_initial.sql");
    sqlx::raw_sql(migration_sql).execute(pool).await?;
    info!("database migrations completed successfully");
    Ok(())
}

#[derive(FromRow)]
struct ShipRow {
    id: Uuid,
    status: String,
    container_id: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ttl_seconds: i64,
    deadline: DateTime<Utc>,
    max_session_num: i32,
    spec: JsonValue,
}

impl TryFrom<ShipRow> for Ship {
    type Error = RepositoryError;

    fn try_from(row: ShipRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ShipStatus>()
            .map_err(RepositoryError::Backend)?;
        let spec: ShipSpec =
            serde_json::from_value(row.spec).map_err(|e| RepositoryError::Backend(e.to_string()))?;
        Ok(Ship {
            id: row.id,
            status,
            container_id: row.container_id,
            address: row.address,
            created_at: row.created_at,
            updated_at: row.updated_at,
            ttl_seconds: row.ttl_seconds,
            deadline: row.deadline,
            max_session_num: row.max_session_num,
            spec,
        })
    }
}

pub struct PostgresRepository {
    pool: DbPool,
}

impl PostgresRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn map_sqlx(e: sqlx::Error) -> RepositoryError {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("ship not found".into()),
            other => RepositoryError::Backend(other.to_string()),
        }
    }
}

#[async_trait]
impl ShipRepository for PostgresRepository {
    async fn insert(&self, ship: &Ship) -> Result<(), RepositoryError> {
        let spec_json = serde_json::to_value(&ship.spec).unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO ships
                (id, status, container_id, address, created_at, updated_at,
                 ttl_seconds, deadline, max_session_num, spec)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(ship.id)
        .bind(ship.status.to_string())
        .bind(&ship.container_id)
        .bind(&ship.address)
        .bind(ship.created_at)
        .bind(ship.updated_at)
        .bind(ship.ttl_seconds)
        .bind(ship.deadline)
        .bind(ship.max_session_num)
        .bind(spec_json)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx)?;

        debug!(ship_id = %ship.id, "inserted ship record");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Ship, RepositoryError> {
        let row = sqlx::query_as::<_, ShipRow>("SELECT * FROM ships WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_sqlx)?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        row.try_into()
    }

    async fn update(&self, ship: &Ship) -> Result<(), RepositoryError> {
        let spec_json = serde_json::to_value(&ship.spec).unwrap_or_default();
        let result = sqlx::query(
            r#"
            UPDATE ships
            SET status = $1, container_id = $2, address = $3, updated_at = $4,
                ttl_seconds = $5, deadline = $6, spec = $7
            WHERE id = $8
            "#,
        )
        .bind(ship.status.to_string())
        .bind(&ship.container_id)
        .bind(&ship.address)
        .bind(ship.updated_at)
        .bind(ship.ttl_seconds)
        .bind(ship.deadline)
        .bind(spec_json)
        .bind(ship.id)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(ship.id.to_string()));
        }
        Ok(())
    }

    async fn list(&self, filter: &ShipFilter) -> Result<Vec<Ship>, RepositoryError> {
        let rows = match &filter.status {
            Some(status) => {
                sqlx::query_as::<_, ShipRow>(
                    "SELECT * FROM ships WHERE status = $1 ORDER BY created_at DESC",
                )
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, ShipRow>("SELECT * FROM ships ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(Self::map_sqlx)?;

        rows.into_iter().map(Ship::try_from).collect()
    }

    async fn list_live(&self) -> Result<Vec<Ship>, RepositoryError> {
        let rows = sqlx::query_as::<_, ShipRow>(
            "SELECT * FROM ships WHERE status != 'stopped' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_sqlx)?;

        rows.into_iter().map(Ship::try_from).collect()
    }

    async fn bind_session(&self, ship_id: Uuid, session_id: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO session_bindings (ship_id, session_id)
            VALUES ($1, $2)
            ON CONFLICT (ship_id, session_id) DO NOTHING
            "#,
        )
        .bind(ship_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx)?;
        Ok(())
    }

    async fn unbind_all(&self, ship_id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM session_bindings WHERE ship_id = $1")
            .bind(ship_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx)?;
        Ok(())
    }

    async fn sessions_for(&self, ship_id: Uuid) -> Result<Vec<String>, RepositoryError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT session_id FROM session_bindings WHERE ship_id = $1")
                .bind(ship_id)
                .fetch_all(&self.pool)
                .await
                .map_err(Self::map_sqlx)?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }
}
