//! Postgres persistence over sqlx.
//!
//! Each [`PgSession`] wraps one database transaction, giving the pipeline
//! its all-or-nothing commit per run. Queries are parameterized at runtime
//! and rows are mapped by hand; the schema itself is owned by external
//! migrations.

use crate::{round2, Store, StoreSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_common::{
    AnomalyRecord, AuthConfig, BodyConfig, EndpointSpec, Error, HttpMethod, KeyValue, Result,
    RiskRecord, Run, TenantId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

/// Postgres-backed store holding the shared connection pool
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database behind the given DSN
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(db_err)?;
        info!("Database pool connected");
        Ok(PgStore { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn session(&self) -> Result<Box<dyn StoreSession>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgSession { tx }))
    }
}

/// One transaction-scoped session
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreSession for PgSession {
    async fn get_endpoint(
        &mut self,
        id: Uuid,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<EndpointSpec>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, url, method, expected_status, expected_schema, \
             query_params, request_headers, cookies, auth, body, interval_seconds, created_at \
             FROM endpoints WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let endpoint = endpoint_from_row(&row)?;

        // Cross-tenant access is indistinguishable from absence
        if let Some(tenant) = tenant_id {
            if endpoint.tenant_id != tenant {
                return Ok(None);
            }
        }
        Ok(Some(endpoint))
    }

    async fn list_endpoints(&mut self) -> Result<Vec<EndpointSpec>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, name, url, method, expected_status, expected_schema, \
             query_params, request_headers, cookies, auth, body, interval_seconds, created_at \
             FROM endpoints ORDER BY created_at DESC",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        rows.iter().map(endpoint_from_row).collect()
    }

    async fn insert_run(&mut self, run: &Run) -> Result<()> {
        sqlx::query(
            "INSERT INTO runs \
             (id, endpoint_id, tenant_id, started_at, status_code, response_time_ms, \
              response_body, is_success, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(run.id)
        .bind(run.endpoint_id)
        .bind(run.tenant_id)
        .bind(run.started_at)
        .bind(run.status_code.map(|s| s as i32))
        .bind(run.response_time_ms)
        .bind(&run.response_body)
        .bind(run.is_success)
        .bind(&run.error_message)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn recent_response_times(
        &mut self,
        endpoint_id: Uuid,
        limit: i64,
    ) -> Result<Vec<f64>> {
        let rows = sqlx::query(
            "SELECT response_time_ms FROM runs \
             WHERE endpoint_id = $1 AND response_time_ms IS NOT NULL \
             ORDER BY started_at DESC LIMIT $2",
        )
        .bind(endpoint_id)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| row.try_get::<f64, _>("response_time_ms").map_err(db_err))
            .collect()
    }

    async fn failure_rate(
        &mut self,
        endpoint_id: Uuid,
        tenant_id: Option<TenantId>,
    ) -> Result<f64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
             COUNT(*) FILTER (WHERE NOT is_success) AS failures \
             FROM runs WHERE endpoint_id = $1 AND ($2::uuid IS NULL OR tenant_id = $2)",
        )
        .bind(endpoint_id)
        .bind(tenant_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;

        let total: i64 = row.try_get("total").map_err(db_err)?;
        if total == 0 {
            return Ok(0.0);
        }
        let failures: i64 = row.try_get("failures").map_err(db_err)?;
        Ok(round2(failures as f64 / total as f64 * 100.0))
    }

    async fn insert_anomaly(&mut self, anomaly: &AnomalyRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO anomalies \
             (id, run_id, anomaly_detected, severity_score, confidence, reasoning, \
              probable_cause, recommendation, ai_called, used_fallback, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(anomaly.id)
        .bind(anomaly.run_id)
        .bind(anomaly.anomaly_detected)
        .bind(anomaly.severity_score)
        .bind(anomaly.confidence)
        .bind(&anomaly.reasoning)
        .bind(&anomaly.probable_cause)
        .bind(&anomaly.recommendation)
        .bind(anomaly.ai_called)
        .bind(anomaly.used_fallback)
        .bind(anomaly.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_risk(&mut self, risk: &RiskRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO risk_scores \
             (id, run_id, calculated_score, risk_level, status_score, performance_score, \
              drift_score, ai_score, history_score, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(risk.id)
        .bind(risk.run_id)
        .bind(risk.calculated_score)
        .bind(risk.risk_level.as_str())
        .bind(risk.status_score)
        .bind(risk.performance_score)
        .bind(risk.drift_score)
        .bind(risk.ai_score)
        .bind(risk.history_score)
        .bind(risk.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(db_err)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(db_err)
    }
}

fn endpoint_from_row(row: &PgRow) -> Result<EndpointSpec> {
    let method: String = row.try_get("method").map_err(db_err)?;
    let expected_status: i32 = row.try_get("expected_status").map_err(db_err)?;
    let interval_seconds: i32 = row.try_get("interval_seconds").map_err(db_err)?;

    Ok(EndpointSpec {
        id: row.try_get("id").map_err(db_err)?,
        tenant_id: row.try_get("tenant_id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        url: row.try_get("url").map_err(db_err)?,
        method: method.parse::<HttpMethod>()?,
        expected_status: expected_status as u16,
        expected_schema: row.try_get("expected_schema").map_err(db_err)?,
        query_params: json_column::<Vec<KeyValue>>(row, "query_params")?,
        request_headers: json_column::<Vec<KeyValue>>(row, "request_headers")?,
        cookies: json_column::<Vec<KeyValue>>(row, "cookies")?,
        auth: json_column::<AuthConfig>(row, "auth")?,
        body: json_column::<BodyConfig>(row, "body")?,
        interval_seconds: interval_seconds as u32,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_err)?,
    })
}

fn json_column<T: serde::de::DeserializeOwned>(row: &PgRow, name: &str) -> Result<Option<T>> {
    let value: Option<serde_json::Value> = row.try_get(name).map_err(db_err)?;
    match value {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}
