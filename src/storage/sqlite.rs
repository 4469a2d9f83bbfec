//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Probe tasks of one cycle write concurrently
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds, telemetry documents as JSON
//! text.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use crate::model::{
    Alert, AlertStats, AlertStatus, Inspection, InspectionMetrics, Node, NodeSpec, NodeStatus,
};

const NODE_COLUMNS: &str = "id, name, ip, url, enabled, check_interval_secs, token, status, last_check_at";

const INSPECTION_COLUMNS: &str = "id, node_id, hostname, ip, raw_data, analysis, alert, level, \
     cpu_used, memory_used, load_avg, ping_loss, created_at";

const ALERT_COLUMNS: &str = "id, node_id, inspection_id, level, title, summary, details, \
     solution, status, notified, resolved_at, created_at, updated_at";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for concurrent writers (WAL mode, busy timeout)
    ///
    /// ```no_run
    /// # use fleet_inspector::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./inspector.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        info!("SQLite connection pool created");

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn node_from_row(row: &SqliteRow) -> StorageResult<Node> {
        let status: String = row.try_get("status")?;
        Ok(Node {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            ip: row.try_get("ip")?,
            url: row.try_get("url")?,
            enabled: row.try_get("enabled")?,
            check_interval_secs: row.try_get::<i64, _>("check_interval_secs")?.max(0) as u64,
            status: status.parse().unwrap_or_default(),
            last_check_at: row
                .try_get::<Option<i64>, _>("last_check_at")?
                .map(Self::millis_to_timestamp),
            token: row.try_get("token")?,
        })
    }

    fn inspection_from_row(row: &SqliteRow) -> StorageResult<Inspection> {
        let raw_data: String = row.try_get("raw_data")?;
        let analysis: String = row.try_get("analysis")?;
        let level: String = row.try_get("level")?;

        Ok(Inspection {
            id: Some(row.try_get("id")?),
            node_id: row.try_get("node_id")?,
            hostname: row.try_get("hostname")?,
            ip: row.try_get("ip")?,
            raw_data: serde_json::from_str(&raw_data)?,
            analysis: serde_json::from_str(&analysis)?,
            alert: row.try_get("alert")?,
            level: level.parse().unwrap_or_default(),
            metrics: InspectionMetrics {
                cpu_used: row.try_get("cpu_used")?,
                memory_used: row.try_get("memory_used")?,
                load_avg: row.try_get("load_avg")?,
                ping_loss: row.try_get("ping_loss")?,
            },
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
        })
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<Alert> {
        let level: String = row.try_get("level")?;
        let status: String = row.try_get("status")?;

        Ok(Alert {
            id: Some(row.try_get("id")?),
            node_id: row.try_get("node_id")?,
            inspection_id: row.try_get("inspection_id")?,
            level: level.parse().unwrap_or_default(),
            title: row.try_get("title")?,
            summary: row.try_get("summary")?,
            details: row.try_get("details")?,
            solution: row.try_get("solution")?,
            status: status.parse().unwrap_or_default(),
            notified: row.try_get("notified")?,
            resolved_at: row
                .try_get::<Option<i64>, _>("resolved_at")?
                .map(Self::millis_to_timestamp),
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
            updated_at: Self::millis_to_timestamp(row.try_get("updated_at")?),
        })
    }

    async fn fetch_node(&self, id: i64) -> StorageResult<Option<Node>> {
        let row = sqlx::query(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.as_ref().map(Self::node_from_row).transpose()
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, spec), fields(node = %spec.name))]
    async fn upsert_node(&self, spec: NodeSpec) -> StorageResult<Node> {
        let now = Self::timestamp_to_millis(&Utc::now());

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO nodes (name, ip, url, enabled, check_interval_secs, token, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                ip = excluded.ip,
                url = excluded.url,
                enabled = excluded.enabled,
                check_interval_secs = excluded.check_interval_secs,
                token = excluded.token,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&spec.name)
        .bind(&spec.ip)
        .bind(&spec.url)
        .bind(spec.enabled)
        .bind(spec.check_interval_secs as i64)
        .bind(&spec.token)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        self.fetch_node(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("node {id}")))
    }

    async fn list_nodes(&self) -> StorageResult<Vec<Node>> {
        let rows = sqlx::query(&format!("SELECT {NODE_COLUMNS} FROM nodes ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::node_from_row).collect()
    }

    async fn list_enabled_nodes(&self) -> StorageResult<Vec<Node>> {
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE enabled = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::node_from_row).collect()
    }

    async fn get_node(&self, id: i64) -> StorageResult<Option<Node>> {
        self.fetch_node(id).await
    }

    #[instrument(skip(self))]
    async fn update_node_status(&self, id: i64, status: NodeStatus) -> StorageResult<()> {
        let now = Self::timestamp_to_millis(&Utc::now());

        let result = sqlx::query(
            "UPDATE nodes SET status = ?, last_check_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("node {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, inspection), fields(node_id = inspection.node_id))]
    async fn save_inspection(&self, inspection: &Inspection) -> StorageResult<i64> {
        let raw_data = serde_json::to_string(&inspection.raw_data)?;
        let analysis = serde_json::to_string(&inspection.analysis)?;

        let result = sqlx::query(
            r#"
            INSERT INTO inspections (
                node_id, hostname, ip, raw_data, analysis, alert, level,
                cpu_used, memory_used, load_avg, ping_loss, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(inspection.node_id)
        .bind(&inspection.hostname)
        .bind(&inspection.ip)
        .bind(raw_data)
        .bind(analysis)
        .bind(inspection.alert)
        .bind(inspection.level.as_str())
        .bind(inspection.metrics.cpu_used)
        .bind(inspection.metrics.memory_used)
        .bind(inspection.metrics.load_avg)
        .bind(inspection.metrics.ping_loss)
        .bind(Self::timestamp_to_millis(&inspection.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn latest_inspections(&self) -> StorageResult<Vec<Inspection>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {INSPECTION_COLUMNS} FROM inspections
            WHERE id IN (SELECT MAX(id) FROM inspections GROUP BY node_id)
            ORDER BY node_id
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::inspection_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn inspections_for_node(
        &self,
        node_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<Inspection>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {INSPECTION_COLUMNS} FROM inspections
            WHERE node_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(node_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::inspection_from_row).collect()
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_old_inspections(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let before_millis = Self::timestamp_to_millis(&before);

        info!("cleaning up inspections older than {}", before);

        let result = sqlx::query("DELETE FROM inspections WHERE created_at < ?")
            .bind(before_millis)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old inspections", deleted);

        Ok(deleted)
    }

    #[instrument(skip(self, alert), fields(node_id = alert.node_id, level = %alert.level))]
    async fn create_alert(&self, alert: &Alert) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts (
                node_id, inspection_id, level, title, summary, details, solution,
                status, notified, resolved_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.node_id)
        .bind(alert.inspection_id)
        .bind(alert.level.as_str())
        .bind(&alert.title)
        .bind(&alert.summary)
        .bind(&alert.details)
        .bind(&alert.solution)
        .bind(alert.status.to_string())
        .bind(alert.notified)
        .bind(alert.resolved_at.as_ref().map(Self::timestamp_to_millis))
        .bind(Self::timestamp_to_millis(&alert.created_at))
        .bind(Self::timestamp_to_millis(&alert.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn mark_alert_notified(&self, id: i64) -> StorageResult<()> {
        let result = sqlx::query("UPDATE alerts SET notified = 1, updated_at = ? WHERE id = ?")
            .bind(Self::timestamp_to_millis(&Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("alert {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_alert_status(&self, id: i64, status: AlertStatus) -> StorageResult<()> {
        let now = Self::timestamp_to_millis(&Utc::now());
        let resolved_at = (status == AlertStatus::Resolved).then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET status = ?, updated_at = ?, resolved_at = COALESCE(?, resolved_at)
            WHERE id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(now)
        .bind(resolved_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("alert {id}")));
        }
        Ok(())
    }

    async fn list_alerts(&self, limit: usize, offset: usize) -> StorageResult<Vec<Alert>> {
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts ORDER BY id DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    async fn alert_stats(&self) -> StorageResult<AlertStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending,
                COALESCE(SUM(CASE WHEN level = 'CRITICAL' THEN 1 ELSE 0 END), 0) AS critical,
                COALESCE(SUM(CASE WHEN level = 'WARNING' THEN 1 ELSE 0 END), 0) AS warning
            FROM alerts
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let count = |column: &str| -> StorageResult<u64> {
            Ok(row.try_get::<i64, _>(column)?.max(0) as u64)
        };

        Ok(AlertStats {
            total: count("total")?,
            pending: count("pending")?,
            critical: count("critical")?,
            warning: count("warning")?,
        })
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
