//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers never block on the poller's batch writes
//! - **Connection pooling**: Shared by the scheduler, gateway sessions and API
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds (UTC).

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
use super::schema::{
    Config, ContainerCounts, ContainerSample, Host, HostStatsSnapshot, LogEntry, LogLevel,
    PruneReport,
};

/// Name of the host seeded into an empty registry
pub const DEFAULT_HOST_NAME: &str = "local";

/// Address of the host seeded into an empty registry
pub const DEFAULT_HOST_URL: &str = "localhost:2375";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database at `db_path` and run migrations.
    ///
    /// The returned backend is not seeded yet, call [`StorageBackend::init`].
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

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            StorageError::SerializationError(format!("timestamp out of range: {millis}"))
        })
    }

    fn row_to_host(row: &SqliteRow) -> Host {
        Host {
            name: row.get("name"),
            url: row.get("url"),
            secure: row.get::<i64, _>("secure") != 0,
        }
    }

    fn row_to_sample(row: &SqliteRow) -> StorageResult<ContainerSample> {
        Ok(ContainerSample {
            id: row.get("container_id"),
            host_id: row.get("host_id"),
            name: row.get("name"),
            image: row.get("image"),
            status: row.get("status"),
            state: row.get("state"),
            cpu_percent: row.get("cpu_percent"),
            memory_percent: row.get("memory_percent"),
            timestamp: Self::millis_to_timestamp(row.get("timestamp"))?,
        })
    }

    fn row_to_snapshot(row: &SqliteRow) -> StorageResult<HostStatsSnapshot> {
        let labels: String = row.get("labels");
        Ok(HostStatsSnapshot {
            host_id: row.get("host_id"),
            engine_version: row.get("engine_version"),
            driver: row.get("driver"),
            os: row.get("os"),
            architecture: row.get("architecture"),
            total_memory: row.get("total_memory"),
            total_cpu: row.get("total_cpu"),
            labels: serde_json::from_str(&labels)?,
            containers: ContainerCounts {
                total: row.get("containers"),
                running: row.get("containers_running"),
                stopped: row.get("containers_stopped"),
                paused: row.get("containers_paused"),
            },
            images: row.get("images"),
            updated_at: Self::millis_to_timestamp(row.get("updated_at"))?,
        })
    }

    fn row_to_log(row: &SqliteRow) -> StorageResult<LogEntry> {
        let level: String = row.get("level");
        Ok(LogEntry {
            id: Some(row.get("id")),
            timestamp: Self::millis_to_timestamp(row.get("timestamp"))?,
            level: level.parse()?,
            message: row.get("message"),
            file: row.get("file"),
            line: row.get::<i64, _>("line").try_into().unwrap_or(0),
        })
    }
}

/// Turn unique-constraint violations into caller errors
fn map_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> StorageError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => StorageError::Validation(what()),
        _ => StorageError::from(err),
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn init(&self) -> StorageResult<()> {
        let defaults = Config::default();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO config (id, fetching_interval, keep_data_for, polling_rate)
            VALUES (1, ?, ?, ?)
            "#,
        )
        .bind(defaults.fetching_interval)
        .bind(defaults.keep_data_for)
        .bind(defaults.polling_rate)
        .execute(&self.pool)
        .await?;

        let (hosts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM hosts")
            .fetch_one(&self.pool)
            .await?;

        if hosts == 0 {
            info!(
                "host registry empty, seeding default host {} ({})",
                DEFAULT_HOST_NAME, DEFAULT_HOST_URL
            );
            sqlx::query("INSERT OR IGNORE INTO hosts (name, url, secure) VALUES (?, ?, 0)")
                .bind(DEFAULT_HOST_NAME)
                .bind(DEFAULT_HOST_URL)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    async fn get_hosts(&self) -> StorageResult<Vec<Host>> {
        let rows = sqlx::query("SELECT name, url, secure FROM hosts ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::row_to_host).collect())
    }

    async fn get_host(&self, name: &str) -> StorageResult<Option<Host>> {
        let row = sqlx::query("SELECT name, url, secure FROM hosts WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::row_to_host))
    }

    #[instrument(skip(self, host), fields(host = %host.name))]
    async fn add_host(&self, host: &Host) -> StorageResult<()> {
        host.validate()?;

        sqlx::query("INSERT INTO hosts (name, url, secure) VALUES (?, ?, ?)")
            .bind(&host.name)
            .bind(&host.url)
            .bind(host.secure as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, || format!("host {} already exists", host.name)))?;

        info!("registered host {} at {}", host.name, host.url);
        Ok(())
    }

    #[instrument(skip(self, host), fields(host = %name))]
    async fn update_host(&self, name: &str, host: &Host) -> StorageResult<()> {
        host.validate()?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE hosts SET name = ?, url = ?, secure = ? WHERE name = ?")
            .bind(&host.name)
            .bind(&host.url)
            .bind(host.secure as i64)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique(e, || format!("host {} already exists", host.name)))?;

        if updated.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("host {name}")));
        }

        if host.name != name {
            sqlx::query("UPDATE host_stats SET host_id = ? WHERE host_id = ?")
                .bind(&host.name)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_host(&self, name: &str) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM hosts WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("host {name}")));
        }

        sqlx::query("DELETE FROM host_stats WHERE host_id = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("removed host {}", name);
        Ok(())
    }

    #[instrument(skip(self, samples), fields(count = samples.len()))]
    async fn append_container_samples(&self, samples: &[ContainerSample]) -> StorageResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        // validate the whole batch first so a bad row never leaves a partial write
        for sample in samples {
            sample.validate()?;
        }

        let mut tx = self.pool.begin().await?;

        for sample in samples {
            sqlx::query(
                r#"
                INSERT INTO container_samples (
                    container_id, host_id, name, image, status, state,
                    cpu_percent, memory_percent, timestamp
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&sample.id)
            .bind(&sample.host_id)
            .bind(&sample.name)
            .bind(&sample.image)
            .bind(&sample.status)
            .bind(&sample.state)
            .bind(sample.cpu_percent)
            .bind(sample.memory_percent)
            .bind(Self::timestamp_to_millis(&sample.timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("appended {} container samples", samples.len());
        Ok(())
    }

    async fn get_container_samples(
        &self,
        host_id: &str,
        container_id: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<ContainerSample>> {
        let rows = sqlx::query(
            r#"
            SELECT container_id, host_id, name, image, status, state,
                   cpu_percent, memory_percent, timestamp
            FROM container_samples
            WHERE host_id = ?1 AND (?2 IS NULL OR container_id = ?2)
            ORDER BY timestamp DESC, row_id DESC
            LIMIT ?3
            "#,
        )
        .bind(host_id)
        .bind(container_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_sample).collect()
    }

    #[instrument(skip(self, snapshot), fields(host = %snapshot.host_id))]
    async fn upsert_host_stats(&self, snapshot: &HostStatsSnapshot) -> StorageResult<()> {
        snapshot.validate()?;
        let labels = serde_json::to_string(&snapshot.labels)?;

        sqlx::query(
            r#"
            INSERT INTO host_stats (
                host_id, engine_version, driver, os, architecture, total_memory,
                total_cpu, labels, containers, containers_running, containers_stopped,
                containers_paused, images, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (host_id) DO UPDATE SET
                engine_version = excluded.engine_version,
                driver = excluded.driver,
                os = excluded.os,
                architecture = excluded.architecture,
                total_memory = excluded.total_memory,
                total_cpu = excluded.total_cpu,
                labels = excluded.labels,
                containers = excluded.containers,
                containers_running = excluded.containers_running,
                containers_stopped = excluded.containers_stopped,
                containers_paused = excluded.containers_paused,
                images = excluded.images,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&snapshot.host_id)
        .bind(&snapshot.engine_version)
        .bind(&snapshot.driver)
        .bind(&snapshot.os)
        .bind(&snapshot.architecture)
        .bind(snapshot.total_memory)
        .bind(snapshot.total_cpu)
        .bind(labels)
        .bind(snapshot.containers.total)
        .bind(snapshot.containers.running)
        .bind(snapshot.containers.stopped)
        .bind(snapshot.containers.paused)
        .bind(snapshot.images)
        .bind(Self::timestamp_to_millis(&snapshot.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_host_stats(&self, host_id: &str) -> StorageResult<Option<HostStatsSnapshot>> {
        let row = sqlx::query("SELECT * FROM host_stats WHERE host_id = ?")
            .bind(host_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_snapshot).transpose()
    }

    async fn get_all_host_stats(&self) -> StorageResult<Vec<HostStatsSnapshot>> {
        let rows = sqlx::query("SELECT * FROM host_stats ORDER BY host_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_snapshot).collect()
    }

    async fn get_config(&self) -> StorageResult<Config> {
        let row = sqlx::query(
            "SELECT fetching_interval, keep_data_for, polling_rate FROM config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound("config row (store not initialized)".into()))?;

        let read = |column: &str| -> StorageResult<u32> {
            let value: i64 = row.get(column);
            u32::try_from(value).map_err(|_| {
                StorageError::SerializationError(format!("config {column} out of range: {value}"))
            })
        };

        Ok(Config {
            fetching_interval: read("fetching_interval")?,
            keep_data_for: read("keep_data_for")?,
            polling_rate: read("polling_rate")?,
        })
    }

    #[instrument(skip(self))]
    async fn update_config(&self, config: &Config) -> StorageResult<()> {
        config.validate()?;

        sqlx::query(
            r#"
            INSERT INTO config (id, fetching_interval, keep_data_for, polling_rate)
            VALUES (1, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                fetching_interval = excluded.fetching_interval,
                keep_data_for = excluded.keep_data_for,
                polling_rate = excluded.polling_rate
            "#,
        )
        .bind(config.fetching_interval)
        .bind(config.keep_data_for)
        .bind(config.polling_rate)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_log(&self, entry: &LogEntry) -> StorageResult<()> {
        entry.validate()?;

        sqlx::query(
            "INSERT INTO log_entries (timestamp, level, message, file, line) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Self::timestamp_to_millis(&entry.timestamp))
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(&entry.file)
        .bind(i64::from(entry.line))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_logs(&self, level: Option<LogLevel>) -> StorageResult<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, level, message, file, line
            FROM log_entries
            WHERE ?1 IS NULL OR level = ?1
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(level.map(|l| l.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_log).collect()
    }

    #[instrument(skip(self))]
    async fn clear_logs(&self, level: Option<LogLevel>) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM log_entries WHERE ?1 IS NULL OR level = ?1")
            .bind(level.map(|l| l.as_str()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(cutoff = %cutoff))]
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> StorageResult<PruneReport> {
        let cutoff_millis = Self::timestamp_to_millis(&cutoff);

        let mut tx = self.pool.begin().await?;

        let samples = sqlx::query("DELETE FROM container_samples WHERE timestamp < ?")
            .bind(cutoff_millis)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let logs = sqlx::query("DELETE FROM log_entries WHERE timestamp < ?")
            .bind(cutoff_millis)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        info!("pruned {} samples and {} log entries", samples, logs);
        Ok(PruneReport { samples, logs })
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: format!("SQLite backend operational ({})", self.db_path),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
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
