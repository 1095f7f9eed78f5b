//! Integration tests for storage persistence
//!
//! These tests verify that:
//! - Hosts, samples, snapshots, config and logs survive a reopen
//! - Concurrent writers and readers share one database file
//! - Retention keeps rows stamped exactly at the cutoff
//! - Renaming a host carries its snapshot along

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fleet_monitoring::storage::{
    Config, ContainerCounts, ContainerSample, HostStatsSnapshot, LogEntry, LogLevel,
    StorageBackend, sqlite::SqliteBackend,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::{empty_store, host};

fn sample(host_id: &str, id: &str, timestamp: DateTime<Utc>) -> ContainerSample {
    ContainerSample {
        id: id.to_string(),
        host_id: host_id.to_string(),
        name: format!("svc-{id}"),
        image: "svc:latest".to_string(),
        status: "Up".to_string(),
        state: "running".to_string(),
        cpu_percent: 12.5,
        memory_percent: 40.0,
        timestamp,
    }
}

fn snapshot(host_id: &str, running: i64) -> HostStatsSnapshot {
    HostStatsSnapshot {
        host_id: host_id.to_string(),
        engine_version: "27.1.0".to_string(),
        driver: "overlay2".to_string(),
        os: "Debian GNU/Linux 12".to_string(),
        architecture: "x86_64".to_string(),
        total_memory: 8 * 1024 * 1024 * 1024,
        total_cpu: 4,
        labels: vec!["zone=a".to_string()],
        containers: ContainerCounts {
            total: running + 1,
            running,
            stopped: 1,
            paused: 0,
        },
        images: 12,
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("fleet.db");
    // millisecond precision on disk
    let stamp = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();

    {
        let backend = SqliteBackend::new(&db_path).await.unwrap();
        backend.init().await.unwrap();
        backend.add_host(&host("alpha")).await.unwrap();
        backend
            .append_container_samples(&[sample("alpha", "a1", stamp)])
            .await
            .unwrap();
        backend.upsert_host_stats(&snapshot("alpha", 3)).await.unwrap();
        backend
            .update_config(&Config {
                fetching_interval: 2,
                keep_data_for: 30,
                polling_rate: 1,
            })
            .await
            .unwrap();
        backend
            .append_log(&LogEntry::new(LogLevel::Warn, "engine slow"))
            .await
            .unwrap();
        backend.close().await.unwrap();
    }

    let backend = SqliteBackend::new(&db_path).await.unwrap();
    backend.init().await.unwrap();

    let names: Vec<_> = backend
        .get_hosts()
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.name)
        .collect();
    assert_eq!(names, vec!["alpha".to_string(), "local".to_string()]);

    let samples = backend.get_container_samples("alpha", None, 10).await.unwrap();
    assert_eq!(samples, vec![sample("alpha", "a1", stamp)]);

    let stats = backend.get_host_stats("alpha").await.unwrap().unwrap();
    assert_eq!(stats.containers.running, 3);
    assert_eq!(stats.labels, vec!["zone=a".to_string()]);

    assert_eq!(backend.get_config().await.unwrap().fetching_interval, 2);

    let logs = backend.get_logs(Some(LogLevel::Warn)).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "engine slow");
}

#[tokio::test]
async fn test_concurrent_writers_and_readers() {
    let (_dir, store) = empty_store().await;
    store.add_host(&host("alpha")).await.unwrap();

    let mut tasks = Vec::new();
    for writer in 0..4 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            for i in 0..25 {
                let id = format!("w{writer}-{i}");
                store
                    .append_container_samples(&[sample("alpha", &id, Utc::now())])
                    .await
                    .unwrap();
                store.get_container_samples("alpha", None, 5).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let samples = store.get_container_samples("alpha", None, 1000).await.unwrap();
    assert_eq!(samples.len(), 100);
    assert!(samples.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}

#[tokio::test]
async fn test_prune_keeps_rows_at_cutoff() {
    let (_dir, store) = empty_store().await;
    let cutoff = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();

    store
        .append_container_samples(&[
            sample("alpha", "old", cutoff - Duration::milliseconds(1)),
            sample("alpha", "edge", cutoff),
            sample("alpha", "new", cutoff + Duration::seconds(1)),
        ])
        .await
        .unwrap();

    let mut old_log = LogEntry::new(LogLevel::Info, "old");
    old_log.timestamp = cutoff - Duration::days(1);
    store.append_log(&old_log).await.unwrap();

    let report = store.prune_before(cutoff).await.unwrap();
    assert_eq!(report.samples, 1);
    assert_eq!(report.logs, 1);

    let mut ids: Vec<_> = store
        .get_container_samples("alpha", None, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["edge".to_string(), "new".to_string()]);
}

#[tokio::test]
async fn test_rename_moves_snapshot_and_delete_drops_it() {
    let (_dir, store) = empty_store().await;
    store.add_host(&host("alpha")).await.unwrap();
    store.upsert_host_stats(&snapshot("alpha", 2)).await.unwrap();
    store.upsert_host_stats(&snapshot("alpha", 5)).await.unwrap();

    store.update_host("alpha", &host("omega")).await.unwrap();

    assert!(store.get_host_stats("alpha").await.unwrap().is_none());
    let moved = store.get_host_stats("omega").await.unwrap().unwrap();
    assert_eq!(moved.containers.running, 5);
    assert_eq!(store.get_all_host_stats().await.unwrap().len(), 1);

    store.delete_host("omega").await.unwrap();
    assert!(store.get_all_host_stats().await.unwrap().is_empty());
}
