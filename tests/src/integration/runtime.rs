//! # Runtime Integration
//!
//! The RocksDB document store drives the dispatcher through its change feed.
//! Telemetry and the ledger are in-memory.
//!
//! 1. Live tail: events appended while the dispatcher runs are processed
//! 2. Restart: a reopened store resumes after the committed token
//! 3. Backlog: several events of one item stored before start all anchor

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anchor_pipeline::adapters::{InMemorySensorStore, ScriptedLedger};
    use anchor_pipeline::AuditStore;
    use anchor_runtime::adapters::{RocksDbConfig, RocksDocumentStore};
    use anchor_runtime::{AnchorConfig, AnchorContainer, DispatchSummary};
    use shared_bus::{ResumeToken, ResumeTokenStore};
    use shared_types::AnchorStatus;
    use tempfile::TempDir;
    use tokio::sync::watch;
    use tokio::task::JoinHandle;

    use crate::fixtures::{
        event, reading, transit_readings, ITEM, LOC_A, LOC_B, LOC_C, TRANSIT_DIGEST,
    };

    struct Running {
        container: AnchorContainer,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<DispatchSummary>,
    }

    fn open_store(dir: &TempDir) -> Arc<RocksDocumentStore> {
        Arc::new(
            RocksDocumentStore::open(RocksDbConfig::for_testing(
                dir.path().to_string_lossy().to_string(),
            ))
            .unwrap(),
        )
    }

    fn config() -> AnchorConfig {
        let mut config = AnchorConfig::default();
        config.document_store.poll_interval_ms = 20;
        config.pipeline.max_concurrent_runs = 4;
        config.pipeline.shutdown_timeout_secs = 5;
        config
    }

    fn start(documents: Arc<RocksDocumentStore>, sensors: Arc<InMemorySensorStore>) -> Running {
        let container = AnchorContainer::with_stores(
            documents,
            sensors,
            Arc::new(ScriptedLedger::accepting()),
            &config(),
        );
        let dispatcher = container.dispatcher();
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(async move { dispatcher.run(rx).await.unwrap() });
        Running {
            container,
            shutdown,
            task,
        }
    }

    async fn stop(running: Running) -> DispatchSummary {
        running.shutdown.send(true).unwrap();
        running.task.await.unwrap()
    }

    async fn committed(store: &RocksDocumentStore) -> Option<ResumeToken> {
        store.load().await.unwrap()
    }

    async fn within_deadline(what: &str, wait: impl std::future::Future<Output = ()>) {
        let reached = tokio::time::timeout(Duration::from_secs(10), wait).await;
        assert!(reached.is_ok(), "timed out waiting for {what}");
    }

    async fn wait_for_commit(store: &RocksDocumentStore, token: u64) {
        within_deadline("resume token", async {
            while committed(store).await != Some(ResumeToken(token)) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
    }

    async fn wait_for_audit(store: &RocksDocumentStore, records: usize) {
        within_deadline("audit records", async {
            while store.scan().await.unwrap().len() < records {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
    }

    /// Background feed tasks hold the store until they notice the stream closed.
    async fn wait_released(store: &Arc<RocksDocumentStore>) {
        within_deadline("store release", async {
            while Arc::strong_count(store) > 1 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_live_tail_anchors_transit() {
        let dir = TempDir::new().unwrap();
        let documents = open_store(&dir);
        let sensors = Arc::new(InMemorySensorStore::new());
        for r in transit_readings() {
            sensors.insert(r);
        }

        let running = start(documents.clone(), sensors.clone());

        documents
            .append_event(&event("e1", LOC_A, "2024-01-01T00:00:00Z"))
            .unwrap();
        wait_for_commit(&documents, 1).await;

        documents
            .append_event(&event("e2", LOC_B, "2024-01-01T00:05:00Z"))
            .unwrap();
        wait_for_audit(&documents, 1).await;

        let summary = stop(running).await;
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.committed, Some(ResumeToken(2)));

        let record = documents.scan().await.unwrap().remove(0);
        assert_eq!(record.digest.to_hex(), TRANSIT_DIGEST);
        assert_eq!(record.anchor_status, AnchorStatus::Anchored);

        let stamped = sensors
            .rows()
            .iter()
            .filter(|r| r.digest.as_deref() == Some(TRANSIT_DIGEST))
            .count();
        assert_eq!(stamped, 3);
    }

    #[tokio::test]
    async fn test_backlog_of_one_item_anchors_every_window() {
        let dir = TempDir::new().unwrap();
        let documents = open_store(&dir);
        let sensors = Arc::new(InMemorySensorStore::new());
        for r in transit_readings() {
            sensors.insert(r);
        }
        sensors.insert(reading(LOC_C, "s-3", "Bosch", "2024-01-01T00:08:00Z", 4.5, 60.0));

        for (id, location, time) in [
            ("e1", LOC_A, "2024-01-01T00:00:00Z"),
            ("e2", LOC_B, "2024-01-01T00:05:00Z"),
            ("e3", LOC_C, "2024-01-01T00:10:00Z"),
        ] {
            documents.append_event(&event(id, location, time)).unwrap();
        }

        let running = start(documents.clone(), sensors.clone());
        wait_for_commit(&documents, 3).await;
        wait_for_audit(&documents, 2).await;
        let summary = stop(running).await;

        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.failed, 0);

        let mut trail = documents.find_by_item(ITEM).await.unwrap();
        trail.sort_by_key(|r| r.window.from_time);
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].digest.to_hex(), TRANSIT_DIGEST);
        assert_eq!(
            (trail[0].window.prev_location.as_str(), trail[0].window.present_location.as_str()),
            (LOC_A, LOC_B)
        );
        assert_eq!(
            (trail[1].window.prev_location.as_str(), trail[1].window.present_location.as_str()),
            (LOC_B, LOC_C)
        );
        assert!(trail.iter().all(|r| r.anchor_status == AnchorStatus::Anchored));
    }

    #[tokio::test]
    async fn test_restart_resumes_after_committed_token() {
        let dir = TempDir::new().unwrap();
        let sensors = Arc::new(InMemorySensorStore::new());
        for r in transit_readings() {
            sensors.insert(r);
        }
        sensors.insert(reading(LOC_C, "s-3", "Bosch", "2024-01-01T00:08:00Z", 4.5, 60.0));

        {
            let documents = open_store(&dir);
            let running = start(documents.clone(), sensors.clone());
            documents
                .append_event(&event("e1", LOC_A, "2024-01-01T00:00:00Z"))
                .unwrap();
            wait_for_commit(&documents, 1).await;
            documents
                .append_event(&event("e2", LOC_B, "2024-01-01T00:05:00Z"))
                .unwrap();
            wait_for_commit(&documents, 2).await;

            let summary = stop(running).await;
            assert_eq!(summary.dispatched, 2);
            wait_released(&documents).await;
        }

        // Appended while stopped, like the `ingest` command does.
        {
            let documents = open_store(&dir);
            documents
                .append_event(&event("e3", LOC_C, "2024-01-01T00:10:00Z"))
                .unwrap();
        }

        let documents = open_store(&dir);
        assert_eq!(committed(&documents).await, Some(ResumeToken(2)));

        let running = start(documents.clone(), sensors.clone());
        wait_for_commit(&documents, 3).await;
        let summary = stop(running).await;

        assert_eq!(summary.dispatched, 1);
        let trail = documents.find_by_item(ITEM).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[1].window.prev_location, LOC_B);
        assert_eq!(trail[1].window.present_location, LOC_C);
    }
}
