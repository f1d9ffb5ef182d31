//! # Pipeline Flows Against HTTP Stores
//!
//! Runs the pipeline with the InfluxDB and HTTP ledger adapters pointed at
//! mock servers. Event records and the audit log stay in memory.
//!
//! ## Flows
//!
//! 1. Transit window hashed, anchored, written back as line protocol
//! 2. Ledger outage: digest still written back, later re-anchored
//! 3. Time-series outage: run fails as transient, ledger never called
//! 4. Verification reads the window back and recomputes the digest

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anchor_pipeline::adapters::{
        AnchorEncoding, HttpLedgerAnchor, InMemoryAuditStore, InMemoryEventStore, InfluxSchema,
        InfluxSensorStore, InfluxSettings,
    };
    use anchor_pipeline::{
        AnchorPipeline, AnchorPipelineApi, AuditStore, ErrorClass, PipelineConfig,
        PipelineDependencies, RetryPolicy, RunOutcome, Verification,
    };
    use mockito::{Matcher, Server};
    use shared_types::AnchorStatus;

    use crate::fixtures::{event, LOC_A, LOC_B, TRANSIT_DIGEST};

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    const WINDOW_ROWS: &str = r#"{"results":[{"statement_id":0,"series":[{"name":"env",
        "columns":["time","bizLocation","humid","sID","sName","temp"],
        "values":[
          ["2024-01-01T00:01:00Z","urn:epc:id:sgln:A",40.25,"s-1","Bosch",21.5],
          ["2024-01-01T00:02:00Z","urn:epc:id:sgln:A",41,"s-1","Bosch",21.75],
          ["2024-01-01T00:04:00Z","urn:epc:id:sgln:B",38.5,"s-2","Sensirion",-3.125]
        ]}]}]}"#;

    struct Stack {
        influx: mockito::ServerGuard,
        ledger: mockito::ServerGuard,
        events: Arc<InMemoryEventStore>,
        audit: Arc<InMemoryAuditStore>,
        pipeline: AnchorPipeline,
    }

    async fn stack() -> Stack {
        let influx = Server::new_async().await;
        let ledger = Server::new_async().await;

        let sensors = InfluxSensorStore::new(InfluxSettings {
            url: influx.url(),
            database: "sensors".into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(2),
            schema: InfluxSchema::default(),
        })
        .unwrap();
        let anchor = HttpLedgerAnchor::new(
            format!("{}/anchor", ledger.url()),
            Duration::from_secs(2),
            AnchorEncoding::Form,
        )
        .unwrap();

        let events = Arc::new(InMemoryEventStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let deps = PipelineDependencies::new(
            events.clone(),
            Arc::new(sensors),
            audit.clone(),
            Arc::new(anchor),
        );
        let pipeline = AnchorPipeline::new(
            deps,
            PipelineConfig {
                anchor_retry: RetryPolicy {
                    max_attempts: 2,
                    initial_backoff: Duration::from_millis(10),
                    max_backoff: Duration::from_millis(10),
                },
            },
        );

        Stack {
            influx,
            ledger,
            events,
            audit,
            pipeline,
        }
    }

    fn seed_transit(stack: &Stack) -> shared_types::EventRecord {
        stack
            .events
            .insert(event("e1", LOC_A, "2024-01-01T00:00:00.000Z"));
        let current = event("e2", LOC_B, "2024-01-01T00:05:00.000Z");
        stack.events.insert(current.clone());
        current
    }

    fn stamped_write_body() -> Matcher {
        Matcher::AllOf(vec![
            Matcher::Regex(format!(r#"hash="{TRANSIT_DIGEST}""#)),
            Matcher::Regex(r"^[^\n]+\n[^\n]+\n[^\n]+$".into()),
        ])
    }

    // =========================================================================
    // FLOWS
    // =========================================================================

    #[tokio::test]
    async fn test_transit_window_anchored_and_written_back() {
        let mut s = stack().await;
        let current = seed_transit(&s);

        let query = s
            .influx
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("db".into(), "sensors".into()))
            .with_status(200)
            .with_body(WINDOW_ROWS)
            .create_async()
            .await;
        let write = s
            .influx
            .mock("POST", "/write")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("db".into(), "sensors".into()),
                Matcher::UrlEncoded("precision".into(), "ns".into()),
            ]))
            .match_body(stamped_write_body())
            .with_status(204)
            .create_async()
            .await;
        let anchor = s
            .ledger
            .mock("POST", "/anchor")
            .match_body(Matcher::UrlEncoded("hash".into(), TRANSIT_DIGEST.into()))
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        let report = s.pipeline.run(&current).await;

        query.assert_async().await;
        anchor.assert_async().await;
        write.assert_async().await;
        assert_eq!(report.digest().map(|d| d.to_hex()).as_deref(), Some(TRANSIT_DIGEST));

        let records = s.audit.scan().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].anchor_status, AnchorStatus::Anchored);
        assert_eq!(records[0].window.prev_location, LOC_A);
        assert_eq!(records[0].window.present_location, LOC_B);
    }

    #[tokio::test]
    async fn test_ledger_outage_then_reanchor() {
        let mut s = stack().await;
        let current = seed_transit(&s);

        s.influx
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(WINDOW_ROWS)
            .create_async()
            .await;
        let write = s
            .influx
            .mock("POST", "/write")
            .match_query(Matcher::Any)
            .match_body(stamped_write_body())
            .with_status(204)
            .create_async()
            .await;
        let outage = s
            .ledger
            .mock("POST", "/anchor")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let report = s.pipeline.run(&current).await;

        outage.assert_async().await;
        write.assert_async().await;
        match &report.outcome {
            RunOutcome::WrittenBack { anchor_status, .. } => {
                assert_eq!(*anchor_status, AnchorStatus::Skipped)
            }
            other => panic!("expected writeback, got {other:?}"),
        }

        outage.remove_async().await;
        let recovered = s
            .ledger
            .mock("POST", "/anchor")
            .match_body(Matcher::UrlEncoded("hash".into(), TRANSIT_DIGEST.into()))
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        let summary = s.pipeline.reanchor_pending().await.unwrap();
        recovered.assert_async().await;
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.anchored, 1);

        let trail = s.pipeline.audit_trail(&current.item_id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].anchor_status, AnchorStatus::Anchored);
        assert_eq!(s.pipeline.reanchor_pending().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_time_series_outage_is_transient_failure() {
        let mut s = stack().await;
        let current = seed_transit(&s);

        s.influx
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;
        let anchor = s
            .ledger
            .mock("POST", "/anchor")
            .expect(0)
            .create_async()
            .await;

        let report = s.pipeline.run(&current).await;

        anchor.assert_async().await;
        match &report.outcome {
            RunOutcome::Failed { error, .. } => assert_eq!(error.class(), ErrorClass::Transient),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(s.audit.is_empty());
    }

    #[tokio::test]
    async fn test_verify_reads_window_back() {
        let mut s = stack().await;
        let current = seed_transit(&s);

        s.influx
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(WINDOW_ROWS)
            .create_async()
            .await;
        s.influx
            .mock("POST", "/write")
            .match_query(Matcher::Any)
            .with_status(204)
            .create_async()
            .await;
        s.ledger
            .mock("POST", "/anchor")
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        s.pipeline.run(&current).await;
        let record = s.audit.scan().await.unwrap().remove(0);

        let verification = s.pipeline.verify(&record).await.unwrap();
        assert_eq!(verification, Verification::Intact { readings: 3 });
    }
}
