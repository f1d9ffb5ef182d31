//! # Anchor Pipeline Service
//!
//! Orchestrates one run per inserted event record:
//!
//! 1. Resolve the window from the item's predecessor event
//! 2. Fetch and canonicalize the window's telemetry
//! 3. Submit the digest to the ledger (bounded retry)
//! 4. Write the digest back onto the readings and append an audit record
//!
//! Runs share no mutable state. Every dependency is an `Arc<dyn Port>` so
//! one service instance can serve all worker tasks.

pub mod anchoring;
pub mod fetcher;
pub mod resolver;
pub mod writeback;

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{AnchorStatus, AuditRecord, EventRecord};
use tracing::Instrument;

use crate::domain::{
    dedup_audit_records, pending_anchors, PipelineError, PipelineState, RetryPolicy, RunOutcome,
    RunReport, Stage, StateTrace,
};
use crate::ports::{
    AnchorPipelineApi, AuditStore, Clock, EventStore, LedgerAnchor, ReanchorSummary, SensorStore,
    SystemClock, Verification,
};

use self::anchoring::{anchor, anchor_with_retry};
use self::writeback::{writeback, WritebackRequest};

/// Dependencies for [`AnchorPipeline`].
#[derive(Clone)]
pub struct PipelineDependencies {
    pub events: Arc<dyn EventStore>,
    pub sensors: Arc<dyn SensorStore>,
    pub audit: Arc<dyn AuditStore>,
    pub ledger: Arc<dyn LedgerAnchor>,
    pub clock: Arc<dyn Clock>,
}

impl PipelineDependencies {
    /// Dependencies using the wall clock.
    pub fn new(
        events: Arc<dyn EventStore>,
        sensors: Arc<dyn SensorStore>,
        audit: Arc<dyn AuditStore>,
        ledger: Arc<dyn LedgerAnchor>,
    ) -> Self {
        Self {
            events,
            sensors,
            audit,
            ledger,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Tunables of the pipeline itself.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub anchor_retry: RetryPolicy,
}

/// The anchoring pipeline.
pub struct AnchorPipeline {
    deps: PipelineDependencies,
    config: PipelineConfig,
}

impl AnchorPipeline {
    pub fn new(deps: PipelineDependencies, config: PipelineConfig) -> Self {
        Self { deps, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn execute(
        &self,
        event: &EventRecord,
        trace: &mut StateTrace,
    ) -> Result<RunOutcome, PipelineError> {
        let window = match resolver::resolve(self.deps.events.as_ref(), event).await? {
            Stage::Proceed(window) => window,
            Stage::Skip(reason) => {
                tracing::info!(reason = reason.as_str(), "no predecessor, nothing to anchor");
                trace.advance(PipelineState::Done);
                return Ok(RunOutcome::Skipped(reason));
            }
        };
        trace.advance(PipelineState::WindowResolved);
        tracing::debug!(
            from = %window.from_time_str(),
            to = %window.to_time_str(),
            prev = %window.prev_location,
            present = %window.present_location,
            "window resolved"
        );

        let fetched = match fetcher::fetch(self.deps.sensors.as_ref(), &window).await? {
            Stage::Proceed(fetched) => fetched,
            Stage::Skip(reason) => {
                tracing::info!(
                    from = %window.from_time_str(),
                    to = %window.to_time_str(),
                    "no telemetry in window"
                );
                trace.advance(PipelineState::Done);
                return Ok(RunOutcome::Skipped(reason));
            }
        };
        trace.advance(PipelineState::TelemetryFetched);

        let attempt = anchor_with_retry(
            self.deps.ledger.as_ref(),
            &fetched.digest,
            &self.config.anchor_retry,
        )
        .await;
        trace.advance(match attempt.status {
            AnchorStatus::Anchored => PipelineState::Anchored,
            AnchorStatus::Skipped => PipelineState::AnchorSkipped,
        });

        let audit_id = writeback(
            self.deps.sensors.as_ref(),
            self.deps.audit.as_ref(),
            self.deps.clock.as_ref(),
            WritebackRequest {
                item_id: &event.item_id,
                window: &window,
                readings: &fetched.readings,
                digest: &fetched.digest,
                anchor_status: attempt.status,
            },
        )
        .await?;
        trace.advance(PipelineState::WrittenBack);
        trace.advance(PipelineState::Done);

        tracing::info!(
            digest = %fetched.digest.short(),
            readings = fetched.readings.len(),
            anchor_status = ?attempt.status,
            audit_id = %audit_id,
            "window anchored and written back"
        );

        Ok(RunOutcome::WrittenBack {
            window,
            digest: fetched.digest,
            readings: fetched.readings.len(),
            anchor_status: attempt.status,
            audit_id,
        })
    }
}

#[async_trait]
impl AnchorPipelineApi for AnchorPipeline {
    async fn run(&self, event: &EventRecord) -> RunReport {
        let span = tracing::info_span!(
            "pipeline_run",
            item_id = %event.item_id,
            event_id = %event.event_id
        );

        async move {
            let mut trace = StateTrace::new();
            let outcome = match self.execute(event, &mut trace).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    let stage = trace.current();
                    tracing::error!(
                        stage = %stage,
                        class = ?error.class(),
                        kind = error.kind(),
                        %error,
                        "pipeline run failed"
                    );
                    trace.advance(PipelineState::Failed);
                    RunOutcome::Failed { stage, error }
                }
            };

            RunReport {
                item_id: event.item_id.clone(),
                event_id: event.event_id.clone(),
                trace,
                outcome,
            }
        }
        .instrument(span)
        .await
    }

    async fn verify(&self, record: &AuditRecord) -> Result<Verification, PipelineError> {
        let verification =
            match fetcher::fetch(self.deps.sensors.as_ref(), &record.window).await? {
                Stage::Skip(_) => Verification::Missing,
                Stage::Proceed(fetched) if fetched.digest == record.digest => {
                    Verification::Intact {
                        readings: fetched.readings.len(),
                    }
                }
                Stage::Proceed(fetched) => Verification::Tampered {
                    expected: record.digest,
                    actual: fetched.digest,
                },
            };

        tracing::info!(
            item_id = %record.item_id,
            digest = %record.digest.short(),
            result = ?verification,
            "audit record verified"
        );
        Ok(verification)
    }

    async fn reanchor_pending(&self) -> Result<ReanchorSummary, PipelineError> {
        let records = self
            .deps
            .audit
            .scan()
            .await
            .map_err(PipelineError::AuditRead)?;
        let pending = pending_anchors(&records);
        let mut summary = ReanchorSummary {
            pending: pending.len(),
            anchored: 0,
        };

        // One submission per digest; records still pending wait for the next pass.
        for record in pending {
            if !anchor(self.deps.ledger.as_ref(), &record.digest).await {
                continue;
            }

            let anchored = AuditRecord {
                anchor_status: AnchorStatus::Anchored,
                recorded_at: self.deps.clock.now(),
                ..record
            };
            self.deps
                .audit
                .insert(&anchored)
                .await
                .map_err(PipelineError::AuditInsert)?;
            summary.anchored += 1;
        }

        tracing::info!(
            pending = summary.pending,
            anchored = summary.anchored,
            "re-anchoring pass complete"
        );
        Ok(summary)
    }

    async fn audit_trail(&self, item_id: &str) -> Result<Vec<AuditRecord>, PipelineError> {
        let records = self
            .deps
            .audit
            .find_by_item(item_id)
            .await
            .map_err(PipelineError::AuditRead)?;
        Ok(dedup_audit_records(&records))
    }
}
