//! # Feed Dispatcher
//!
//! Drives the pipeline from the change feed with a bounded worker pool.
//!
//! ```text
//! ChangeStream ──→ permit? ──→ JoinSet task ──→ AnchorPipeline::run
//!                                   │
//!                     CompletionGuard (drop) ──→ AckWatermark ──→ ResumeTokenStore
//! ```
//!
//! - At most `max_concurrent_runs` runs are in flight; the stream is not read
//!   while the pool is full.
//! - The resume position only moves past tokens whose runs have finished.
//! - On shutdown no new event is accepted. In-flight runs get
//!   `shutdown_timeout` to finish, then are aborted. Aborted runs are not
//!   acknowledged and are delivered again on the next start.

use std::sync::Arc;
use std::time::Duration;

use anchor_pipeline::{AnchorPipelineApi, RunOutcome, RunReport};
use anchor_telemetry::{
    metric_inc, time_histogram, FEED_EVENTS, PIPELINE_RUNS, READINGS_HASHED, RUNS_IN_FLIGHT, RUN_DURATION,
};
use shared_bus::{
    AckWatermark, ChangeFeed, ChangeFilter, FeedError, ResumeToken, ResumeTokenStore,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_concurrent_runs: usize,
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 8,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters reported when the dispatcher stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Runs started.
    pub dispatched: usize,
    /// Runs that returned a report, failed runs included.
    pub completed: usize,
    /// Runs that reported a failure or panicked.
    pub failed: usize,
    /// Feed entries whose document could not be decoded.
    pub malformed: usize,
    /// Other feed errors.
    pub feed_errors: usize,
    /// Runs aborted at the shutdown deadline.
    pub abandoned: usize,
    /// Resume position persisted last.
    pub committed: Option<ResumeToken>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to load resume token: {0}")]
    ResumeToken(#[source] FeedError),

    #[error("failed to open change feed: {0}")]
    Feed(#[source] FeedError),
}

/// Reports a token as finished when its run ends or panics. A run that is
/// aborted reports nothing.
struct CompletionGuard {
    token: ResumeToken,
    finished: bool,
    done: mpsc::UnboundedSender<ResumeToken>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.finished || std::thread::panicking() {
            let _ = self.done.send(self.token);
        }
    }
}

/// Per-invocation bookkeeping.
struct DispatchState {
    watermark: AckWatermark,
    summary: DispatchSummary,
}

impl DispatchState {
    fn on_joined(&mut self, joined: Result<RunReport, JoinError>) {
        RUNS_IN_FLIGHT.dec();
        match joined {
            Ok(report) => {
                metric_inc!(PIPELINE_RUNS, &[report.outcome.label()]);
                if let RunOutcome::WrittenBack { readings, .. } = &report.outcome {
                    READINGS_HASHED.inc_by(*readings as f64);
                }
                self.summary.completed += 1;
                if report.is_failure() {
                    self.summary.failed += 1;
                }
            }
            Err(e) if e.is_panic() => {
                error!(error = %e, "pipeline run panicked");
                metric_inc!(PIPELINE_RUNS, &["panicked"]);
                self.summary.failed += 1;
            }
            Err(_) => {
                self.summary.abandoned += 1;
            }
        }
    }
}

/// Consumes the change feed and runs the pipeline per inserted event.
pub struct FeedDispatcher {
    pipeline: Arc<dyn AnchorPipelineApi>,
    feed: Arc<dyn ChangeFeed>,
    tokens: Arc<dyn ResumeTokenStore>,
    config: DispatcherConfig,
}

impl FeedDispatcher {
    pub fn new(
        pipeline: Arc<dyn AnchorPipelineApi>,
        feed: Arc<dyn ChangeFeed>,
        tokens: Arc<dyn ResumeTokenStore>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            pipeline,
            feed,
            tokens,
            config,
        }
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped), or the
    /// feed closes and every run has finished.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<DispatchSummary, DispatchError> {
        let resume_after = self.tokens.load().await.map_err(DispatchError::ResumeToken)?;
        let mut stream = self
            .feed
            .watch(ChangeFilter::inserts(), resume_after)
            .await
            .map_err(DispatchError::Feed)?;

        info!(
            resume_after = ?resume_after,
            max_concurrent_runs = self.config.max_concurrent_runs,
            "dispatcher started"
        );

        let mut state = DispatchState {
            watermark: AckWatermark::resuming_from(resume_after),
            summary: DispatchSummary::default(),
        };
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_runs.max(1)));
        let mut runs: JoinSet<RunReport> = JoinSet::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<ResumeToken>();
        let mut feed_open = true;

        loop {
            if *shutdown.borrow() {
                break;
            }
            if !feed_open && runs.is_empty() {
                // Completions of the last runs may still be queued.
                while let Ok(token) = done_rx.try_recv() {
                    state.watermark.complete(token);
                }
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                Some(token) = done_rx.recv() => {
                    state.watermark.complete(token);
                    self.commit(&mut state.watermark).await;
                }

                Some(joined) = runs.join_next(), if !runs.is_empty() => {
                    state.on_joined(joined);
                }

                next = stream.next(), if feed_open && permits.available_permits() > 0 => {
                    match next {
                        None => {
                            info!("change feed closed");
                            feed_open = false;
                        }
                        Some(Ok(change)) => {
                            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                                break;
                            };
                            let token = change.token;
                            state.watermark.begin(token);
                            state.summary.dispatched += 1;
                            metric_inc!(FEED_EVENTS, &["dispatched"]);
                            metric_inc!(RUNS_IN_FLIGHT);
                            debug!(token = %token, event_id = %change.document.event_id, "dispatching run");

                            let pipeline = Arc::clone(&self.pipeline);
                            let done = done_tx.clone();
                            runs.spawn(async move {
                                let _permit = permit;
                                let mut guard = CompletionGuard {
                                    token,
                                    finished: false,
                                    done,
                                };
                                let _timer = time_histogram!(RUN_DURATION);
                                let report = pipeline.run(&change.document).await;
                                guard.finished = true;
                                report
                            });
                        }
                        Some(Err(FeedError::Malformed { token, message })) => {
                            warn!(token = %token, error = %message, "skipping malformed feed document");
                            metric_inc!(FEED_EVENTS, &["malformed"]);
                            state.summary.malformed += 1;
                            state.watermark.skip(token);
                            self.commit(&mut state.watermark).await;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "change feed error");
                            metric_inc!(FEED_EVENTS, &["error"]);
                            state.summary.feed_errors += 1;
                        }
                    }
                }
            }
        }

        drop(stream);
        self.drain(&mut runs, &mut done_rx, &mut state).await;
        self.commit(&mut state.watermark).await;

        state.summary.committed = state.watermark.committed();
        info!(
            dispatched = state.summary.dispatched,
            completed = state.summary.completed,
            failed = state.summary.failed,
            malformed = state.summary.malformed,
            abandoned = state.summary.abandoned,
            committed = ?state.summary.committed,
            "dispatcher stopped"
        );
        Ok(state.summary)
    }

    /// Wait for in-flight runs up to the shutdown deadline, then abort the rest.
    async fn drain(
        &self,
        runs: &mut JoinSet<RunReport>,
        done_rx: &mut mpsc::UnboundedReceiver<ResumeToken>,
        state: &mut DispatchState,
    ) {
        if !runs.is_empty() {
            info!(in_flight = runs.len(), "draining in-flight runs");
        }

        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while let Some(joined) = runs.join_next().await {
                state.on_joined(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                in_flight = runs.len(),
                timeout = ?self.config.shutdown_timeout,
                "shutdown deadline reached, aborting runs"
            );
            runs.abort_all();
            while let Some(joined) = runs.join_next().await {
                state.on_joined(joined);
            }
        }

        while let Ok(token) = done_rx.try_recv() {
            state.watermark.complete(token);
        }
    }

    async fn commit(&self, watermark: &mut AckWatermark) {
        if let Some(token) = watermark.advance() {
            match self.tokens.save(token).await {
                Ok(()) => debug!(token = %token, "resume position committed"),
                Err(e) => warn!(token = %token, error = %e, "failed to persist resume position"),
            }
        }
    }
}
