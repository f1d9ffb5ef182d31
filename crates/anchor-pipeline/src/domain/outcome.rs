//! # Run Outcomes
//!
//! Stage results, the per-run state machine and the report each run returns.
//!
//! ```text
//! Received -> WindowResolved -> TelemetryFetched -> Anchored ------> WrittenBack -> Done
//!    |              |                  |          \-> AnchorSkipped -/
//!    |              |                  |
//!    +-> Done       +-> Done           +-----------------------------> Failed
//!   (first sighting) (no telemetry)      (any stage may fail)
//! ```

use shared_types::{AnchorStatus, AuditId, Digest, Window};

use super::errors::PipelineError;

/// Result of a stage that may legitimately have nothing to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage<T> {
    /// Continue with the produced value.
    Proceed(T),
    /// Stop the run cleanly.
    Skip(SkipReason),
}

impl<T> Stage<T> {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Stage<U> {
        match self {
            Self::Proceed(value) => Stage::Proceed(f(value)),
            Self::Skip(reason) => Stage::Skip(reason),
        }
    }
}

/// Why a run ended without anchoring anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No earlier event record exists for the item.
    FirstSighting,
    /// The window holds no readings.
    NoTelemetry,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstSighting => "first_sighting",
            Self::NoTelemetry => "no_telemetry",
        }
    }
}

/// States of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    WindowResolved,
    TelemetryFetched,
    Anchored,
    AnchorSkipped,
    WrittenBack,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::WindowResolved => "window_resolved",
            Self::TelemetryFetched => "telemetry_fetched",
            Self::Anchored => "anchored",
            Self::AnchorSkipped => "anchor_skipped",
            Self::WrittenBack => "written_back",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Received, WindowResolved | Done) => true,
            (WindowResolved, TelemetryFetched | Done) => true,
            (TelemetryFetched, Anchored | AnchorSkipped) => true,
            (Anchored | AnchorSkipped, WrittenBack) => true,
            (WrittenBack, Done) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of states a run passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTrace {
    states: Vec<PipelineState>,
}

impl StateTrace {
    pub fn new() -> Self {
        Self {
            states: vec![PipelineState::Received],
        }
    }

    pub fn current(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    /// Record a transition. Illegal transitions are ignored and logged.
    pub fn advance(&mut self, next: PipelineState) {
        let current = self.current();
        if current.can_transition_to(next) {
            self.states.push(next);
        } else {
            tracing::warn!(from = %current, to = %next, "ignoring illegal state transition");
        }
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }
}

impl Default for StateTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Ended cleanly without anchoring.
    Skipped(SkipReason),
    /// Digest written back and audit record persisted.
    WrittenBack {
        window: Window,
        digest: Digest,
        readings: usize,
        anchor_status: AnchorStatus,
        audit_id: AuditId,
    },
    /// Aborted. `stage` is the last state reached before the failure.
    Failed {
        stage: PipelineState,
        error: PipelineError,
    },
}

impl RunOutcome {
    /// Metric label for the outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped(reason) => reason.as_str(),
            Self::WrittenBack { .. } => "written_back",
            Self::Failed { .. } => "failed",
        }
    }
}

/// What one pipeline run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub item_id: String,
    pub event_id: String,
    pub trace: StateTrace,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn final_state(&self) -> PipelineState {
        self.trace.current()
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed { .. })
    }

    pub fn digest(&self) -> Option<&Digest> {
        match &self.outcome {
            RunOutcome::WrittenBack { digest, .. } => Some(digest),
            _ => None,
        }
    }
}
