//! Search lifecycle state machine.
//!
//! [`SearchLifecycle`] is the single owner of UI-facing search state. Every
//! inbound UI event and every network completion goes through it, and each
//! call either performs a full transition or leaves the prior state in
//! place.

use shared::domain::{Generation, SearchOutcome};
use tracing::{debug, info, warn};

use crate::{
    error::SelectionError,
    preview::PreviewRef,
    search_client::ImageUpload,
    selection::{CandidateFile, SelectionManager},
};

pub const INVALID_FILE_TYPE_MESSAGE: &str = "unsupported file type";
pub const NETWORK_FAILURE_MESSAGE: &str = "Failed to fetch results. Ensure backend is running.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidFileType,
    NetworkFailure,
    ValidationFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    kind: FailureKind,
    message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NetworkFailure, message)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&SelectionError> for Failure {
    fn from(err: &SelectionError) -> Self {
        match err {
            SelectionError::InvalidFileType { .. } => {
                Self::new(FailureKind::InvalidFileType, INVALID_FILE_TYPE_MESSAGE)
            }
            SelectionError::TooLarge { .. } | SelectionError::Preview(_) => {
                Self::new(FailureKind::ValidationFailure, err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Ready,
    InFlight,
    Succeeded(SearchOutcome),
    Failed(Failure),
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::InFlight => "in_flight",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
        }
    }

    pub fn outcome(&self) -> Option<&SearchOutcome> {
        match self {
            Self::Succeeded(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }
}

/// Inbound events accepted from the UI layer and from the request driver.
#[derive(Debug)]
pub enum LifecycleEvent {
    PickerSelected(CandidateFile),
    Dropped(Vec<CandidateFile>),
    SubmitRequested,
    RequestResolved {
        generation: Generation,
        outcome: SearchOutcome,
    },
    RequestFailed {
        generation: Generation,
        reason: String,
    },
    ResetRequested,
    DragEnter,
    DragLeave,
}

/// The one outbound request a submit is allowed to issue.
#[derive(Debug, Clone)]
pub struct SubmitTicket {
    pub generation: Generation,
    pub upload: ImageUpload,
}

/// What the rendering layer sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub state: LifecycleState,
    pub preview: Option<PreviewRef>,
    pub drag_active: bool,
}

impl LifecycleSnapshot {
    /// Pick/drop input is disabled while a request is outstanding.
    pub fn accepts_input(&self) -> bool {
        !matches!(self.state, LifecycleState::InFlight)
    }
}

pub struct SearchLifecycle {
    selection: SelectionManager,
    state: LifecycleState,
    generation: Generation,
    outstanding: Option<Generation>,
}

impl SearchLifecycle {
    pub fn new(selection: SelectionManager) -> Self {
        Self {
            selection,
            state: LifecycleState::Idle,
            generation: Generation(0),
            outstanding: None,
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    pub fn outstanding(&self) -> Option<Generation> {
        self.outstanding
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            state: self.state.clone(),
            preview: self.selection.current().map(|s| s.preview().clone()),
            drag_active: self.selection.is_drag_active(),
        }
    }

    /// Applies one event. Only `SubmitRequested` can yield a ticket.
    pub fn apply(&mut self, event: LifecycleEvent) -> Option<SubmitTicket> {
        match event {
            LifecycleEvent::PickerSelected(file) => {
                let _ = self.select_from_picker(file);
                None
            }
            LifecycleEvent::Dropped(files) => {
                let _ = self.select_from_drop(files);
                None
            }
            LifecycleEvent::SubmitRequested => self.submit(),
            LifecycleEvent::RequestResolved {
                generation,
                outcome,
            } => {
                self.resolve(generation, outcome);
                None
            }
            LifecycleEvent::RequestFailed { generation, reason } => {
                self.fail(generation, reason);
                None
            }
            LifecycleEvent::ResetRequested => {
                self.reset();
                None
            }
            LifecycleEvent::DragEnter => {
                if self.outstanding.is_some() {
                    debug!("lifecycle: drag ignored while in flight");
                } else {
                    self.selection.drag_enter();
                }
                None
            }
            LifecycleEvent::DragLeave => {
                self.selection.drag_leave();
                None
            }
        }
    }

    pub fn select_from_picker(&mut self, file: CandidateFile) -> Result<(), SelectionError> {
        let result = self.selection.select_from_picker(file).map(|_| ());
        self.after_selection(result)
    }

    pub fn select_from_drop(&mut self, files: Vec<CandidateFile>) -> Result<(), SelectionError> {
        let result = self.selection.select_from_drop(files).map(|_| ());
        self.after_selection(result)
    }

    fn after_selection(&mut self, result: Result<(), SelectionError>) -> Result<(), SelectionError> {
        match &result {
            Ok(()) => {
                if let Some(superseded) = self.outstanding.take() {
                    info!(
                        generation = superseded.0,
                        "lifecycle: new selection supersedes outstanding request"
                    );
                }
                self.transition(LifecycleState::Ready);
            }
            Err(err) if self.outstanding.is_some() => {
                debug!("lifecycle: rejected selection ignored while in flight: {err}");
            }
            Err(err) => {
                self.transition(LifecycleState::Failed(Failure::from(err)));
            }
        }
        result
    }

    /// Honored only from `Ready`; anything else is a no-op.
    pub fn submit(&mut self) -> Option<SubmitTicket> {
        if !matches!(self.state, LifecycleState::Ready) {
            debug!(state = self.state.name(), "lifecycle: submit ignored");
            return None;
        }
        let selection = self.selection.current()?;
        let upload = ImageUpload {
            file_name: selection.file_name.clone(),
            media_type: selection.media_type.clone(),
            bytes: selection.raw_payload.clone(),
        };

        self.generation = self.generation.next();
        self.outstanding = Some(self.generation);
        self.selection.drag_leave();
        self.transition(LifecycleState::InFlight);
        Some(SubmitTicket {
            generation: self.generation,
            upload,
        })
    }

    /// Returns `false` when the resolution is stale and was discarded.
    pub fn resolve(&mut self, generation: Generation, outcome: SearchOutcome) -> bool {
        if !self.take_outstanding(generation) {
            return false;
        }
        debug!(
            generation = generation.0,
            matches = outcome.matches.len(),
            status_messages = outcome.status_messages.len(),
            "lifecycle: request resolved"
        );
        self.transition(LifecycleState::Succeeded(outcome));
        true
    }

    /// Returns `false` when the failure is stale and was discarded.
    pub fn fail(&mut self, generation: Generation, reason: impl Into<String>) -> bool {
        if !self.take_outstanding(generation) {
            return false;
        }
        let reason = reason.into();
        warn!(generation = generation.0, "lifecycle: request failed: {reason}");
        self.transition(LifecycleState::Failed(Failure::network(reason)));
        true
    }

    fn take_outstanding(&mut self, generation: Generation) -> bool {
        if self.outstanding == Some(generation) {
            self.outstanding = None;
            true
        } else {
            info!(
                generation = generation.0,
                outstanding = ?self.outstanding.map(|g| g.0),
                "lifecycle: discarding stale response"
            );
            false
        }
    }

    pub fn reset(&mut self) {
        self.outstanding = None;
        self.selection.release();
        self.selection.drag_leave();
        self.transition(LifecycleState::Idle);
    }

    fn transition(&mut self, next: LifecycleState) {
        debug!(from = self.state.name(), to = next.name(), "lifecycle: transition");
        self.state = next;
    }
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
