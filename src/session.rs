//! The capture-to-answer session state machine.
//!
//! A single owned [`Session`] moves through five phases:
//!
//! ```text
//! Idle ──start──▶ Capturing ──shot──▶ Processing ──text──▶ Result
//!  ▲                 │  ▲                  │                 │
//!  └─────cancel──────┘  └─retry (fault)    └──failure──▶ Error
//!  ▲                                                         │
//!  └──────────────────────── reset (any phase) ◀─────────────┘
//! ```
//!
//! [`transition`] is the only way to change a session. It returns the
//! [`Effect`] the caller must carry out (open the camera, start an analysis)
//! and never performs I/O itself. Every analysis gets an attempt number;
//! completions for any other attempt, or arriving outside Processing, are
//! discarded so a late answer can never land in a newer flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisError;
use crate::capture::CaptureError;
use crate::messages;
use crate::payload::ImagePayload;

/// The discriminated state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Capturing,
    Processing,
    Result,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Capturing => "capturing",
            Phase::Processing => "processing",
            Phase::Result => "result",
            Phase::Error => "error",
        };
        f.write_str(name)
    }
}

/// An answer produced by the analysis service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// Answer text shown to the user (never empty)
    pub text: String,
    /// When the answer arrived
    pub produced_at: DateTime<Utc>,
}

/// Work order for one analysis attempt
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    pub attempt: u64,
    pub image: ImagePayload,
}

/// Inputs to the state machine: user intents and collaborator outcomes
#[derive(Debug)]
pub enum Event {
    /// User asks to take a photo
    StartCapture,
    /// The camera produced a still
    CaptureSucceeded(ImagePayload),
    /// The camera could not be opened or read
    CaptureFailed(CaptureError),
    /// User retries the camera after a failure
    RetryCapture,
    /// User leaves the camera screen
    Cancel,
    /// The analysis for `attempt` returned text (possibly empty)
    AnalysisSucceeded { attempt: u64, text: String },
    /// The analysis for `attempt` failed
    AnalysisFailed { attempt: u64, error: AnalysisError },
    /// User starts over (new scan, retry, or abandoning the current flow)
    Reset,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StartCapture => "start_capture",
            Event::CaptureSucceeded(_) => "capture_succeeded",
            Event::CaptureFailed(_) => "capture_failed",
            Event::RetryCapture => "retry_capture",
            Event::Cancel => "cancel",
            Event::AnalysisSucceeded { .. } => "analysis_succeeded",
            Event::AnalysisFailed { .. } => "analysis_failed",
            Event::Reset => "reset",
        }
    }
}

/// What the caller has to do after a transition
#[derive(Debug)]
pub enum Effect {
    Nothing,
    /// Open the camera for the capturing screen
    AcquireCamera,
    /// Run the analysis and report back with the ticket's attempt number
    Analyze(AnalysisTicket),
    /// The event was a stale analysis completion and changed nothing
    Discarded,
}

/// An event that has no meaning in the current phase
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{event} is not allowed while {phase}")]
pub struct TransitionError {
    pub phase: Phase,
    pub event: &'static str,
}

/// The single mutable unit of application state
#[derive(Debug, Clone)]
pub struct Session {
    phase: Phase,
    captured_image: Option<ImagePayload>,
    solution: Option<Solution>,
    error_message: Option<String>,
    capture_fault: Option<String>,
    /// Number of analyses ever started; survives resets
    attempt: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            captured_image: None,
            solution: None,
            error_message: None,
            capture_fault: None,
            attempt: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn captured_image(&self) -> Option<&ImagePayload> {
        self.captured_image.as_ref()
    }

    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    pub fn solution_text(&self) -> Option<&str> {
        self.solution.as_ref().map(|s| s.text.as_str())
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Camera failure shown on the capturing screen
    pub fn capture_fault(&self) -> Option<&str> {
        self.capture_fault.as_deref()
    }

    /// Attempt number of the most recent analysis
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Whether an analysis outcome for `attempt` would be applied right now
    pub fn awaits(&self, attempt: u64) -> bool {
        self.phase == Phase::Processing && attempt == self.attempt
    }

    /// Check the data/phase consistency rules
    pub fn invariant_holds(&self) -> bool {
        let solution_matches = self.solution.is_some() == (self.phase == Phase::Result);
        let error_matches = self.error_message.is_some() == (self.phase == Phase::Error);
        let fault_matches = self.capture_fault.is_none() || self.phase == Phase::Capturing;
        let image_matches = match self.phase {
            Phase::Idle | Phase::Capturing => self.captured_image.is_none(),
            Phase::Processing | Phase::Result | Phase::Error => self.captured_image.is_some(),
        };
        solution_matches && error_matches && fault_matches && image_matches
    }

    /// Back to the empty Idle form, keeping the attempt counter
    fn clear(&mut self) {
        *self = Session {
            attempt: self.attempt,
            ..Session::new()
        };
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Sessions compare on what the user can see; the attempt counter is bookkeeping.
impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.phase == other.phase
            && self.captured_image == other.captured_image
            && self.solution == other.solution
            && self.error_message == other.error_message
            && self.capture_fault == other.capture_fault
    }
}

impl Eq for Session {}

/// Apply one event to the session.
///
/// On `Err` the session is left exactly as it was.
pub fn transition(session: &mut Session, event: Event) -> Result<Effect, TransitionError> {
    let from = session.phase;

    let effect = match (from, event) {
        (Phase::Idle, Event::StartCapture) => {
            session.phase = Phase::Capturing;
            Effect::AcquireCamera
        }

        (Phase::Capturing, Event::CaptureSucceeded(image)) => {
            session.attempt += 1;
            session.captured_image = Some(image.clone());
            session.error_message = None;
            session.capture_fault = None;
            session.phase = Phase::Processing;
            Effect::Analyze(AnalysisTicket {
                attempt: session.attempt,
                image,
            })
        }

        (Phase::Capturing, Event::CaptureFailed(error)) => {
            warn!(error = %error, "camera unavailable");
            session.capture_fault = Some(error.user_message().to_string());
            Effect::Nothing
        }

        (Phase::Capturing, Event::RetryCapture) => {
            session.capture_fault = None;
            Effect::AcquireCamera
        }

        (Phase::Capturing, Event::Cancel) => {
            session.clear();
            Effect::Nothing
        }

        (Phase::Processing, Event::AnalysisSucceeded { attempt, text }) if attempt == session.attempt => {
            let text = text.trim();
            let text = if text.is_empty() {
                info!(attempt, "analysis returned no text, using fallback answer");
                messages::FALLBACK_ANSWER.to_string()
            } else {
                text.to_string()
            };
            session.solution = Some(Solution {
                text,
                produced_at: Utc::now(),
            });
            session.phase = Phase::Result;
            Effect::Nothing
        }

        (Phase::Processing, Event::AnalysisFailed { attempt, error }) if attempt == session.attempt => {
            warn!(attempt, error = %error, "analysis failed");
            session.error_message = Some(error.user_message().to_string());
            session.phase = Phase::Error;
            Effect::Nothing
        }

        (phase, Event::AnalysisSucceeded { attempt, .. }) => {
            debug!(attempt, current = session.attempt, %phase, "discarding stale analysis result");
            Effect::Discarded
        }

        (phase, Event::AnalysisFailed { attempt, error }) => {
            debug!(attempt, current = session.attempt, %phase, error = %error, "discarding stale analysis failure");
            Effect::Discarded
        }

        (_, Event::Reset) => {
            session.clear();
            Effect::Nothing
        }

        (phase, event) => {
            return Err(TransitionError {
                phase,
                event: event.name(),
            });
        }
    };

    if session.phase != from {
        info!(from = %from, to = %session.phase, "phase changed");
    }
    Ok(effect)
}
