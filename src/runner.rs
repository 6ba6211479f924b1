//! Drives a [`Session`] against real collaborators.
//!
//! The `Controller` owns the session, the capture provider and the analysis
//! client. User intents go in through [`Controller::handle`]; the effects the
//! state machine asks for (open the camera, start an analysis) are carried
//! out here. Analyses run on spawned Tokio tasks and report back through a
//! channel, so the caller's loop stays responsive while a request is in
//! flight and can still reset the session.
//!
//! The camera lease is held only while the session is in `Capturing`.
//! Opening the device and shooting block (device ioctls, warm-up frames,
//! decoding and re-encoding), so they run on Tokio's blocking pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task;
use tracing::{Instrument, debug, info_span};

use crate::analysis::{AnalysisClient, AnalysisResult};
use crate::capture::{CaptureError, CaptureLease, CaptureProvider, CaptureResult};
use crate::payload::MediaType;
use crate::session::{AnalysisTicket, Effect, Event, Phase, Session, TransitionError, transition};

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Open the camera screen
    Start,
    /// Take the photo
    Shoot,
    /// Try the camera again after a failure
    RetryCamera,
    /// Leave the camera screen
    Cancel,
    /// New scan / retry / abandon
    Reset,
}

impl Intent {
    fn name(self) -> &'static str {
        match self {
            Intent::Start => "start",
            Intent::Shoot => "shoot",
            Intent::RetryCamera => "retry_camera",
            Intent::Cancel => "cancel",
            Intent::Reset => "reset",
        }
    }
}

/// Outcome of one analysis task
#[derive(Debug)]
pub struct Completion {
    pub attempt: u64,
    pub result: AnalysisResult<String>,
}

pub struct Controller {
    session: Session,
    provider: Arc<Mutex<Box<dyn CaptureProvider>>>,
    source: String,
    analyzer: Arc<dyn AnalysisClient>,
    lease: Option<CaptureLease>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl Controller {
    pub fn new(provider: Box<dyn CaptureProvider>, analyzer: Arc<dyn AnalysisClient>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            session: Session::new(),
            source: provider.source_type().to_string(),
            provider: Arc::new(Mutex::new(provider)),
            analyzer,
            lease: None,
            completions_tx,
            completions_rx,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether a camera is currently held
    pub fn camera_open(&self) -> bool {
        self.lease.is_some()
    }

    /// Description of the held camera, for the capturing screen
    pub fn camera_description(&self) -> Option<String> {
        self.lease.as_ref().map(CaptureLease::description)
    }

    pub fn source_type(&self) -> &str {
        &self.source
    }

    /// Apply a user intent.
    ///
    /// Must be called from within a Tokio runtime: camera work goes to the
    /// blocking pool and a successful shot spawns the analysis task.
    pub async fn handle(&mut self, intent: Intent) -> Result<(), TransitionError> {
        debug!(intent = intent.name(), phase = %self.session.phase(), "intent");
        match intent {
            Intent::Start => self.apply(Event::StartCapture).await,
            Intent::Shoot => self.shoot().await,
            Intent::RetryCamera => self.apply(Event::RetryCapture).await,
            Intent::Cancel => self.apply(Event::Cancel).await,
            Intent::Reset => self.apply(Event::Reset).await,
        }
    }

    /// Wait for the next analysis outcome, current or stale
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.completions_rx.recv().await
    }

    /// Feed an analysis outcome into the session.
    ///
    /// Returns `false` when it belonged to an abandoned attempt and was dropped.
    pub fn complete(&mut self, completion: Completion) -> bool {
        let Completion { attempt, result } = completion;
        let event = match result {
            Ok(text) => Event::AnalysisSucceeded { attempt, text },
            Err(error) => Event::AnalysisFailed { attempt, error },
        };
        match transition(&mut self.session, event) {
            Ok(Effect::Discarded) => false,
            Ok(_) => {
                self.release_unless_capturing();
                true
            }
            // Completions are accepted in every phase
            Err(err) => {
                debug!(error = %err, "completion rejected");
                false
            }
        }
    }

    /// Wait until the current analysis (if any) has landed
    pub async fn settle(&mut self) -> &Session {
        while self.session.phase() == Phase::Processing {
            match self.next_completion().await {
                Some(completion) => {
                    self.complete(completion);
                }
                None => break,
            }
        }
        &self.session
    }

    /// One full pass: open the camera, shoot, wait for the answer
    pub async fn scan(&mut self) -> Result<ScanReport, TransitionError> {
        self.handle(Intent::Start).await?;
        if self.session.capture_fault().is_none() {
            self.handle(Intent::Shoot).await?;
        }
        self.settle().await;
        let report = ScanReport::from_session(&self.session);
        // Leave the camera screen if the shot never happened
        if self.session.phase() == Phase::Capturing {
            self.handle(Intent::Cancel).await?;
        }
        Ok(report)
    }

    async fn shoot(&mut self) -> Result<(), TransitionError> {
        let phase = self.session.phase();
        let Some(mut lease) = self.lease.take_if(|_| phase == Phase::Capturing) else {
            return Err(TransitionError {
                phase,
                event: Intent::Shoot.name(),
            });
        };
        let shot = task::spawn_blocking(move || {
            let result = lease.capture();
            (lease, result)
        })
        .await;
        let result = match shot {
            Ok((lease, result)) => {
                self.lease = Some(lease);
                result
            }
            Err(err) => Err(CaptureError::Frame(format!("capture task failed: {}", err))),
        };
        let event = match result {
            Ok(image) => Event::CaptureSucceeded(image),
            Err(error) => Event::CaptureFailed(error),
        };
        self.apply(event).await
    }

    async fn apply(&mut self, event: Event) -> Result<(), TransitionError> {
        match transition(&mut self.session, event)? {
            Effect::AcquireCamera => self.acquire_camera().await?,
            Effect::Analyze(ticket) => self.spawn_analysis(ticket),
            Effect::Nothing | Effect::Discarded => {}
        }
        self.release_unless_capturing();
        Ok(())
    }

    async fn acquire_camera(&mut self) -> Result<(), TransitionError> {
        // Never hold two leases on the same device
        self.lease = None;
        match self.open_device().await {
            Ok(lease) => {
                self.lease = Some(lease);
                Ok(())
            }
            Err(error) => transition(&mut self.session, Event::CaptureFailed(error)).map(|_| ()),
        }
    }

    async fn open_device(&self) -> CaptureResult<CaptureLease> {
        let provider = Arc::clone(&self.provider);
        task::spawn_blocking(move || {
            let mut provider = provider
                .lock()
                .map_err(|_| CaptureError::Unavailable("capture provider poisoned".to_string()))?;
            provider.acquire()
        })
        .await
        .map_err(|err| CaptureError::Unavailable(format!("camera task failed: {}", err)))?
    }

    fn spawn_analysis(&self, ticket: AnalysisTicket) {
        let analyzer = Arc::clone(&self.analyzer);
        let tx = self.completions_tx.clone();
        let span = info_span!("analysis", attempt = ticket.attempt);
        tokio::spawn(
            async move {
                let result = analyzer.analyze(&ticket.image).await;
                if tx
                    .send(Completion {
                        attempt: ticket.attempt,
                        result,
                    })
                    .is_err()
                {
                    debug!("controller gone, dropping analysis outcome");
                }
            }
            .instrument(span),
        );
    }

    fn release_unless_capturing(&mut self) {
        if self.session.phase() != Phase::Capturing {
            self.lease = None;
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("session", &self.session)
            .field("source", &self.source)
            .field("lease", &self.lease)
            .finish()
    }
}

/// Summary of a finished scan, printed by `solve --json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Whether an answer was produced
    pub success: bool,

    /// Phase the session ended in
    pub phase: Phase,

    /// Answer text (Result phase only)
    pub answer: Option<String>,

    /// User-facing error message, analysis or camera
    pub error: Option<String>,

    pub media_type: Option<MediaType>,

    /// Size of the photo that was sent
    pub image_bytes: Option<usize>,

    pub answered_at: Option<DateTime<Utc>>,
}

impl ScanReport {
    pub fn from_session(session: &Session) -> Self {
        let image = session.captured_image();
        Self {
            success: session.phase() == Phase::Result,
            phase: session.phase(),
            answer: session.solution_text().map(str::to_string),
            error: session
                .error_message()
                .or(session.capture_fault())
                .map(str::to_string),
            media_type: image.map(|i| i.media_type()),
            image_bytes: image.map(|i| i.len()),
            answered_at: session.solution().map(|s| s.produced_at),
        }
    }
}
