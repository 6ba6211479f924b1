//! Controller flows against scripted cameras and analysis services

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tokio::sync::Semaphore;

use snap_solve::analysis::{AnalysisClient, AnalysisError, AnalysisResult};
use snap_solve::capture::{CaptureDevice, CaptureError, CaptureLease, CaptureProvider, CaptureResult};
use snap_solve::messages;
use snap_solve::payload::{ImagePayload, MediaType};
use snap_solve::runner::{Controller, Intent};
use snap_solve::session::{Phase, Session};

/// Camera that counts open devices and numbers its shots
struct ScriptedCamera {
    open: Arc<AtomicUsize>,
    shots: Arc<AtomicU8>,
    denials: usize,
}

impl ScriptedCamera {
    fn new(open: &Arc<AtomicUsize>) -> Self {
        Self {
            open: Arc::clone(open),
            shots: Arc::new(AtomicU8::new(0)),
            denials: 0,
        }
    }

    fn denying(open: &Arc<AtomicUsize>, denials: usize) -> Self {
        Self {
            denials,
            ..Self::new(open)
        }
    }
}

impl CaptureProvider for ScriptedCamera {
    fn acquire(&mut self) -> CaptureResult<CaptureLease> {
        if self.denials > 0 {
            self.denials -= 1;
            return Err(CaptureError::PermissionDenied("/dev/video0".to_string()));
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        let device = ScriptedDevice {
            open: Arc::clone(&self.open),
            shots: Arc::clone(&self.shots),
        };
        Ok(CaptureLease::new(self.source_type(), Box::new(device)))
    }

    fn source_type(&self) -> &str {
        "scripted"
    }
}

struct ScriptedDevice {
    open: Arc<AtomicUsize>,
    shots: Arc<AtomicU8>,
}

impl CaptureDevice for ScriptedDevice {
    fn capture(&mut self) -> CaptureResult<ImagePayload> {
        let shot = self.shots.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ImagePayload::new(vec![0xFF, 0xD8, 0xFF, shot], MediaType::Jpeg)?)
    }

    fn description(&self) -> String {
        "scripted camera".to_string()
    }
}

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Service that always gives the same reply
struct Canned(fn() -> AnalysisResult<String>);

#[async_trait]
impl AnalysisClient for Canned {
    async fn analyze(&self, _image: &ImagePayload) -> AnalysisResult<String> {
        (self.0)()
    }
}

/// Service that waits for a permit, then names the shot it was given
struct Gated(Arc<Semaphore>);

#[async_trait]
impl AnalysisClient for Gated {
    async fn analyze(&self, image: &ImagePayload) -> AnalysisResult<String> {
        let permit = self.0.acquire().await.map_err(|e| AnalysisError::Malformed(e.to_string()))?;
        permit.forget();
        Ok(format!("shot {}", image.data()[3]))
    }
}

fn answer_42() -> AnalysisResult<String> {
    Ok("42".to_string())
}

fn no_text() -> AnalysisResult<String> {
    Ok("  \n".to_string())
}

fn quota_exceeded() -> AnalysisResult<String> {
    Err(AnalysisError::Api {
        status: 429,
        body: "RESOURCE_EXHAUSTED".to_string(),
    })
}

fn controller(camera: ScriptedCamera, reply: fn() -> AnalysisResult<String>) -> Controller {
    Controller::new(Box::new(camera), Arc::new(Canned(reply)))
}

#[tokio::test]
async fn test_photo_to_answer() {
    let open = Arc::new(AtomicUsize::new(0));
    let mut controller = controller(ScriptedCamera::new(&open), answer_42);

    controller.handle(Intent::Start).await.unwrap();
    assert_eq!(controller.session().phase(), Phase::Capturing);
    assert_eq!(open.load(Ordering::SeqCst), 1);

    controller.handle(Intent::Shoot).await.unwrap();
    assert_eq!(controller.session().phase(), Phase::Processing);
    assert_eq!(open.load(Ordering::SeqCst), 0, "camera must be released once the photo is taken");
    assert!(controller.session().captured_image().is_some());

    let session = controller.settle().await;
    assert_eq!(session.phase(), Phase::Result);
    assert_eq!(session.solution_text(), Some("42"));
    assert!(session.invariant_holds());
}

#[tokio::test]
async fn test_empty_answer_shows_fallback() {
    let open = Arc::new(AtomicUsize::new(0));
    let mut controller = controller(ScriptedCamera::new(&open), no_text);

    let report = controller.scan().await.unwrap();
    assert!(report.success);
    assert_eq!(report.answer.as_deref(), Some(messages::FALLBACK_ANSWER));
}

#[tokio::test]
async fn test_service_failure_shows_generic_message() {
    let open = Arc::new(AtomicUsize::new(0));
    let mut controller = controller(ScriptedCamera::new(&open), quota_exceeded);

    controller.handle(Intent::Start).await.unwrap();
    controller.handle(Intent::Shoot).await.unwrap();
    let session = controller.settle().await;

    assert_eq!(session.phase(), Phase::Error);
    assert_eq!(session.error_message(), Some(messages::ANALYSIS_FAILED));
    assert!(session.solution().is_none());

    controller.handle(Intent::Reset).await.unwrap();
    assert_eq!(controller.session(), &Session::new());
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_camera_denied_then_retry() {
    let open = Arc::new(AtomicUsize::new(0));
    let mut controller = controller(ScriptedCamera::denying(&open, 1), answer_42);

    controller.handle(Intent::Start).await.unwrap();
    assert_eq!(controller.session().phase(), Phase::Capturing);
    assert_eq!(controller.session().capture_fault(), Some(messages::CAMERA_FAILED));
    assert!(!controller.camera_open());

    // No photo without a camera
    assert!(controller.handle(Intent::Shoot).await.is_err());
    assert_eq!(controller.session().phase(), Phase::Capturing);

    controller.handle(Intent::RetryCamera).await.unwrap();
    assert!(controller.session().capture_fault().is_none());
    assert_eq!(open.load(Ordering::SeqCst), 1);
    assert_eq!(controller.camera_description().as_deref(), Some("scripted camera"));

    controller.handle(Intent::Shoot).await.unwrap();
    assert_eq!(controller.settle().await.solution_text(), Some("42"));
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_releases_camera() {
    let open = Arc::new(AtomicUsize::new(0));
    let mut controller = controller(ScriptedCamera::new(&open), answer_42);

    controller.handle(Intent::Start).await.unwrap();
    assert_eq!(open.load(Ordering::SeqCst), 1);
    controller.handle(Intent::Cancel).await.unwrap();

    assert_eq!(controller.session(), &Session::new());
    assert_eq!(open.load(Ordering::SeqCst), 0);

    // Reset from the camera screen behaves like cancel
    controller.handle(Intent::Start).await.unwrap();
    controller.handle(Intent::Reset).await.unwrap();
    assert_eq!(controller.session(), &Session::new());
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_answer_after_reset_is_discarded() {
    let open = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let mut controller = Controller::new(
        Box::new(ScriptedCamera::new(&open)),
        Arc::new(Gated(Arc::clone(&gate))),
    );

    controller.handle(Intent::Start).await.unwrap();
    controller.handle(Intent::Shoot).await.unwrap();
    controller.handle(Intent::Reset).await.unwrap();
    assert_eq!(controller.session().phase(), Phase::Idle);

    gate.add_permits(1);
    let completion = controller.next_completion().await.unwrap();
    assert_eq!(completion.attempt, 1);
    assert!(!controller.complete(completion));
    assert_eq!(controller.session(), &Session::new());
}

#[tokio::test]
async fn test_abandoned_attempt_cannot_overwrite_new_one() {
    let open = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let mut controller = Controller::new(
        Box::new(ScriptedCamera::new(&open)),
        Arc::new(Gated(Arc::clone(&gate))),
    );

    controller.handle(Intent::Start).await.unwrap();
    controller.handle(Intent::Shoot).await.unwrap();
    controller.handle(Intent::Reset).await.unwrap();
    controller.handle(Intent::Start).await.unwrap();
    controller.handle(Intent::Shoot).await.unwrap();
    assert_eq!(controller.session().attempt(), 2);

    gate.add_permits(2);
    let mut applied = Vec::new();
    for _ in 0..2 {
        let completion = controller.next_completion().await.unwrap();
        let attempt = completion.attempt;
        if controller.complete(completion) {
            applied.push(attempt);
        }
    }

    assert_eq!(applied, vec![2]);
    assert_eq!(controller.session().phase(), Phase::Result);
    assert_eq!(controller.session().solution_text(), Some("shot 2"));
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_start_rejected_while_processing() {
    let open = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let mut controller = Controller::new(
        Box::new(ScriptedCamera::new(&open)),
        Arc::new(Gated(Arc::clone(&gate))),
    );

    controller.handle(Intent::Start).await.unwrap();
    controller.handle(Intent::Shoot).await.unwrap();
    assert!(controller.handle(Intent::Start).await.is_err());
    assert!(controller.handle(Intent::Shoot).await.is_err());
    assert_eq!(open.load(Ordering::SeqCst), 0);

    gate.add_permits(1);
    assert_eq!(controller.settle().await.solution_text(), Some("shot 1"));
}
