//! Snap Solve - photograph a homework exercise, get the final answers.
//!
//! This crate provides:
//! - A pure session state machine (Idle, Capturing, Processing, Result, Error)
//! - Scoped camera access with file, test-card and V4L2 providers
//! - A Gemini `generateContent` analysis client behind an async trait
//! - A controller that runs analyses on Tokio tasks and drops stale answers
//! - A crossterm terminal front end
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use snap_solve::analysis::GeminiClient;
//! use snap_solve::capture::StillImageProvider;
//! use snap_solve::runner::Controller;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = StillImageProvider::new("exercice.jpg");
//! let client = GeminiClient::from_env()?;
//! let mut controller = Controller::new(Box::new(provider), Arc::new(client));
//! let report = controller.scan().await?;
//! println!("{:?}", report.answer);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod capture;
pub mod config;
pub mod messages;
pub mod payload;
pub mod runner;
pub mod session;
pub mod shell;

// Re-export the state machine
pub use session::{AnalysisTicket, Effect, Event, Phase, Session, Solution, TransitionError, transition};

// Re-export the controller
pub use runner::{Completion, Controller, Intent, ScanReport};

// Re-export collaborator contracts
pub use analysis::{AnalysisClient, AnalysisError, AnalysisResult, GeminiClient, GeminiConfig};
pub use capture::{CaptureError, CaptureLease, CaptureProvider, CaptureResult, capture_once};
pub use payload::{ImagePayload, MediaType, PayloadError};
