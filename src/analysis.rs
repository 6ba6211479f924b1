//! Analysis client: one photo in, answer text out.
//!
//! The `AnalysisClient` trait is the seam the session controller talks to.
//! `GeminiClient` implements it against the Gemini `generateContent` REST API:
//! - one multimodal request per call (inline image + fixed instruction)
//! - low-temperature sampling so answers are extracted rather than rephrased
//! - no retry: a failed call is reported once and left to the user
//!
//! # Configuration
//!
//! Settings come from [`crate::config`] (`SNAP_SOLVE_API_KEY`, `SNAP_SOLVE_MODEL`,
//! `SNAP_SOLVE_ENDPOINT`, sampling and timeout variables). A missing API key is
//! reported by the first `analyze` call, not at construction.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{self, AnalysisSettings};
use crate::messages;
use crate::payload::{ImagePayload, PayloadError};

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Errors that can occur while analysing a photo.
///
/// The `Display` text is for logs. Users only ever see [`AnalysisError::user_message`].
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// No API key was configured
    #[error("no API credential configured (set SNAP_SOLVE_API_KEY)")]
    MissingCredential,
    /// The image cannot be sent as-is
    #[error("invalid image: {0}")]
    InvalidImage(#[from] PayloadError),
    /// Network, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The service answered with a non-success status (auth, quota, bad request...)
    #[error("service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    /// The service answered 2xx with a body we cannot read
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl AnalysisError {
    /// The single localized message shown for any analysis failure
    pub fn user_message(&self) -> &'static str {
        messages::ANALYSIS_FAILED
    }
}

/// Anything that can turn a photo of an exercise into answer text.
///
/// `Ok("")` means the service answered but found nothing; callers decide how
/// to present that. Implementations make at most one attempt per call.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(&self, image: &ImagePayload) -> AnalysisResult<String>;
}

/// Configuration for the Gemini client
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub settings: AnalysisSettings,
    /// Instruction sent with every image
    pub instruction: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            settings: config::get().analysis.clone(),
            instruction: messages::INSTRUCTION.to_string(),
        }
    }
}

impl GeminiConfig {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self {
            settings,
            instruction: messages::INSTRUCTION.to_string(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.settings.endpoint = endpoint.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.settings.model = model.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.settings.api_key = Some(api_key.into());
        self
    }

    pub fn request_timeout(mut self, seconds: u64) -> Self {
        self.settings.request_timeout = seconds;
        self
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    /// Set on reasoning parts of thinking models
    #[serde(default)]
    thought: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    candidates_token_count: Option<u32>,
}

/// Pull the answer out of a `generateContent` response body.
///
/// Text parts of the first candidate are concatenated, reasoning parts are
/// skipped. A readable body without any text yields `Ok("")`.
pub fn extract_answer(body: &str) -> AnalysisResult<String> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| AnalysisError::Malformed(e.to_string()))?;

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        warn!(reason, "prompt blocked by the service");
    }
    if let Some(usage) = &response.usage_metadata {
        debug!(
            prompt_tokens = ?usage.prompt_token_count,
            answer_tokens = ?usage.candidates_token_count,
            "token usage"
        );
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(String::new());
    };
    if let Some(reason) = &candidate.finish_reason {
        debug!(reason = %reason, "candidate finished");
    }

    let answer = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| part.thought != Some(true))
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();
    Ok(answer)
}

// ============================================================================
// Client
// ============================================================================

/// Client for the Gemini `generateContent` endpoint
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    http: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> AnalysisResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.settings.request_timeout))
            .connect_timeout(Duration::from_secs(config.settings.connect_timeout))
            .build()?;
        Ok(Self { config, http })
    }

    /// Client configured from the environment
    pub fn from_env() -> AnalysisResult<Self> {
        Self::new(GeminiConfig::default())
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.settings.endpoint.trim_end_matches('/'),
            self.config.settings.model
        )
    }

    fn request_body<'a>(&'a self, image: &ImagePayload) -> GenerateContentRequest<'a> {
        let settings = &self.config.settings;
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        inline_data: Some(InlineData {
                            mime_type: image.media_type().mime(),
                            data: image.to_base64(),
                        }),
                        text: None,
                    },
                    Part {
                        inline_data: None,
                        text: Some(&self.config.instruction),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: settings.temperature,
                top_p: settings.top_p,
                top_k: settings.top_k,
            },
        }
    }
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    async fn analyze(&self, image: &ImagePayload) -> AnalysisResult<String> {
        image.validate()?;
        let api_key = self
            .config
            .settings
            .api_key
            .as_deref()
            .ok_or(AnalysisError::MissingCredential)?;

        let url = self.url();
        info!(
            model = %self.config.settings.model,
            media_type = %image.media_type(),
            bytes = image.len(),
            "sending image for analysis"
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&self.request_body(image))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(%status, bytes = body.len(), "analysis response received");

        if !status.is_success() {
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        extract_answer(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::MediaType;
    use pretty_assertions::assert_eq;

    fn test_config() -> GeminiConfig {
        GeminiConfig::new(AnalysisSettings::defaults())
            .endpoint("http://localhost:9/v1beta/")
            .model("gemini-test")
            .api_key("test-key")
    }

    #[test]
    fn test_request_body_shape() {
        let client = GeminiClient::new(test_config()).unwrap();
        let image = ImagePayload::new(vec![0xFF, 0xD8, 0xFF, 0xE0], MediaType::Jpeg).unwrap();

        let body = serde_json::to_value(client.request_body(&image)).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "/9j/4A==");
        assert!(parts[0].get("text").is_none());
        assert_eq!(parts[1]["text"], messages::INSTRUCTION);
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(body["generationConfig"]["topK"], 40);
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let client = GeminiClient::new(test_config()).unwrap();
        assert_eq!(
            client.url(),
            "http://localhost:9/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn test_extract_answer_concatenates_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"1) 42\n"},{"text":"2) 7"}]},"finishReason":"STOP"}]}"#;
        assert_eq!(extract_answer(body).unwrap(), "1) 42\n2) 7");
    }

    #[test]
    fn test_extract_answer_skips_thoughts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"thinking...","thought":true},{"text":"42"}]}}]}"#;
        assert_eq!(extract_answer(body).unwrap(), "42");
    }

    #[test]
    fn test_extract_answer_empty_cases() {
        assert_eq!(extract_answer("{}").unwrap(), "");
        assert_eq!(extract_answer(r#"{"candidates":[]}"#).unwrap(), "");
        assert_eq!(
            extract_answer(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap(),
            ""
        );
        assert_eq!(
            extract_answer(r#"{"promptFeedback":{"blockReason":"OTHER"}}"#).unwrap(),
            ""
        );
    }

    #[test]
    fn test_extract_answer_malformed() {
        assert!(matches!(extract_answer("<html>oops</html>"), Err(AnalysisError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_missing_credential_reported_on_first_call() {
        let config = GeminiConfig::new(AnalysisSettings::defaults());
        let client = GeminiClient::new(config).unwrap();
        let image = ImagePayload::new(vec![0xFF, 0xD8, 0xFF], MediaType::Jpeg).unwrap();

        let err = client.analyze(&image).await.unwrap_err();
        assert!(matches!(err, AnalysisError::MissingCredential));
        assert_eq!(err.user_message(), messages::ANALYSIS_FAILED);
    }
}
