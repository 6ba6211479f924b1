//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for Snap Solve, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults for the hosted Gemini service
//! - Lookup-based construction so parsing can be tested without touching the environment
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SNAP_SOLVE_API_KEY` | Analysis service credential (also `GEMINI_API_KEY`, `API_KEY`) | none |
//! | `SNAP_SOLVE_ENDPOINT` | API base URL | `https://generativelanguage.googleapis.com/v1beta` |
//! | `SNAP_SOLVE_MODEL` | Model identifier | `gemini-3-flash-preview` |
//! | `SNAP_SOLVE_TEMPERATURE` | Sampling temperature | `0.1` |
//! | `SNAP_SOLVE_TOP_P` | Nucleus sampling | `0.95` |
//! | `SNAP_SOLVE_TOP_K` | Top-k sampling | `40` |
//! | `SNAP_SOLVE_TIMEOUT` | Request timeout in seconds | `60` |
//! | `SNAP_SOLVE_CONNECT_TIMEOUT` | Connection timeout in seconds | `10` |
//! | `SNAP_SOLVE_CAMERA` | V4L2 device index | `0` |
//! | `SNAP_SOLVE_RESOLUTION` | Capture resolution | `hd` |
//! | `SNAP_SOLVE_JPEG_QUALITY` | JPEG quality (1-100) | `80` |
//! | `SNAP_SOLVE_WARMUP_FRAMES` | Frames dropped before the still | `5` |
//! | `SNAP_SOLVE_LOG_FILE` | Log file used by the terminal UI | none |
//!
//! # Example
//!
//! ```bash
//! export SNAP_SOLVE_API_KEY="..."
//! export SNAP_SOLVE_MODEL="gemini-2.5-flash"
//! export SNAP_SOLVE_RESOLUTION="1920x1080"
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default analysis API base URL
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model identifier
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Default sampling temperature (near-deterministic)
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Default nucleus sampling threshold
pub const DEFAULT_TOP_P: f32 = 0.95;

/// Default top-k sampling
pub const DEFAULT_TOP_K: u32 = 40;

/// Default request timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 60;

/// Default connection timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Default camera device index (/dev/video0)
pub const DEFAULT_CAMERA_INDEX: u32 = 0;

/// Default capture resolution preset
pub const DEFAULT_RESOLUTION: &str = "hd";

/// Default capture width (pixels)
pub const DEFAULT_FRAME_WIDTH: u32 = 1280;

/// Default capture height (pixels)
pub const DEFAULT_FRAME_HEIGHT: u32 = 720;

/// Largest accepted frame side in pixels; anything above falls back to the default
pub const MAX_FRAME_SIDE: u32 = 8192;

/// Default JPEG quality for captured stills
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Default number of frames discarded while the sensor settles
pub const DEFAULT_WARMUP_FRAMES: u32 = 5;

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the API credential
pub const ENV_API_KEY: &str = "SNAP_SOLVE_API_KEY";

/// Credential variable understood by other Gemini tooling
pub const ENV_API_KEY_GEMINI: &str = "GEMINI_API_KEY";

/// Bare credential variable used by the web version of the app
pub const ENV_API_KEY_LEGACY: &str = "API_KEY";

/// Environment variable for the API base URL
pub const ENV_ENDPOINT: &str = "SNAP_SOLVE_ENDPOINT";

/// Environment variable for the model identifier
pub const ENV_MODEL: &str = "SNAP_SOLVE_MODEL";

/// Environment variable for the sampling temperature
pub const ENV_TEMPERATURE: &str = "SNAP_SOLVE_TEMPERATURE";

/// Environment variable for nucleus sampling
pub const ENV_TOP_P: &str = "SNAP_SOLVE_TOP_P";

/// Environment variable for top-k sampling
pub const ENV_TOP_K: &str = "SNAP_SOLVE_TOP_K";

/// Environment variable for the request timeout
pub const ENV_REQUEST_TIMEOUT: &str = "SNAP_SOLVE_TIMEOUT";

/// Environment variable for the connection timeout
pub const ENV_CONNECT_TIMEOUT: &str = "SNAP_SOLVE_CONNECT_TIMEOUT";

/// Environment variable for the camera device index
pub const ENV_CAMERA: &str = "SNAP_SOLVE_CAMERA";

/// Environment variable for the capture resolution
pub const ENV_RESOLUTION: &str = "SNAP_SOLVE_RESOLUTION";

/// Environment variable for the JPEG quality
pub const ENV_JPEG_QUALITY: &str = "SNAP_SOLVE_JPEG_QUALITY";

/// Environment variable for the warm-up frame count
pub const ENV_WARMUP_FRAMES: &str = "SNAP_SOLVE_WARMUP_FRAMES";

/// Environment variable for the terminal UI log file
pub const ENV_LOG_FILE: &str = "SNAP_SOLVE_LOG_FILE";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for Snap Solve
#[derive(Debug, Clone)]
pub struct Config {
    /// Analysis service settings
    pub analysis: AnalysisSettings,
    /// Camera settings
    pub camera: CameraSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Analysis service settings
#[derive(Clone)]
pub struct AnalysisSettings {
    /// Credential, checked at the first request rather than at startup
    pub api_key: Option<String>,
    /// API base URL
    pub endpoint: String,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling threshold
    pub top_p: f32,
    /// Top-k sampling
    pub top_k: u32,
    /// Whole-request timeout (seconds)
    pub request_timeout: u64,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
}

// Hand-written so the credential never ends up in logs.
impl std::fmt::Debug for AnalysisSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Camera settings
#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// V4L2 device index
    pub device_index: u32,
    /// Resolution preset or `WxH` as given
    pub resolution: String,
    /// Requested frame width
    pub frame_width: u32,
    /// Requested frame height
    pub frame_height: u32,
    /// JPEG quality of the encoded still
    pub jpeg_quality: u8,
    /// Frames discarded before the still is taken
    pub warmup_frames: u32,
}

/// Logging settings
#[derive(Debug, Clone, Default)]
pub struct LoggingSettings {
    /// Log destination used while the terminal UI owns the screen
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            analysis: AnalysisSettings::from_lookup(&lookup),
            camera: CameraSettings::from_lookup(&lookup),
            logging: LoggingSettings::from_lookup(&lookup),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            analysis: AnalysisSettings::defaults(),
            camera: CameraSettings::defaults(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AnalysisSettings {
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            api_key: lookup(ENV_API_KEY)
                .or_else(|| lookup(ENV_API_KEY_GEMINI))
                .or_else(|| lookup(ENV_API_KEY_LEGACY))
                .filter(|key| !key.trim().is_empty()),
            endpoint: lookup(ENV_ENDPOINT).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: lookup(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: parsed(lookup, ENV_TEMPERATURE).unwrap_or(DEFAULT_TEMPERATURE),
            top_p: parsed(lookup, ENV_TOP_P).unwrap_or(DEFAULT_TOP_P),
            top_k: parsed(lookup, ENV_TOP_K).unwrap_or(DEFAULT_TOP_K),
            request_timeout: parsed(lookup, ENV_REQUEST_TIMEOUT).unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            connect_timeout: parsed(lookup, ENV_CONNECT_TIMEOUT).unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    /// Create analysis settings with defaults and no credential
    pub fn defaults() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl CameraSettings {
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let resolution = lookup(ENV_RESOLUTION).unwrap_or_else(|| DEFAULT_RESOLUTION.to_string());

        // Parse resolution to get dimensions
        let (width, height) =
            parse_resolution(&resolution).unwrap_or((DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT));

        Self {
            device_index: parsed(lookup, ENV_CAMERA).unwrap_or(DEFAULT_CAMERA_INDEX),
            resolution,
            frame_width: width,
            frame_height: height,
            jpeg_quality: parsed::<u8>(lookup, ENV_JPEG_QUALITY)
                .filter(|q| (1..=100).contains(q))
                .unwrap_or(DEFAULT_JPEG_QUALITY),
            warmup_frames: parsed(lookup, ENV_WARMUP_FRAMES).unwrap_or(DEFAULT_WARMUP_FRAMES),
        }
    }

    /// Create camera settings with hardcoded defaults
    pub fn defaults() -> Self {
        Self {
            device_index: DEFAULT_CAMERA_INDEX,
            resolution: DEFAULT_RESOLUTION.to_string(),
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            warmup_frames: DEFAULT_WARMUP_FRAMES,
        }
    }
}

impl LoggingSettings {
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            log_file: lookup(ENV_LOG_FILE)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parsed<T: std::str::FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

/// Parse a resolution string into (width, height)
/// Supports: "vga" (640x480), "hd" (1280x720), "fhd" (1920x1080), or "WxH"
/// with each side in `1..=MAX_FRAME_SIDE`
pub fn parse_resolution(resolution: &str) -> Option<(u32, u32)> {
    match resolution.to_lowercase().as_str() {
        "vga" => Some((640, 480)),
        "hd" => Some((1280, 720)),
        "fhd" => Some((1920, 1080)),
        custom => {
            let (w, h) = custom.split_once('x')?;
            let w: u32 = w.parse().ok()?;
            let h: u32 = h.parse().ok()?;
            let side = 1..=MAX_FRAME_SIDE;
            (side.contains(&w) && side.contains(&h)).then_some((w, h))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_resolution_presets() {
        assert_eq!(parse_resolution("vga"), Some((640, 480)));
        assert_eq!(parse_resolution("HD"), Some((1280, 720)));
        assert_eq!(parse_resolution("fhd"), Some((1920, 1080)));
    }

    #[test]
    fn test_parse_resolution_custom() {
        assert_eq!(parse_resolution("800x600"), Some((800, 600)));
        assert_eq!(parse_resolution("0x600"), None);
        assert_eq!(parse_resolution("800"), None);
        assert_eq!(parse_resolution("widexhigh"), None);
    }

    #[test]
    fn test_parse_resolution_upper_bound() {
        assert_eq!(parse_resolution("8192x8192"), Some((MAX_FRAME_SIDE, MAX_FRAME_SIDE)));
        assert_eq!(parse_resolution("8193x600"), None);
        assert_eq!(parse_resolution("70000x70000"), None);

        let config = Config::from_lookup(lookup_from(&[(ENV_RESOLUTION, "70000x70000")]));
        assert_eq!(
            (config.camera.frame_width, config.camera.frame_height),
            (DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT)
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.analysis.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.analysis.model, DEFAULT_MODEL);
        assert!(config.analysis.api_key.is_none());
        assert_eq!(config.camera.frame_width, 1280);
        assert_eq!(config.camera.jpeg_quality, 80);
    }

    #[test]
    fn test_api_key_fallback_order() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_API_KEY_LEGACY, "legacy"),
            (ENV_API_KEY_GEMINI, "gemini"),
        ]));
        assert_eq!(config.analysis.api_key.as_deref(), Some("gemini"));

        let config = Config::from_lookup(lookup_from(&[
            (ENV_API_KEY, "primary"),
            (ENV_API_KEY_LEGACY, "legacy"),
        ]));
        assert_eq!(config.analysis.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let config = Config::from_lookup(lookup_from(&[(ENV_API_KEY, "  ")]));
        assert!(config.analysis.api_key.is_none());
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_TEMPERATURE, "warm"),
            (ENV_TOP_K, "12"),
            (ENV_JPEG_QUALITY, "250"),
            (ENV_RESOLUTION, "huge"),
        ]));
        assert_eq!(config.analysis.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.analysis.top_k, 12);
        assert_eq!(config.camera.jpeg_quality, DEFAULT_JPEG_QUALITY);
        assert_eq!(config.camera.resolution, "huge");
        assert_eq!(
            (config.camera.frame_width, config.camera.frame_height),
            (DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT)
        );
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = Config::from_lookup(lookup_from(&[(ENV_API_KEY, "secret-value")]));
        let rendered = format!("{:?}", config.analysis);
        assert!(!rendered.contains("secret-value"));
        assert!(rendered.contains("***"));
    }
}
