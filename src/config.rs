//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Inference provider configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// API key for the generative service.
    pub api_key: SecretString,
    /// Model identifier.
    pub model: String,
    /// Per-call timeout applied by the neutralization engine.
    pub call_timeout: Duration,
    /// Additional attempts after the first failed call (engine only).
    pub max_retries: u32,
}

/// Rate-limiter configuration for the neutralization operation.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Fixed window length.
    pub window: Duration,
    /// Maximum neutralization invocations per actor per window.
    pub max_per_window: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(24 * 60 * 60),
            max_per_window: 50,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the local database file.
    pub db_path: PathBuf,
    /// HTTP listen port.
    pub http_port: u16,
    /// Directory where uploaded meeting audio lives.
    pub audio_dir: PathBuf,
    pub inference: InferenceConfig,
    pub quota: QuotaConfig,
}

impl AppConfig {
    /// Build configuration from environment variables.
    ///
    /// `GEMINI_API_KEY` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("GEMINI_API_KEY".to_string()))?;

        let model = std::env::var("MEETING_ASSIST_MODEL")
            .unwrap_or_else(|_| "gemini-flash-latest".to_string());

        let http_port = match std::env::var("MEETING_ASSIST_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MEETING_ASSIST_PORT".to_string(),
                message: format!("not a valid port: {raw}"),
            })?,
            Err(_) => 8080,
        };

        let db_path = std::env::var("MEETING_ASSIST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/meeting-assist.db"));

        let audio_dir = std::env::var("MEETING_ASSIST_AUDIO_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads/meetings"));

        Ok(Self {
            db_path,
            http_port,
            audio_dir,
            inference: InferenceConfig {
                api_key: SecretString::from(api_key),
                model,
                call_timeout: Duration::from_secs(30),
                max_retries: 1,
            },
            quota: QuotaConfig::default(),
        })
    }
}
