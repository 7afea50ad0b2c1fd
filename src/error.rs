//! Error types for Meeting Assist.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Meeting error: {0}")]
    Meeting(#[from] MeetingError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Quota error: {0}")]
    Quota(#[from] QuotaError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Concurrent update conflict: {entity} with id {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn meeting_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "meeting",
            id: id.to_string(),
        }
    }

    pub fn meeting_conflict(id: Uuid) -> Self {
        Self::Conflict {
            entity: "meeting",
            id: id.to_string(),
        }
    }
}

/// Inference capability errors.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Inference call timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Inference quota exceeded: {reason}")]
    QuotaExceeded { reason: String },

    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Artifact upload failed: {reason}")]
    Upload { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InferenceError {
    /// Whether this failure is the upstream provider refusing for quota
    /// reasons (stored with a distinct summary sentinel).
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Meeting-level errors.
#[derive(Debug, thiserror::Error)]
pub enum MeetingError {
    #[error("Meeting {id} cannot transition from {from} to {to}")]
    InvalidTransition { id: Uuid, from: String, to: String },

    #[error("No audio available to summarize for meeting {id}")]
    NoAudio { id: Uuid },

    #[error("Summary for meeting {id} is not ready")]
    SummaryNotReady { id: Uuid },

    #[error("Summary generation already in progress for meeting {id}")]
    SummaryInProgress { id: Uuid },
}

/// Task-level errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {task_id} not found in meeting {meeting_id}")]
    NotFound { meeting_id: Uuid, task_id: Uuid },

    #[error("Task {task_id} is already complete")]
    AlreadyComplete { task_id: Uuid },

    #[error("Task {task_id} is already being neutralized")]
    NeutralizationInFlight { task_id: Uuid },

    #[error("Task {task_id} cannot transition from {from} to {to}")]
    InvalidTransition {
        task_id: Uuid,
        from: String,
        to: String,
    },

    /// Caller-facing terminal outcome. Deliberately generic; the detailed
    /// cause lives in the task's stored `failure_reason`.
    #[error("Neutralization encountered a terminal error. Please try again.")]
    NeutralizationFailed { task_id: Uuid },
}

/// Rate-limiter errors.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("Neutralization quota exceeded for this cycle")]
    Exhausted { actor_id: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
