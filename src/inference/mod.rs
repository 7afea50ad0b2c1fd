//! Inference capability — the abstracted generative service.
//!
//! The core treats inference as "submit a prompt (plus an optional audio
//! artifact), receive text". Everything provider-specific lives behind
//! [`InferenceProvider`]; the Gemini implementation is in [`gemini`].

pub mod gemini;

pub use gemini::GeminiProvider;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::InferenceConfig;
use crate::error::InferenceError;

/// A recorded audio artifact to attach to a prompt.
#[derive(Debug, Clone)]
pub struct AudioAttachment {
    pub path: PathBuf,
    pub mime_type: String,
}

impl AudioAttachment {
    /// Build an attachment from a file path, detecting the mime type from
    /// the extension (`.ogg` recordings aside, everything we record is webm).
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime_type = detect_mime(&path).to_string();
        Self { path, mime_type }
    }
}

fn detect_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("ogg") => "audio/ogg",
        _ => "audio/webm",
    }
}

/// A single generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub attachment: Option<AudioAttachment>,
    pub max_output_tokens: Option<u32>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachment: None,
            max_output_tokens: None,
        }
    }

    pub fn with_attachment(mut self, attachment: AudioAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }
}

/// Text-generation capability.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Submit the request and return the raw response text.
    async fn generate(&self, request: GenerateRequest) -> Result<String, InferenceError>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

/// Create the configured provider.
pub fn create_provider(config: &InferenceConfig) -> Arc<dyn InferenceProvider> {
    tracing::info!(model = %config.model, "Using Gemini provider");
    Arc::new(GeminiProvider::new(config.api_key.clone(), &config.model))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider for pipeline/engine tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// One scripted reply: an optional artificial latency plus the outcome.
    pub struct Scripted {
        pub delay: Option<Duration>,
        pub result: Result<String, InferenceError>,
    }

    impl Scripted {
        pub fn ok(text: impl Into<String>) -> Self {
            Self {
                delay: None,
                result: Ok(text.into()),
            }
        }

        pub fn err(error: InferenceError) -> Self {
            Self {
                delay: None,
                result: Err(error),
            }
        }

        pub fn slow(text: impl Into<String>, delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                result: Ok(text.into()),
            }
        }
    }

    /// Provider returning pre-scripted responses in order.
    #[derive(Default)]
    pub struct ScriptedProvider {
        responses: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn new(responses: Vec<Scripted>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// How many generate calls were made.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Prompts seen so far.
        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        async fn generate(&self, request: GenerateRequest) -> Result<String, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());

            let scripted = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("ScriptedProvider ran out of responses"));

            if let Some(delay) = scripted.delay {
                tokio::time::sleep(delay).await;
            }
            scripted.result
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_detection() {
        assert_eq!(
            AudioAttachment::from_path("uploads/a.ogg").mime_type,
            "audio/ogg"
        );
        assert_eq!(
            AudioAttachment::from_path("uploads/a.webm").mime_type,
            "audio/webm"
        );
        assert_eq!(
            AudioAttachment::from_path("uploads/noext").mime_type,
            "audio/webm"
        );
    }

    #[test]
    fn request_builder() {
        let req = GenerateRequest::new("hello")
            .with_attachment(AudioAttachment::from_path("x.webm"))
            .with_max_output_tokens(1000);
        assert!(req.attachment.is_some());
        assert_eq!(req.max_output_tokens, Some(1000));
    }
}
