//! Gemini implementation of [`InferenceProvider`].
//!
//! Audio attachments go through the File API first (multipart media upload),
//! then `generateContent` references the uploaded artifact by URI. The
//! temporary file is deleted best-effort after generation.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::InferenceError;
use crate::inference::{GenerateRequest, InferenceProvider};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini REST API client.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    /// Resource name, e.g. `files/abc123`.
    name: String,
    uri: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

impl GeminiProvider {
    pub fn new(api_key: SecretString, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn upload_audio(
        &self,
        path: &std::path::Path,
        mime_type: &str,
    ) -> Result<UploadedFile, InferenceError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            InferenceError::Upload {
                reason: format!("failed to read {}: {e}", path.display()),
            }
        })?;

        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("meeting-audio")
            .to_string();

        let metadata = serde_json::json!({
            "file": { "display_name": display_name }
        });

        let form = Form::new()
            .part(
                "metadata",
                Part::text(metadata.to_string())
                    .mime_str("application/json")
                    .map_err(|e| InferenceError::Upload {
                        reason: format!("invalid metadata part: {e}"),
                    })?,
            )
            .part(
                "file",
                Part::bytes(bytes)
                    .mime_str(mime_type)
                    .map_err(|e| InferenceError::Upload {
                        reason: format!("invalid mime type {mime_type}: {e}"),
                    })?,
            );

        let url = format!(
            "{}/upload/v1beta/files?key={}",
            self.base_url,
            self.api_key.expose_secret()
        );

        let response = self
            .http
            .post(&url)
            .header("X-Goog-Upload-Protocol", "multipart")
            .multipart(form)
            .send()
            .await
            .map_err(|e| InferenceError::Upload {
                reason: format!("upload request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: UploadResponse =
            response.json().await.map_err(|e| InferenceError::MalformedResponse {
                reason: format!("upload response was not valid JSON: {e}"),
            })?;

        debug!(uri = %parsed.file.uri, "Uploaded audio artifact");
        Ok(parsed.file)
    }

    async fn delete_file(&self, name: &str) {
        let url = format!(
            "{}/v1beta/{}?key={}",
            self.base_url,
            name,
            self.api_key.expose_secret()
        );
        match self.http.delete(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(file = %name, "Deleted temporary artifact");
            }
            Ok(resp) => {
                warn!(file = %name, status = %resp.status(), "Artifact delete rejected");
            }
            Err(e) => {
                warn!(file = %name, error = %e, "Artifact delete failed");
            }
        }
    }

    async fn generate_content(
        &self,
        prompt: &str,
        file: Option<&UploadedFile>,
        max_output_tokens: Option<u32>,
    ) -> Result<String, InferenceError> {
        let mut parts = vec![serde_json::json!({ "text": prompt })];
        if let Some(file) = file {
            parts.push(serde_json::json!({
                "file_data": {
                    "mime_type": file.mime_type,
                    "file_uri": file.uri,
                }
            }));
        }

        let mut body = serde_json::json!({
            "contents": [{ "parts": parts }]
        });
        if let Some(max) = max_output_tokens {
            body["generationConfig"] = serde_json::json!({ "maxOutputTokens": max });
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            self.api_key.expose_secret()
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Transport {
                reason: format!("generate request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let value: serde_json::Value =
            response.json().await.map_err(|e| InferenceError::MalformedResponse {
                reason: format!("response was not valid JSON: {e}"),
            })?;

        extract_text(&value)
    }
}

/// Map a non-success HTTP status to the error taxonomy. 429 is the upstream
/// quota signal and must stay distinguishable from plain transport failures.
fn classify_status(status: StatusCode, body: &str) -> InferenceError {
    let snippet: String = body.chars().take(200).collect();
    if status == StatusCode::TOO_MANY_REQUESTS {
        InferenceError::QuotaExceeded {
            reason: format!("upstream returned 429: {snippet}"),
        }
    } else {
        InferenceError::Transport {
            reason: format!("upstream returned {status}: {snippet}"),
        }
    }
}

/// Pull the first candidate's text out of a `generateContent` response.
fn extract_text(value: &serde_json::Value) -> Result<String, InferenceError> {
    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| InferenceError::MalformedResponse {
            reason: "response has no candidates".to_string(),
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        return Err(InferenceError::MalformedResponse {
            reason: "candidate contained no text parts".to_string(),
        });
    }
    Ok(text)
}

#[async_trait]
impl InferenceProvider for GeminiProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<String, InferenceError> {
        let uploaded = match &request.attachment {
            Some(attachment) => Some(
                self.upload_audio(&attachment.path, &attachment.mime_type)
                    .await?,
            ),
            None => None,
        };

        let result = self
            .generate_content(
                &request.prompt,
                uploaded.as_ref(),
                request.max_output_tokens,
            )
            .await;

        if let Some(file) = uploaded {
            self.delete_file(&file.name).await;
        }

        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_429_as_quota() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "rate limited");
        assert!(matches!(err, InferenceError::QuotaExceeded { .. }));
    }

    #[test]
    fn classify_other_as_transport() {
        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        match err {
            InferenceError::Transport { reason } => assert!(reason.contains("500")),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn extract_text_from_candidates() {
        let value = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "## 1. Meeting Overview\n…" }] }
            }]
        });
        assert_eq!(extract_text(&value).unwrap(), "## 1. Meeting Overview\n…");
    }

    #[test]
    fn extract_text_concatenates_parts() {
        let value = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "part one " }, { "text": "part two" }] }
            }]
        });
        assert_eq!(extract_text(&value).unwrap(), "part one part two");
    }

    #[test]
    fn extract_text_rejects_empty() {
        let value = serde_json::json!({ "candidates": [] });
        assert!(matches!(
            extract_text(&value),
            Err(InferenceError::MalformedResponse { .. })
        ));

        let no_text = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "inline_data": {} }] } }]
        });
        assert!(matches!(
            extract_text(&no_text),
            Err(InferenceError::MalformedResponse { .. })
        ));
    }
}
