//! Summary-grounded meeting Q&A.
//!
//! Answers questions about a meeting using only its generated summary as
//! context. Stateless: callers carry the conversation history themselves.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{MeetingError, Result};
use crate::inference::{GenerateRequest, InferenceProvider};
use crate::store::MeetingStore;

/// Context-window guard for very long summaries.
const MAX_SUMMARY_CHARS: usize = 50_000;

/// Cap on reply length.
const MAX_REPLY_TOKENS: u32 = 1000;

/// Who said a previous turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Model,
}

/// One prior turn of the conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

/// Q&A over a meeting's summary.
pub struct MeetingChat {
    store: Arc<dyn MeetingStore>,
    inference: Arc<dyn InferenceProvider>,
}

impl MeetingChat {
    pub fn new(store: Arc<dyn MeetingStore>, inference: Arc<dyn InferenceProvider>) -> Self {
        Self { store, inference }
    }

    /// Answer a question about the meeting. Requires a ready summary.
    pub async fn ask(
        &self,
        meeting_id: Uuid,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String> {
        let meeting = self.store.get(meeting_id).await?;
        if !meeting.has_summary() {
            return Err(MeetingError::SummaryNotReady { id: meeting_id }.into());
        }

        let prompt = build_chat_prompt(&meeting.summary, message, history);
        debug!(meeting_id = %meeting_id, history_turns = history.len(), "Meeting chat question");

        let request = GenerateRequest::new(prompt).with_max_output_tokens(MAX_REPLY_TOKENS);
        let reply = self.inference.generate(request).await?;
        Ok(reply)
    }
}

fn build_chat_prompt(summary: &str, message: &str, history: &[ChatTurn]) -> String {
    let safe_summary: String = if summary.chars().count() > MAX_SUMMARY_CHARS {
        let truncated: String = summary.chars().take(MAX_SUMMARY_CHARS).collect();
        format!("{truncated}...[Truncated]")
    } else {
        summary.to_string()
    };

    let mut prompt = format!(
        r#"You are a helpful and intelligent AI meeting assistant defined by the meeting summary below.

CONTEXT (MEETING SUMMARY):
{safe_summary}

INSTRUCTIONS:
1. Answer the user's questions clearly based ONLY on the meeting summary provided above.
2. If the answer is not in the summary, politely say you don't have that information from this meeting.
3. Be professional, concise, and friendly.
4. You are chatting with a participant of the meeting.

Keep your answers direct. Use bullet points for lists if needed.
"#
    );

    for turn in history {
        let speaker = match turn.role {
            ChatRole::User => "User",
            ChatRole::Model => "Assistant",
        };
        prompt.push_str(&format!("\n{speaker}: {}", turn.text));
    }
    prompt.push_str(&format!("\nUser: {message}\nAssistant:"));
    prompt
}
