//! Summarization pipeline.
//!
//! Takes a meeting with a recorded-audio artifact, asks the inference
//! capability for a structured summary, extracts the Action Items into
//! tasks, and persists the result. Failures are persisted as a `failed`
//! status with an `Error…` summary sentinel; quota failures get a distinct
//! message so operators can tell them apart from transport problems.
//!
//! Runs for the same meeting are serialized through an in-process in-flight
//! set: a second run requested while one is active is rejected instead of
//! producing duplicate inference calls.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{Error, MeetingError, Result, StoreError};
use crate::inference::{AudioAttachment, GenerateRequest, InferenceProvider};
use crate::meetings::model::{Meeting, MeetingStatus};
use crate::notify::{Notification, send_best_effort};
use crate::pipeline::actions::parse_action_items;
use crate::store::{MeetingStore, NotificationSink};

/// Summary stored when the upstream provider refuses for quota reasons.
pub const QUOTA_ERROR_SUMMARY: &str = "Error: AI quota exceeded. Please try again later.";

/// Drives summarization runs.
pub struct Summarizer {
    store: Arc<dyn MeetingStore>,
    inference: Arc<dyn InferenceProvider>,
    notifications: Arc<dyn NotificationSink>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// Removes the meeting from the in-flight set when a run ends, on every
/// exit path.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<Uuid>>>,
    meeting_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&self.meeting_id);
    }
}

impl Summarizer {
    pub fn new(
        store: Arc<dyn MeetingStore>,
        inference: Arc<dyn InferenceProvider>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            inference,
            notifications,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a run is currently active for this meeting.
    pub fn is_running(&self, meeting_id: Uuid) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&meeting_id)
    }

    /// Claim the in-flight slot for a meeting, or reject the run.
    fn begin(&self, meeting_id: Uuid) -> Result<InFlightGuard> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !set.insert(meeting_id) {
            return Err(MeetingError::SummaryInProgress { id: meeting_id }.into());
        }
        Ok(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            meeting_id,
        })
    }

    /// Start a detached run. The caller does not wait on it and is never
    /// failed by it; outcomes surface through meeting status polling.
    pub fn spawn_run(self: &Arc<Self>, meeting_id: Uuid) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            match pipeline.run(meeting_id).await {
                Ok(meeting) => {
                    info!(meeting_id = %meeting_id, status = %meeting.status, "Background summarization finished");
                }
                Err(Error::Meeting(MeetingError::SummaryInProgress { .. })) => {
                    // Another run already owns this meeting.
                }
                Err(e) => {
                    error!(meeting_id = %meeting_id, error = %e, "Background summarization error");
                }
            }
        });
    }

    /// Run the pipeline to completion for one meeting.
    ///
    /// Inference failures are absorbed: the meeting comes back with
    /// `failed` status and an error summary. Errors are returned only when
    /// the run could not start (meeting missing, no audio, already running)
    /// or the store itself failed.
    pub async fn run(&self, meeting_id: Uuid) -> Result<Meeting> {
        let _guard = self.begin(meeting_id)?;

        let meeting = self.store.get(meeting_id).await?;
        let Some(audio_path) = meeting.audio_path.clone() else {
            warn!(meeting_id = %meeting_id, "Summarization requested with no audio attached");
            return Err(MeetingError::NoAudio { id: meeting_id }.into());
        };

        info!(meeting_id = %meeting_id, title = %meeting.title, "Summarization started");

        let request = GenerateRequest::new(build_summary_prompt(&meeting))
            .with_attachment(AudioAttachment::from_path(audio_path.as_str()));

        match self.inference.generate(request).await {
            Ok(text) => self.complete(meeting_id, text).await,
            Err(e) => {
                warn!(meeting_id = %meeting_id, error = %e, "Summarization failed");
                let summary = if e.is_quota() {
                    QUOTA_ERROR_SUMMARY.to_string()
                } else {
                    format!("Error generating summary: {e}")
                };
                self.fail(meeting_id, summary).await
            }
        }
    }

    async fn complete(&self, meeting_id: Uuid, summary: String) -> Result<Meeting> {
        let tasks = parse_action_items(&summary);
        let task_count = tasks.len();

        let saved = self
            .persist(meeting_id, move |m| {
                // Wholesale overwrite; re-extraction never merges with a
                // previous task list.
                m.summary = summary.clone();
                m.tasks = tasks.clone();
                if m.status != MeetingStatus::Summarized {
                    m.transition_to(MeetingStatus::Summarized)?;
                }
                Ok(())
            })
            .await?;

        info!(
            meeting_id = %meeting_id,
            tasks = task_count,
            "Summary generated and tasks extracted"
        );

        send_best_effort(
            &self.notifications,
            Notification::summary_complete(meeting_id, &saved.title, task_count),
        )
        .await;

        Ok(saved)
    }

    async fn fail(&self, meeting_id: Uuid, error_summary: String) -> Result<Meeting> {
        let saved = self
            .persist(meeting_id, move |m| {
                m.summary = error_summary.clone();
                // Tasks are left exactly as they were; a failed run never
                // partially populates them.
                m.transition_to(MeetingStatus::Failed)?;
                Ok(())
            })
            .await?;

        send_best_effort(
            &self.notifications,
            Notification::summary_failed(meeting_id, &saved.title),
        )
        .await;

        Ok(saved)
    }

    /// Re-fetch, apply, save. The terminal write must land even when the
    /// copy fetched at the start of the run has gone stale, so the record is
    /// always re-read immediately before writing; a conflicting concurrent
    /// writer triggers one more round.
    async fn persist<F>(&self, meeting_id: Uuid, apply: F) -> Result<Meeting>
    where
        F: Fn(&mut Meeting) -> Result<()>,
    {
        let mut attempts = 0u32;
        loop {
            let mut meeting = self.store.get(meeting_id).await?;
            apply(&mut meeting)?;
            match self.store.save(&meeting).await {
                Ok(saved) => return Ok(saved),
                Err(StoreError::Conflict { .. }) if attempts < 2 => {
                    attempts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Deterministic summary prompt with the six-section structure and the
/// literal action-item line contract the parser depends on.
fn build_summary_prompt(meeting: &Meeting) -> String {
    let date = meeting.date.format("%a %b %e %Y");
    let time = meeting.date.format("%H:%M UTC");
    let description = if meeting.description.is_empty() {
        "No description provided"
    } else {
        &meeting.description
    };

    format!(
        r#"You are an AI meeting assistant. Your goal is to provide a clear, professional summary of the meeting recording.
Use simple English, clean formatting, and bold headings.

Meeting Title: {title}
Meeting Description: {description}
Date: {date}
Time: {time}

Structure your response exactly with these sections (using Markdown):

## 1. Meeting Overview
(Include strictly: Title, Date, Participants (if mentioned in audio), and Purpose of the meeting)

## 2. Key Discussion Points
(Provide a concise summary of the main topics discussed. Use bullet points and short paragraphs.)

## 3. Decisions Taken
(List the final conclusions and decisions made during the meeting.)

## 4. Action Items
(List the tasks clearly. Format each line exactly as: - Task Description • Assigned To: Name • Deadline: Date/Time)
(If no assignee or deadline is mentioned, write "Unassigned" or "None" respectively)

## 5. Deadlines / Timeline
(Highlight important dates and milestones mentioned)

## 6. Conclusion
(A brief wrapping up of the meeting outcomes)

Keep the tone professional but friendly. Avoid clutter and unnecessary text."#,
        title = meeting.title,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::inference::testing::{Scripted, ScriptedProvider};
    use crate::meetings::model::Task;
    use crate::notify::NotificationKind;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::time::Duration;

    const RESPONSE: &str = "\
## 1. Meeting Overview
Planning sync.

## 2. Key Discussion Points
- Roadmap.

## 3. Decisions Taken
- Ship it.

## 4. Action Items
- Prepare deck • Assigned To: Alice • Deadline: 2025-01-10
- Circulate notes • Assigned To: Unassigned • Deadline: None

## 5. Deadlines / Timeline
- Jan 10.

## 6. Conclusion
Done.
";

    fn setup(
        responses: Vec<Scripted>,
    ) -> (Arc<MemoryStore>, Arc<ScriptedProvider>, Arc<Summarizer>) {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new(responses));
        let summarizer = Arc::new(Summarizer::new(
            store.clone(),
            provider.clone(),
            store.clone(),
        ));
        (store, provider, summarizer)
    }

    async fn seed_ended_meeting(store: &Arc<MemoryStore>) -> Meeting {
        let mut meeting = Meeting::new("Planning sync", "Weekly planning", Utc::now());
        meeting.audio_path = Some("uploads/meetings/rec.webm".to_string());
        meeting.status = MeetingStatus::Ended;
        store.insert(&meeting).await.unwrap();
        meeting
    }

    #[tokio::test]
    async fn successful_run_summarizes_and_extracts() {
        let (store, provider, summarizer) = setup(vec![Scripted::ok(RESPONSE)]);
        let meeting = seed_ended_meeting(&store).await;

        let result = summarizer.run(meeting.id).await.unwrap();
        assert_eq!(result.status, MeetingStatus::Summarized);
        assert!(result.has_summary());
        assert_eq!(result.tasks.len(), 2);
        assert_eq!(result.tasks[0].assignee, "Alice");
        assert_eq!(provider.calls(), 1);

        let notifications = store.notifications().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Summary);
        assert!(notifications[0].message.contains("2 action items"));
    }

    #[tokio::test]
    async fn prompt_embeds_meeting_context() {
        let (store, provider, summarizer) = setup(vec![Scripted::ok(RESPONSE)]);
        let meeting = seed_ended_meeting(&store).await;

        summarizer.run(meeting.id).await.unwrap();
        let prompt = provider.prompts().remove(0);
        assert!(prompt.contains("Planning sync"));
        assert!(prompt.contains("Weekly planning"));
        assert!(prompt.contains("## 4. Action Items"));
        assert!(prompt.contains("Assigned To: Name"));
    }

    #[tokio::test]
    async fn quota_failure_sets_distinct_sentinel_and_keeps_tasks() {
        let (store, provider, summarizer) = setup(vec![Scripted::err(
            InferenceError::QuotaExceeded {
                reason: "429".into(),
            },
        )]);
        let mut meeting = seed_ended_meeting(&store).await;

        // Pre-existing tasks from an earlier run must survive untouched.
        meeting.tasks.push(Task::new("Existing task"));
        meeting.status = MeetingStatus::Failed;
        let _ = store.save(&meeting).await.unwrap();

        let result = summarizer.run(meeting.id).await.unwrap();
        assert_eq!(result.status, MeetingStatus::Failed);
        assert_eq!(result.summary, QUOTA_ERROR_SUMMARY);
        assert!(result.summary.to_lowercase().contains("quota"));
        assert_eq!(result.tasks.len(), 1);
        assert_eq!(result.tasks[0].description, "Existing task");
        assert_eq!(provider.calls(), 1);

        let notifications = store.notifications().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::System);
    }

    #[tokio::test]
    async fn transport_failure_uses_generic_error_summary() {
        let (store, _provider, summarizer) = setup(vec![Scripted::err(
            InferenceError::Transport {
                reason: "connection reset".into(),
            },
        )]);
        let meeting = seed_ended_meeting(&store).await;

        let result = summarizer.run(meeting.id).await.unwrap();
        assert_eq!(result.status, MeetingStatus::Failed);
        assert!(result.summary.starts_with("Error generating summary:"));
        assert!(result.summary.contains("connection reset"));
        assert!(!result.summary.to_lowercase().contains("quota"));
    }

    #[tokio::test]
    async fn no_audio_fails_without_mutating() {
        let (store, provider, summarizer) = setup(vec![]);
        let meeting = Meeting::new("No recording", "", Utc::now());
        store.insert(&meeting).await.unwrap();

        let err = summarizer.run(meeting.id).await.unwrap_err();
        assert!(matches!(err, Error::Meeting(MeetingError::NoAudio { .. })));
        assert_eq!(provider.calls(), 0);

        let stored = store.get(meeting.id).await.unwrap();
        assert_eq!(stored.status, MeetingStatus::Scheduled);
        assert!(stored.summary.is_empty());
    }

    #[tokio::test]
    async fn missing_meeting_fails_before_inference() {
        let (_store, provider, summarizer) = setup(vec![]);
        let err = summarizer.run(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::NotFound { .. })));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn rerun_overwrites_tasks_wholesale() {
        let second = RESPONSE.replace("Prepare deck", "Rebuild deck");
        let (store, provider, summarizer) =
            setup(vec![Scripted::ok(RESPONSE), Scripted::ok(second)]);
        let meeting = seed_ended_meeting(&store).await;

        let first = summarizer.run(meeting.id).await.unwrap();
        assert_eq!(first.tasks.len(), 2);
        let first_ids: Vec<Uuid> = first.tasks.iter().map(|t| t.id).collect();

        let rerun = summarizer.run(meeting.id).await.unwrap();
        assert_eq!(rerun.tasks.len(), 2);
        assert_eq!(rerun.tasks[0].description, "Rebuild deck");
        // Fresh ids, no merge with the previous extraction.
        assert!(rerun.tasks.iter().all(|t| !first_ids.contains(&t.id)));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_run_is_rejected() {
        let (store, provider, summarizer) = setup(vec![Scripted::slow(
            RESPONSE,
            Duration::from_millis(200),
        )]);
        let meeting = seed_ended_meeting(&store).await;

        let background = {
            let summarizer = Arc::clone(&summarizer);
            let id = meeting.id;
            tokio::spawn(async move { summarizer.run(id).await })
        };

        // Give the first run time to claim the in-flight slot.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(summarizer.is_running(meeting.id));

        let err = summarizer.run(meeting.id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Meeting(MeetingError::SummaryInProgress { .. })
        ));

        let first = background.await.unwrap().unwrap();
        assert_eq!(first.status, MeetingStatus::Summarized);
        // Only the winning run reached the provider.
        assert_eq!(provider.calls(), 1);
        assert!(!summarizer.is_running(meeting.id));
    }

    #[tokio::test]
    async fn stale_snapshot_does_not_block_terminal_write() {
        let (store, _provider, summarizer) = setup(vec![Scripted::ok(RESPONSE)]);
        let meeting = seed_ended_meeting(&store).await;

        // Another writer bumps the version mid-run; the pipeline re-fetches
        // before its final write, so the save still lands.
        let mut concurrent = store.get(meeting.id).await.unwrap();
        concurrent.description = "amended".to_string();
        store.save(&concurrent).await.unwrap();

        let result = summarizer.run(meeting.id).await.unwrap();
        assert_eq!(result.status, MeetingStatus::Summarized);
        assert_eq!(result.description, "amended");
    }
}
