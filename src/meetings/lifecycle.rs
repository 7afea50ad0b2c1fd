//! Meeting lifecycle controller.
//!
//! Owns meeting-level status transitions and decides when the summarization
//! pipeline runs: immediately after audio attach (detached), on explicit
//! request (synchronous, cached when already summarized), or lazily on the
//! first status poll that finds audio but no summary.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{MeetingError, Result, TaskError};
use crate::meetings::model::{
    Meeting, MeetingStatus, NewMeeting, NewTask, Task, TaskStatus, TaskWithMeeting,
};
use crate::notify::{Notification, send_best_effort};
use crate::pipeline::Summarizer;
use crate::store::{MeetingStore, NotificationSink};

/// Result of an explicit summary trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// The meeting was already summarized; no inference call was made.
    Cached { summary: String },
    /// A pipeline run was executed; the meeting reflects its outcome.
    Generated { meeting: Meeting },
}

/// Summary readiness as seen by pollers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryStatus {
    Ready {
        summary: String,
        meeting_title: String,
    },
    Processing,
    Failed {
        error: String,
    },
    NotStarted {
        message: String,
    },
}

/// Controller for meeting-level operations.
pub struct MeetingLifecycle {
    store: Arc<dyn MeetingStore>,
    summarizer: Arc<Summarizer>,
    notifications: Arc<dyn NotificationSink>,
}

impl MeetingLifecycle {
    pub fn new(
        store: Arc<dyn MeetingStore>,
        summarizer: Arc<Summarizer>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            summarizer,
            notifications,
        }
    }

    /// Create a new scheduled meeting.
    pub async fn create(&self, params: NewMeeting) -> Result<Meeting> {
        let meeting = Meeting::new(
            params.title.unwrap_or_else(|| "Untitled Meeting".to_string()),
            params.description.unwrap_or_default(),
            params.date.unwrap_or_else(chrono::Utc::now),
        );
        self.store.insert(&meeting).await?;
        info!(meeting_id = %meeting.id, title = %meeting.title, "Meeting created");
        Ok(meeting)
    }

    pub async fn get(&self, meeting_id: Uuid) -> Result<Meeting> {
        Ok(self.store.get(meeting_id).await?)
    }

    pub async fn list(&self) -> Result<Vec<Meeting>> {
        Ok(self.store.list().await?)
    }

    /// All tasks across all meetings, each tagged with its parent meeting.
    pub async fn all_tasks(&self) -> Result<Vec<TaskWithMeeting>> {
        let meetings = self.store.list().await?;
        let mut tasks = Vec::new();
        for meeting in meetings {
            for task in &meeting.tasks {
                tasks.push(TaskWithMeeting {
                    task: task.clone(),
                    meeting_id: meeting.id,
                    meeting_title: meeting.title.clone(),
                });
            }
        }
        Ok(tasks)
    }

    /// A participant joined: `scheduled → live`. Joining an already-live
    /// meeting is a no-op.
    pub async fn join(&self, meeting_id: Uuid) -> Result<Meeting> {
        let mut meeting = self.store.get(meeting_id).await?;
        if meeting.status == MeetingStatus::Live {
            return Ok(meeting);
        }
        meeting.transition_to(MeetingStatus::Live)?;
        Ok(self.store.save(&meeting).await?)
    }

    /// Explicitly end the meeting.
    pub async fn end(&self, meeting_id: Uuid) -> Result<Meeting> {
        let mut meeting = self.store.get(meeting_id).await?;
        if meeting.status == MeetingStatus::Ended {
            return Ok(meeting);
        }
        meeting.transition_to(MeetingStatus::Ended)?;
        let saved = self.store.save(&meeting).await?;
        info!(meeting_id = %meeting_id, "Meeting ended");
        Ok(saved)
    }

    /// Attach the recorded audio artifact and kick off summarization as a
    /// detached background run. This call returns as soon as the record is
    /// saved; pipeline failures surface only through later status polls.
    pub async fn attach_audio(&self, meeting_id: Uuid, artifact_path: &str) -> Result<Meeting> {
        let mut meeting = self.store.get(meeting_id).await?;
        meeting.audio_path = Some(artifact_path.to_string());
        if meeting.status != MeetingStatus::Ended {
            meeting.transition_to(MeetingStatus::Ended)?;
        }
        let saved = self.store.save(&meeting).await?;

        info!(
            meeting_id = %meeting_id,
            artifact = %artifact_path,
            "Audio attached, starting background summarization"
        );
        self.summarizer.spawn_run(meeting_id);

        Ok(saved)
    }

    /// Explicit summary request. Already-summarized meetings return the
    /// cached summary without touching the inference capability; anything
    /// else runs the pipeline to completion.
    pub async fn trigger_summary(&self, meeting_id: Uuid) -> Result<TriggerOutcome> {
        let meeting = self.store.get(meeting_id).await?;

        if meeting.audio_path.is_none() {
            return Err(MeetingError::NoAudio { id: meeting_id }.into());
        }
        if meeting.status == MeetingStatus::Summarized {
            return Ok(TriggerOutcome::Cached {
                summary: meeting.summary,
            });
        }

        let meeting = self.summarizer.run(meeting_id).await?;
        Ok(TriggerOutcome::Generated { meeting })
    }

    /// Summary readiness for pollers, with the guarded lazy trigger: a
    /// meeting that has audio but no summary (and has not failed) gets a
    /// background run started at most once at a time.
    pub async fn summary_status(&self, meeting_id: Uuid) -> Result<SummaryStatus> {
        let meeting = self.store.get(meeting_id).await?;

        if meeting.has_summary() {
            return Ok(SummaryStatus::Ready {
                summary: meeting.summary,
                meeting_title: meeting.title,
            });
        }

        if meeting.status == MeetingStatus::Failed {
            let error = if meeting.summary.is_empty() {
                "Summary generation failed".to_string()
            } else {
                meeting.summary
            };
            return Ok(SummaryStatus::Failed { error });
        }

        if meeting.status == MeetingStatus::Ended || meeting.audio_path.is_some() {
            if meeting.audio_path.is_some()
                && meeting.summary.trim().is_empty()
                && !self.summarizer.is_running(meeting_id)
            {
                info!(meeting_id = %meeting_id, "Lazily triggering missing summary generation");
                self.summarizer.spawn_run(meeting_id);
            }
            return Ok(SummaryStatus::Processing);
        }

        let message = if meeting.status == MeetingStatus::Live {
            "Meeting is live. Waiting for it to end."
        } else {
            "Meeting has not started yet."
        };
        Ok(SummaryStatus::NotStarted {
            message: message.to_string(),
        })
    }

    /// Manually append a task outside the extraction pipeline.
    pub async fn add_task(&self, meeting_id: Uuid, params: NewTask) -> Result<Task> {
        let mut meeting = self.store.get(meeting_id).await?;

        let mut task = Task::new(params.description);
        if let Some(assignee) = params.assignee.filter(|a| !a.trim().is_empty()) {
            task = task.with_assignee(assignee);
        }
        if let Some(due) = params.due_date {
            task = task.with_due_date(due);
        }
        let created = task.clone();
        meeting.tasks.push(task);
        self.store.save(&meeting).await?;

        info!(meeting_id = %meeting_id, task_id = %created.id, "Task added");
        Ok(created)
    }

    /// Manual status override, bypassing the neutralization engine. Writes
    /// no audit entry. Two holds remain: a `done` task is immutable, and
    /// `neutralizing` cannot be set by hand; that marker belongs to the
    /// engine.
    pub async fn update_task_status(
        &self,
        meeting_id: Uuid,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<Task> {
        let mut meeting = self.store.get(meeting_id).await?;
        let task = meeting.task_mut(task_id).ok_or(TaskError::NotFound {
            meeting_id,
            task_id,
        })?;

        if task.status == TaskStatus::Done && status != TaskStatus::Done {
            return Err(TaskError::AlreadyComplete { task_id }.into());
        }
        if status == TaskStatus::Neutralizing {
            return Err(TaskError::InvalidTransition {
                task_id,
                from: task.status.to_string(),
                to: status.to_string(),
            }
            .into());
        }

        task.status = status;
        let updated = task.clone();
        self.store.save(&meeting).await?;

        send_best_effort(
            &self.notifications,
            Notification::task_status_changed(meeting_id, &updated, None),
        )
        .await;

        Ok(updated)
    }
}
