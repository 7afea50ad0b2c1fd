//! Notification records and fire-and-forget dispatch.
//!
//! Delivery and read/unread tracking live outside the core; this module only
//! produces the records and pushes them through a [`NotificationSink`],
//! logging and swallowing sink failures so no caller path ever fails because
//! a notification did.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::meetings::model::{Task, TaskStatus};
use crate::store::NotificationSink;

/// Notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Summary,
    Task,
    System,
}

/// A notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Frontend deep link.
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        link: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            link: link.into(),
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Summarization finished for a meeting.
    pub fn summary_complete(meeting_id: Uuid, meeting_title: &str, task_count: usize) -> Self {
        Self::new(
            NotificationKind::Summary,
            "Meeting summary ready",
            format!("\"{meeting_title}\" has been summarized. {task_count} action items identified."),
            format!("/dashboard/meetings/{meeting_id}/summary"),
            serde_json::json!({ "meeting_id": meeting_id }),
        )
    }

    /// Summarization hit a terminal error.
    pub fn summary_failed(meeting_id: Uuid, meeting_title: &str) -> Self {
        Self::new(
            NotificationKind::System,
            "Meeting summary failed",
            format!("Summary generation for \"{meeting_title}\" encountered a terminal error."),
            format!("/dashboard/meetings/{meeting_id}/summary"),
            serde_json::json!({ "meeting_id": meeting_id }),
        )
    }

    /// A task moved to a new neutralization status.
    pub fn task_status_changed(meeting_id: Uuid, task: &Task, error: Option<&str>) -> Self {
        let mut metadata = serde_json::json!({
            "meeting_id": meeting_id,
            "task_id": task.id,
            "status": task.status,
        });
        if let Some(err) = error {
            metadata["error"] = serde_json::Value::String(err.to_string());
        }
        let message = match task.status {
            TaskStatus::Done => format!("Task \"{}\" was resolved by the agent.", task.description),
            TaskStatus::Failed => format!("Task \"{}\" failed to resolve.", task.description),
            _ => format!("Task \"{}\" is now {}.", task.description, task.status),
        };
        Self::new(
            NotificationKind::Task,
            "Task status updated",
            message,
            format!("/dashboard/meetings/{meeting_id}/summary"),
            metadata,
        )
    }
}

/// Push a notification, logging and swallowing sink failures. Callers never
/// fail because a notification did.
pub async fn send_best_effort(sink: &Arc<dyn NotificationSink>, notification: Notification) {
    if let Err(e) = sink.push(&notification).await {
        warn!(error = %e, kind = ?notification.kind, "Failed to push notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_complete_fields() {
        let id = Uuid::new_v4();
        let n = Notification::summary_complete(id, "Sprint review", 3);
        assert_eq!(n.kind, NotificationKind::Summary);
        assert!(n.message.contains("Sprint review"));
        assert!(n.message.contains("3 action items"));
        assert!(n.link.contains(&id.to_string()));
    }

    #[test]
    fn task_notification_carries_error() {
        let mut task = Task::new("File the report");
        task.status = TaskStatus::Failed;
        let n = Notification::task_status_changed(Uuid::new_v4(), &task, Some("timed out"));
        assert_eq!(n.kind, NotificationKind::Task);
        assert_eq!(n.metadata["error"], "timed out");
        assert!(n.message.contains("failed to resolve"));
    }

    #[test]
    fn notification_serde_roundtrip() {
        let n = Notification::summary_failed(Uuid::new_v4(), "Retro");
        let json = serde_json::to_string(&n).unwrap();
        let parsed: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, n.id);
        assert_eq!(parsed.kind, NotificationKind::System);
    }
}
