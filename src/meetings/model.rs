//! Meeting data model — meetings, tasks, actors, and audit entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MeetingError, TaskError};

/// Sentinel assignee for tasks nobody owns yet.
pub const UNASSIGNED: &str = "Unassigned";

/// Prefix marking a summary field that holds an error description
/// instead of real content.
pub const SUMMARY_ERROR_PREFIX: &str = "Error";

/// Meeting lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    /// Created but not yet started.
    Scheduled,
    /// A participant has joined.
    Live,
    /// Ended explicitly or via audio attach; summarization may run.
    Ended,
    /// Summarization failed; recoverable by re-triggering the pipeline.
    Failed,
    /// Summary and tasks have been produced.
    Summarized,
}

impl MeetingStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: MeetingStatus) -> bool {
        use MeetingStatus::*;

        matches!(
            (self, target),
            (Scheduled, Live) |
            // Audio attach and explicit end are both valid direct entries
            // to Ended, even from Scheduled.
            (Scheduled, Ended) |
            (Live, Ended) |
            (Ended, Summarized) | (Ended, Failed) |
            // Failed is recoverable: a re-triggered pipeline can succeed,
            // or fail again.
            (Failed, Summarized) | (Failed, Failed)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Summarized)
    }
}

impl std::fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Ended => "ended",
            Self::Failed => "failed",
            Self::Summarized => "summarized",
        };
        write!(f, "{s}")
    }
}

/// Per-task neutralization status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Extracted but untouched.
    Pending,
    /// An agent run is in flight. Acts as the exclusivity lock.
    Neutralizing,
    /// Resolved by the agent. Terminal.
    Done,
    /// The last agent run failed; may be retried.
    Failed,
}

impl TaskStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Pending, Neutralizing)
                | (Failed, Neutralizing)
                | (Neutralizing, Done)
                | (Neutralizing, Failed)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Neutralizing => "neutralizing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// An action item extracted from a meeting summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique within the parent meeting.
    pub id: Uuid,
    /// What needs doing.
    pub description: String,
    /// Assignee name, or [`UNASSIGNED`].
    pub assignee: String,
    /// Optional deadline as spoken in the meeting (free text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Neutralization status.
    pub status: TaskStatus,
    /// Resolution text produced by the agent. Non-empty once `done`.
    #[serde(default)]
    pub agent_output: String,
    /// Agent confidence, 0–100.
    #[serde(default)]
    pub confidence_score: u8,
    /// Ordered follow-up suggestions from the agent.
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// Why the last neutralization attempt failed (internal detail).
    #[serde(default)]
    pub failure_reason: String,
}

impl Task {
    /// Create a new pending task.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            assignee: UNASSIGNED.to_string(),
            due_date: None,
            status: TaskStatus::Pending,
            agent_output: String::new(),
            confidence_score: 0,
            next_steps: Vec::new(),
            failure_reason: String::new(),
        }
    }

    /// Builder: set assignee.
    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = assignee.into();
        self
    }

    /// Builder: set due date.
    pub fn with_due_date(mut self, due: impl Into<String>) -> Self {
        self.due_date = Some(due.into());
        self
    }

    /// Transition to a new status, enforcing the state machine.
    pub fn transition_to(&mut self, target: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(target) {
            return Err(TaskError::InvalidTransition {
                task_id: self.id,
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }
}

/// A scheduled meeting and everything derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    /// Unique ID, immutable after creation.
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Scheduled date/time.
    pub date: DateTime<Utc>,
    /// Lifecycle status.
    pub status: MeetingStatus,
    /// Path to the recorded audio artifact, once attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    /// Generated summary. Empty until the pipeline succeeds; holds an
    /// `Error…` description after a failed run.
    #[serde(default)]
    pub summary: String,
    /// Extracted tasks, in extraction order.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Optimistic-concurrency version, bumped by the store on every save.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Meeting {
    /// Create a new scheduled meeting.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            date,
            status: MeetingStatus::Scheduled,
            audio_path: None,
            summary: String::new(),
            tasks: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new status, enforcing the state machine.
    pub fn transition_to(&mut self, target: MeetingStatus) -> Result<(), MeetingError> {
        if !self.status.can_transition_to(target) {
            return Err(MeetingError::InvalidTransition {
                id: self.id,
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Whether a real (non-error) summary is present.
    pub fn has_summary(&self) -> bool {
        !self.summary.trim().is_empty() && !self.summary_is_error()
    }

    /// Whether the summary field holds a failure description.
    pub fn summary_is_error(&self) -> bool {
        self.summary.starts_with(SUMMARY_ERROR_PREFIX)
    }

    /// Find a task by ID.
    pub fn task(&self, task_id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Find a task by ID, mutably.
    pub fn task_mut(&mut self, task_id: Uuid) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }
}

/// Resolved identity performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub display_name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// The explicit non-human identity for internally triggered operations.
    /// There is no implicit default-user fallback anywhere.
    pub fn system() -> Self {
        Self::new("system", "System")
    }
}

/// Outcome of a neutralization attempt, as recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityOutcome {
    Success,
    Failure,
}

/// Kind of audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Neutralization,
    System,
}

/// Append-only audit record, written on every terminal neutralization
/// outcome. Never read back by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub actor_id: String,
    pub actor_name: String,
    pub task_id: Uuid,
    pub meeting_id: Uuid,
    pub previous_state: TaskStatus,
    pub new_state: TaskStatus,
    /// Executive summary from the agent, success entries only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_summary: Option<String>,
    pub outcome: ActivityOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEntry {
    /// Audit record for a successful neutralization.
    pub fn neutralization_success(
        actor: &Actor,
        meeting_id: Uuid,
        task_id: Uuid,
        previous_state: TaskStatus,
        agent_summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ActivityKind::Neutralization,
            actor_id: actor.id.clone(),
            actor_name: actor.display_name.clone(),
            task_id,
            meeting_id,
            previous_state,
            new_state: TaskStatus::Done,
            agent_summary: Some(agent_summary.into()),
            outcome: ActivityOutcome::Success,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Audit record for a failed neutralization.
    pub fn neutralization_failure(
        actor: &Actor,
        meeting_id: Uuid,
        task_id: Uuid,
        previous_state: TaskStatus,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ActivityKind::Neutralization,
            actor_id: actor.id.clone(),
            actor_name: actor.display_name.clone(),
            task_id,
            meeting_id,
            previous_state,
            new_state: TaskStatus::Failed,
            agent_summary: None,
            outcome: ActivityOutcome::Failure,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Parameters for creating a meeting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMeeting {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Parameters for manually adding a task to a meeting.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub description: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

/// A task joined with its parent meeting's identity, for cross-meeting
/// listings.
#[derive(Debug, Clone, Serialize)]
pub struct TaskWithMeeting {
    #[serde(flatten)]
    pub task: Task,
    pub meeting_id: Uuid,
    pub meeting_title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meeting_transitions_valid() {
        assert!(MeetingStatus::Scheduled.can_transition_to(MeetingStatus::Live));
        assert!(MeetingStatus::Scheduled.can_transition_to(MeetingStatus::Ended));
        assert!(MeetingStatus::Live.can_transition_to(MeetingStatus::Ended));
        assert!(MeetingStatus::Ended.can_transition_to(MeetingStatus::Summarized));
        assert!(MeetingStatus::Ended.can_transition_to(MeetingStatus::Failed));
        assert!(MeetingStatus::Failed.can_transition_to(MeetingStatus::Summarized));
        assert!(MeetingStatus::Failed.can_transition_to(MeetingStatus::Failed));
    }

    #[test]
    fn meeting_transitions_invalid() {
        assert!(!MeetingStatus::Summarized.can_transition_to(MeetingStatus::Ended));
        assert!(!MeetingStatus::Summarized.can_transition_to(MeetingStatus::Failed));
        assert!(!MeetingStatus::Scheduled.can_transition_to(MeetingStatus::Summarized));
        assert!(!MeetingStatus::Live.can_transition_to(MeetingStatus::Scheduled));
        assert!(!MeetingStatus::Failed.can_transition_to(MeetingStatus::Live));
    }

    #[test]
    fn task_transitions_valid() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Neutralizing));
        assert!(TaskStatus::Failed.can_transition_to(TaskStatus::Neutralizing));
        assert!(TaskStatus::Neutralizing.can_transition_to(TaskStatus::Done));
        assert!(TaskStatus::Neutralizing.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn done_is_terminal() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(!TaskStatus::Done.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Done.can_transition_to(TaskStatus::Neutralizing));
        assert!(!TaskStatus::Done.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn failed_never_returns_to_pending() {
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Neutralizing.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn task_transition_to_enforces_machine() {
        let mut task = Task::new("Prepare deck");
        task.transition_to(TaskStatus::Neutralizing).unwrap();
        task.transition_to(TaskStatus::Done).unwrap();
        let err = task.transition_to(TaskStatus::Neutralizing).unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { .. }));
        assert_eq!(task.status, TaskStatus::Done);
    }

    #[test]
    fn new_task_defaults() {
        let task = Task::new("Send notes");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.assignee, UNASSIGNED);
        assert!(task.due_date.is_none());
        assert!(task.agent_output.is_empty());
        assert_eq!(task.confidence_score, 0);
        assert!(task.next_steps.is_empty());
    }

    #[test]
    fn meeting_summary_sentinel() {
        let mut meeting = Meeting::new("Standup", "", Utc::now());
        assert!(!meeting.has_summary());

        meeting.summary = "Error generating summary: boom".to_string();
        assert!(meeting.summary_is_error());
        assert!(!meeting.has_summary());

        meeting.summary = "## 1. Meeting Overview\n…".to_string();
        assert!(meeting.has_summary());
    }

    #[test]
    fn meeting_task_lookup() {
        let mut meeting = Meeting::new("Planning", "", Utc::now());
        let task = Task::new("Book room");
        let id = task.id;
        meeting.tasks.push(task);

        assert!(meeting.task(id).is_some());
        assert!(meeting.task(Uuid::new_v4()).is_none());

        meeting.task_mut(id).unwrap().status = TaskStatus::Done;
        assert_eq!(meeting.task(id).unwrap().status, TaskStatus::Done);
    }

    #[test]
    fn status_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&MeetingStatus::Summarized).unwrap(),
            "\"summarized\""
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::Neutralizing).unwrap(),
            "\"neutralizing\""
        );
        let parsed: TaskStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(parsed, TaskStatus::Pending);
    }

    #[test]
    fn meeting_serde_roundtrip() {
        let mut meeting = Meeting::new("Kickoff", "Q3 goals", Utc::now());
        meeting.tasks.push(Task::new("Draft roadmap").with_assignee("Alice"));
        let json = serde_json::to_string(&meeting).unwrap();
        let parsed: Meeting = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, meeting.id);
        assert_eq!(parsed.tasks.len(), 1);
        assert_eq!(parsed.tasks[0].assignee, "Alice");
        assert_eq!(parsed.status, MeetingStatus::Scheduled);
    }

    #[test]
    fn activity_entry_success_shape() {
        let actor = Actor::new("u1", "Alex");
        let entry = ActivityEntry::neutralization_success(
            &actor,
            Uuid::new_v4(),
            Uuid::new_v4(),
            TaskStatus::Pending,
            "Drafted the follow-up email",
        );
        assert_eq!(entry.outcome, ActivityOutcome::Success);
        assert_eq!(entry.new_state, TaskStatus::Done);
        assert!(entry.error.is_none());
        assert!(entry.agent_summary.is_some());
    }

    #[test]
    fn activity_entry_failure_shape() {
        let actor = Actor::system();
        let entry = ActivityEntry::neutralization_failure(
            &actor,
            Uuid::new_v4(),
            Uuid::new_v4(),
            TaskStatus::Failed,
            "inference call timed out",
        );
        assert_eq!(entry.outcome, ActivityOutcome::Failure);
        assert_eq!(entry.new_state, TaskStatus::Failed);
        assert_eq!(entry.previous_state, TaskStatus::Failed);
        assert!(entry.agent_summary.is_none());
        assert_eq!(entry.error.as_deref(), Some("inference call timed out"));
    }
}
