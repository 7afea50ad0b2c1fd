//! Task neutralization engine.
//!
//! Drives a single task through `pending|failed → neutralizing → done|failed`
//! with a bounded-timeout inference call, exactly one retry, and an
//! audit-logged rollback on terminal failure.
//!
//! Exclusivity is enforced purely through the persisted `neutralizing`
//! marker: the claim write is an optimistic compare-and-swap on the meeting
//! version, so of two concurrent invocations exactly one reaches the
//! inference call and the other is rejected with a conflict. Timed-out
//! inference futures are dropped, and every terminal write re-checks that
//! the task is still `neutralizing`, so a late completion can never clobber
//! a state the timeout path already wrote.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::quota::RateLimiter;
use crate::error::{InferenceError, QuotaError, Result, StoreError, TaskError};
use crate::inference::{GenerateRequest, InferenceProvider};
use crate::meetings::model::{ActivityEntry, Actor, Meeting, Task, TaskStatus};
use crate::notify::{Notification, send_best_effort};
use crate::store::{ActivityLog, MeetingStore, NotificationSink};

/// Structured response the agent prompt demands.
#[derive(Debug, Deserialize)]
struct AgentResolution {
    /// Executive summary of what was done (goes to the audit log).
    summary: String,
    /// The actual draft/solution (becomes `agent_output`).
    resolution: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    next_steps: Vec<String>,
}

/// Autonomous task-resolution engine.
pub struct Neutralizer {
    store: Arc<dyn MeetingStore>,
    inference: Arc<dyn InferenceProvider>,
    activity: Arc<dyn ActivityLog>,
    notifications: Arc<dyn NotificationSink>,
    quota: Arc<RateLimiter>,
    call_timeout: Duration,
    max_retries: u32,
}

impl Neutralizer {
    pub fn new(
        store: Arc<dyn MeetingStore>,
        inference: Arc<dyn InferenceProvider>,
        activity: Arc<dyn ActivityLog>,
        notifications: Arc<dyn NotificationSink>,
        quota: Arc<RateLimiter>,
        call_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            inference,
            activity,
            notifications,
            quota,
            call_timeout,
            max_retries,
        }
    }

    /// Attempt to autonomously resolve one task.
    ///
    /// Returns the updated task on success. On terminal failure the task is
    /// rolled back to `failed` with the detailed reason stored on it, and
    /// the error returned to the caller is deliberately generic.
    pub async fn neutralize(
        &self,
        meeting_id: Uuid,
        task_id: Uuid,
        actor: &Actor,
    ) -> Result<Task> {
        // Quota gate. Rejection happens before any fetch or mutation.
        if !self.quota.allow(&actor.id) {
            return Err(QuotaError::Exhausted {
                actor_id: actor.id.clone(),
            }
            .into());
        }

        info!(
            meeting_id = %meeting_id,
            task_id = %task_id,
            actor = %actor.display_name,
            "Neutralization requested"
        );

        let (meeting, previous) = self.claim(meeting_id, task_id).await?;
        let prompt = build_agent_prompt(&meeting, task_id)?;

        match self.call_with_retry(&prompt).await {
            Ok(resolution) => {
                match self
                    .complete(meeting_id, task_id, actor, previous, resolution)
                    .await
                {
                    Ok(task) => Ok(task),
                    Err(e) => {
                        // The resolution could not be persisted; treat it as a
                        // terminal failure so the lock is not left dangling.
                        self.fail(
                            meeting_id,
                            task_id,
                            actor,
                            previous,
                            format!("failed to persist resolution: {e}"),
                        )
                        .await
                    }
                }
            }
            Err(e) => {
                self.fail(meeting_id, task_id, actor, previous, e.to_string())
                    .await
            }
        }
    }

    /// Atomically transition `pending|failed → neutralizing`.
    ///
    /// The version-checked save is the critical section: any interleaved
    /// writer since our read makes it fail, and the invocation is rejected
    /// with a conflict instead of proceeding to inference.
    async fn claim(&self, meeting_id: Uuid, task_id: Uuid) -> Result<(Meeting, TaskStatus)> {
        let mut meeting = self.store.get(meeting_id).await?;
        let task = meeting
            .task_mut(task_id)
            .ok_or(TaskError::NotFound {
                meeting_id,
                task_id,
            })?;

        let previous = task.status;
        match previous {
            TaskStatus::Done => {
                return Err(TaskError::AlreadyComplete { task_id }.into());
            }
            TaskStatus::Neutralizing => {
                return Err(TaskError::NeutralizationInFlight { task_id }.into());
            }
            TaskStatus::Pending | TaskStatus::Failed => {}
        }

        task.transition_to(TaskStatus::Neutralizing)?;

        match self.store.save(&meeting).await {
            Ok(saved) => Ok((saved, previous)),
            Err(StoreError::Conflict { .. }) => {
                Err(TaskError::NeutralizationInFlight { task_id }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Bounded inference call with exactly `max_retries` additional attempts.
    /// A timed-out attempt's future is dropped; its eventual completion is
    /// never observed.
    async fn call_with_retry(&self, prompt: &str) -> std::result::Result<AgentResolution, InferenceError> {
        let mut attempt = 0u32;
        loop {
            let request = GenerateRequest::new(prompt);
            let result = tokio::time::timeout(self.call_timeout, self.inference.generate(request))
                .await
                .map_err(|_| InferenceError::Timeout {
                    timeout: self.call_timeout,
                })
                .and_then(|r| r)
                .and_then(|text| parse_agent_response(&text));

            match result {
                Ok(resolution) => return Ok(resolution),
                Err(e) if attempt >= self.max_retries => return Err(e),
                Err(e) => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Retrying neutralization inference call");
                    let jitter = rand::thread_rng().gen_range(50..250);
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                }
            }
        }
    }

    async fn complete(
        &self,
        meeting_id: Uuid,
        task_id: Uuid,
        actor: &Actor,
        previous: TaskStatus,
        resolution: AgentResolution,
    ) -> Result<Task> {
        let confidence = resolution.confidence.clamp(0.0, 100.0).round() as u8;
        let task = self
            .write_terminal(meeting_id, task_id, |task| {
                task.transition_to(TaskStatus::Done)?;
                task.agent_output = resolution.resolution.clone();
                task.confidence_score = confidence;
                task.next_steps = resolution.next_steps.clone();
                task.failure_reason.clear();
                Ok(())
            })
            .await?;

        info!(
            meeting_id = %meeting_id,
            task_id = %task_id,
            confidence,
            "Task neutralized"
        );

        let entry = ActivityEntry::neutralization_success(
            actor,
            meeting_id,
            task_id,
            previous,
            resolution.summary,
        );
        if let Err(e) = self.activity.append(&entry).await {
            warn!(error = %e, "Failed to append success audit entry");
        }

        send_best_effort(
            &self.notifications,
            Notification::task_status_changed(meeting_id, &task, None),
        )
        .await;

        Ok(task)
    }

    /// Roll back to `failed` (never silently back to `pending`; the distinct
    /// state preserves that an attempt happened), then audit and notify.
    async fn fail(
        &self,
        meeting_id: Uuid,
        task_id: Uuid,
        actor: &Actor,
        previous: TaskStatus,
        reason: String,
    ) -> Result<Task> {
        warn!(
            meeting_id = %meeting_id,
            task_id = %task_id,
            reason = %reason,
            "Neutralization failed"
        );

        let rollback = self
            .write_terminal(meeting_id, task_id, |task| {
                task.transition_to(TaskStatus::Failed)?;
                task.failure_reason = reason.clone();
                Ok(())
            })
            .await;

        // The audit entry is written even when the rollback itself failed.
        let entry =
            ActivityEntry::neutralization_failure(actor, meeting_id, task_id, previous, &reason);
        if let Err(e) = self.activity.append(&entry).await {
            warn!(error = %e, "Failed to append failure audit entry");
        }

        match rollback {
            Ok(task) => {
                send_best_effort(
                    &self.notifications,
                    Notification::task_status_changed(meeting_id, &task, Some(&reason)),
                )
                .await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist neutralization rollback");
            }
        }

        Err(TaskError::NeutralizationFailed { task_id }.into())
    }

    /// Re-fetch and write a terminal task state. `apply` runs against the
    /// freshest copy; its transition check rejects the write if the task is
    /// no longer `neutralizing`. A version conflict triggers another round.
    async fn write_terminal<F>(&self, meeting_id: Uuid, task_id: Uuid, apply: F) -> Result<Task>
    where
        F: Fn(&mut Task) -> Result<()>,
    {
        let mut attempts = 0u32;
        loop {
            let mut meeting = self.store.get(meeting_id).await?;
            let task = meeting
                .task_mut(task_id)
                .ok_or(TaskError::NotFound {
                    meeting_id,
                    task_id,
                })?;
            apply(task)?;
            let snapshot = task.clone();
            match self.store.save(&meeting).await {
                Ok(_) => return Ok(snapshot),
                Err(StoreError::Conflict { .. }) if attempts < 2 => {
                    attempts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Task-resolution prompt demanding a JSON-shaped response.
fn build_agent_prompt(meeting: &Meeting, task_id: Uuid) -> Result<String> {
    let task = meeting.task(task_id).ok_or(TaskError::NotFound {
        meeting_id: meeting.id,
        task_id,
    })?;

    Ok(format!(
        r#"You are an autonomous task-resolution agent. Your mission is to resolve an action item from a meeting.

CONTEXT:
Meeting Title: {meeting_title}
Task: {description}
Assigned To: {assignee}

INSTRUCTIONS:
1. Solve the task or provide a high-quality draft/workflow to complete it.
2. Provide a confidence score (0-100) based on how complete your solution is.
3. Suggest next steps if any work remains.

FORMAT YOUR RESPONSE AS JSON:
{{
  "summary": "Clear executive summary of what you did",
  "resolution": "The actual draft/code/solution",
  "confidence": 85,
  "next_steps": ["Step 1", "Step 2"]
}}"#,
        meeting_title = meeting.title,
        description = task.description,
        assignee = task.assignee,
    ))
}

/// Parse the agent's JSON reply, tolerating markdown code fences.
fn parse_agent_response(text: &str) -> std::result::Result<AgentResolution, InferenceError> {
    let stripped = strip_code_fences(text);
    let resolution: AgentResolution =
        serde_json::from_str(stripped).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("agent reply was not the expected JSON shape: {e}"),
        })?;

    if resolution.resolution.trim().is_empty() {
        return Err(InferenceError::MalformedResponse {
            reason: "agent reply had an empty resolution".to_string(),
        });
    }
    Ok(resolution)
}

/// Remove a surrounding ```json … ``` fence if present.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
