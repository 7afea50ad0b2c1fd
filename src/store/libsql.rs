//! libSQL backend — async store trait implementations.
//!
//! Meetings are stored one row per meeting with the task sequence embedded
//! as a JSON column (tasks have no identity outside their meeting, so they
//! live and die with the row). Optimistic concurrency rides on a `version`
//! column: `save` updates `WHERE id = ? AND version = ?` and reports a
//! conflict when no row matched.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::meetings::model::{ActivityEntry, Meeting, MeetingStatus, Task};
use crate::notify::Notification;
use crate::store::traits::{ActivityLog, MeetingStore, NotificationSink};

/// libSQL store backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("Failed to create database directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for stmt in SCHEMA {
            self.conn
                .execute(stmt, ())
                .await
                .map_err(|e| StoreError::Query(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS meetings (
        id          TEXT PRIMARY KEY,
        title       TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        date        TEXT NOT NULL,
        status      TEXT NOT NULL,
        audio_path  TEXT,
        summary     TEXT NOT NULL DEFAULT '',
        tasks       TEXT NOT NULL DEFAULT '[]',
        version     INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS activity_log (
        id             TEXT PRIMARY KEY,
        kind           TEXT NOT NULL,
        actor_id       TEXT NOT NULL,
        actor_name     TEXT NOT NULL,
        task_id        TEXT NOT NULL,
        meeting_id     TEXT NOT NULL,
        previous_state TEXT NOT NULL,
        new_state      TEXT NOT NULL,
        agent_summary  TEXT,
        outcome        TEXT NOT NULL,
        error          TEXT,
        timestamp      TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS notifications (
        id         TEXT PRIMARY KEY,
        kind       TEXT NOT NULL,
        title      TEXT NOT NULL,
        message    TEXT NOT NULL,
        link       TEXT NOT NULL DEFAULT '',
        metadata   TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_activity_meeting ON activity_log (meeting_id)",
];

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn status_to_str(status: MeetingStatus) -> &'static str {
    match status {
        MeetingStatus::Scheduled => "scheduled",
        MeetingStatus::Live => "live",
        MeetingStatus::Ended => "ended",
        MeetingStatus::Failed => "failed",
        MeetingStatus::Summarized => "summarized",
    }
}

fn str_to_status(s: &str) -> MeetingStatus {
    match s {
        "live" => MeetingStatus::Live,
        "ended" => MeetingStatus::Ended,
        "failed" => MeetingStatus::Failed,
        "summarized" => MeetingStatus::Summarized,
        _ => MeetingStatus::Scheduled,
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Serialization(format!("invalid uuid {s}: {e}")))
}

/// Map a libsql row to a Meeting.
///
/// Column order: 0:id, 1:title, 2:description, 3:date, 4:status,
/// 5:audio_path, 6:summary, 7:tasks, 8:version, 9:created_at, 10:updated_at
fn row_to_meeting(row: &libsql::Row) -> Result<Meeting, StoreError> {
    let read = |e: libsql::Error| StoreError::Query(format!("row read failed: {e}"));

    let id_str: String = row.get(0).map_err(read)?;
    let title: String = row.get(1).map_err(read)?;
    let description: String = row.get(2).map_err(read)?;
    let date_str: String = row.get(3).map_err(read)?;
    let status_str: String = row.get(4).map_err(read)?;
    let audio_path: Option<String> = row.get(5).ok();
    let summary: String = row.get(6).map_err(read)?;
    let tasks_json: String = row.get(7).map_err(read)?;
    let version: i64 = row.get(8).map_err(read)?;
    let created_str: String = row.get(9).map_err(read)?;
    let updated_str: String = row.get(10).map_err(read)?;

    let tasks: Vec<Task> = serde_json::from_str(&tasks_json)
        .map_err(|e| StoreError::Serialization(format!("invalid tasks column: {e}")))?;

    Ok(Meeting {
        id: parse_uuid(&id_str)?,
        title,
        description,
        date: parse_datetime(&date_str),
        status: str_to_status(&status_str),
        audio_path: audio_path.filter(|p| !p.is_empty()),
        summary,
        tasks,
        version: version.max(0) as u64,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn tasks_to_json(tasks: &[Task]) -> Result<String, StoreError> {
    serde_json::to_string(tasks)
        .map_err(|e| StoreError::Serialization(format!("failed to encode tasks: {e}")))
}

const MEETING_COLUMNS: &str =
    "id, title, description, date, status, audio_path, summary, tasks, version, created_at, updated_at";

#[async_trait]
impl MeetingStore for LibSqlStore {
    async fn get(&self, id: Uuid) -> Result<Meeting, StoreError> {
        let sql = format!("SELECT {MEETING_COLUMNS} FROM meetings WHERE id = ?1");
        let mut rows = self
            .conn()
            .query(&sql, params![id.to_string()])
            .await
            .map_err(|e| StoreError::Query(format!("get meeting failed: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get meeting failed: {e}")))?
        {
            Some(row) => row_to_meeting(&row),
            None => Err(StoreError::meeting_not_found(id)),
        }
    }

    async fn insert(&self, meeting: &Meeting) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO meetings (id, title, description, date, status, audio_path,
                 summary, tasks, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    meeting.id.to_string(),
                    meeting.title.clone(),
                    meeting.description.clone(),
                    meeting.date.to_rfc3339(),
                    status_to_str(meeting.status),
                    meeting.audio_path.clone(),
                    meeting.summary.clone(),
                    tasks_to_json(&meeting.tasks)?,
                    meeting.version as i64,
                    meeting.created_at.to_rfc3339(),
                    meeting.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert meeting failed: {e}")))?;
        Ok(())
    }

    async fn save(&self, meeting: &Meeting) -> Result<Meeting, StoreError> {
        let mut updated = meeting.clone();
        updated.version = meeting.version + 1;
        updated.updated_at = Utc::now();

        let affected = self
            .conn()
            .execute(
                "UPDATE meetings
                 SET title = ?1, description = ?2, date = ?3, status = ?4,
                     audio_path = ?5, summary = ?6, tasks = ?7, version = ?8,
                     updated_at = ?9
                 WHERE id = ?10 AND version = ?11",
                params![
                    updated.title.clone(),
                    updated.description.clone(),
                    updated.date.to_rfc3339(),
                    status_to_str(updated.status),
                    updated.audio_path.clone(),
                    updated.summary.clone(),
                    tasks_to_json(&updated.tasks)?,
                    updated.version as i64,
                    updated.updated_at.to_rfc3339(),
                    meeting.id.to_string(),
                    meeting.version as i64,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("save meeting failed: {e}")))?;

        if affected == 0 {
            // Distinguish a vanished row from a version mismatch.
            return match self.get(meeting.id).await {
                Ok(_) => Err(StoreError::meeting_conflict(meeting.id)),
                Err(StoreError::NotFound { .. }) => {
                    Err(StoreError::meeting_not_found(meeting.id))
                }
                Err(other) => Err(other),
            };
        }

        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<Meeting>, StoreError> {
        let sql = format!("SELECT {MEETING_COLUMNS} FROM meetings ORDER BY date DESC");
        let mut rows = self
            .conn()
            .query(&sql, ())
            .await
            .map_err(|e| StoreError::Query(format!("list meetings failed: {e}")))?;

        let mut meetings = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("list meetings failed: {e}")))?
        {
            meetings.push(row_to_meeting(&row)?);
        }
        Ok(meetings)
    }
}

#[async_trait]
impl ActivityLog for LibSqlStore {
    async fn append(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        let outcome = match entry.outcome {
            crate::meetings::model::ActivityOutcome::Success => "success",
            crate::meetings::model::ActivityOutcome::Failure => "failure",
        };
        let kind = match entry.kind {
            crate::meetings::model::ActivityKind::Neutralization => "neutralization",
            crate::meetings::model::ActivityKind::System => "system",
        };
        self.conn()
            .execute(
                "INSERT INTO activity_log (id, kind, actor_id, actor_name, task_id,
                 meeting_id, previous_state, new_state, agent_summary, outcome, error, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    entry.id.to_string(),
                    kind,
                    entry.actor_id.clone(),
                    entry.actor_name.clone(),
                    entry.task_id.to_string(),
                    entry.meeting_id.to_string(),
                    entry.previous_state.to_string(),
                    entry.new_state.to_string(),
                    entry.agent_summary.clone(),
                    outcome,
                    entry.error.clone(),
                    entry.timestamp.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append activity failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for LibSqlStore {
    async fn push(&self, notification: &Notification) -> Result<(), StoreError> {
        let kind = match notification.kind {
            crate::notify::NotificationKind::Summary => "summary",
            crate::notify::NotificationKind::Task => "task",
            crate::notify::NotificationKind::System => "system",
        };
        let metadata = serde_json::to_string(&notification.metadata)
            .map_err(|e| StoreError::Serialization(format!("failed to encode metadata: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO notifications (id, kind, title, message, link, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    notification.id.to_string(),
                    kind,
                    notification.title.clone(),
                    notification.message.clone(),
                    notification.link.clone(),
                    metadata,
                    notification.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("push notification failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meetings::model::{Actor, TaskStatus};

    #[tokio::test]
    async fn roundtrip_meeting() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut meeting = Meeting::new("Kickoff", "Q3 goals", Utc::now());
        meeting
            .tasks
            .push(Task::new("Draft roadmap").with_assignee("Alice"));
        store.insert(&meeting).await.unwrap();

        let fetched = store.get(meeting.id).await.unwrap();
        assert_eq!(fetched.title, "Kickoff");
        assert_eq!(fetched.tasks.len(), 1);
        assert_eq!(fetched.tasks[0].assignee, "Alice");
        assert_eq!(fetched.tasks[0].status, TaskStatus::Pending);
        assert_eq!(fetched.version, 0);
    }

    #[tokio::test]
    async fn save_bumps_version_and_detects_conflict() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let meeting = Meeting::new("Standup", "", Utc::now());
        store.insert(&meeting).await.unwrap();

        let mut first = store.get(meeting.id).await.unwrap();
        let mut second = store.get(meeting.id).await.unwrap();

        first.summary = "first".to_string();
        let saved = store.save(&first).await.unwrap();
        assert_eq!(saved.version, 1);

        second.summary = "second".to_string();
        let err = store.save(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let stored = store.get(meeting.id).await.unwrap();
        assert_eq!(stored.summary, "first");
    }

    #[tokio::test]
    async fn save_missing_meeting_is_not_found() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let meeting = Meeting::new("Ghost", "", Utc::now());
        let err = store.save(&meeting).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn audio_path_roundtrip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut meeting = Meeting::new("Recorded", "", Utc::now());
        meeting.audio_path = Some("uploads/meetings/abc.webm".to_string());
        store.insert(&meeting).await.unwrap();

        let fetched = store.get(meeting.id).await.unwrap();
        assert_eq!(
            fetched.audio_path.as_deref(),
            Some("uploads/meetings/abc.webm")
        );
    }

    #[tokio::test]
    async fn append_activity_and_notification() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let actor = Actor::new("u1", "Alex");
        let entry = ActivityEntry::neutralization_failure(
            &actor,
            Uuid::new_v4(),
            Uuid::new_v4(),
            TaskStatus::Pending,
            "timed out",
        );
        store.append(&entry).await.unwrap();

        let n = Notification::summary_complete(Uuid::new_v4(), "Retro", 2);
        store.push(&n).await.unwrap();
    }

    #[tokio::test]
    async fn list_orders_by_date_desc() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let older = Meeting::new("Older", "", Utc::now() - chrono::Duration::days(1));
        let newer = Meeting::new("Newer", "", Utc::now());
        store.insert(&older).await.unwrap();
        store.insert(&newer).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "Newer");
    }

    #[tokio::test]
    async fn new_local_creates_parent_dirs_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/meeting-assist.db");

        let store = LibSqlStore::new_local(&path).await.unwrap();
        let meeting = Meeting::new("Persisted", "", Utc::now());
        store.insert(&meeting).await.unwrap();
        drop(store);

        let reopened = LibSqlStore::new_local(&path).await.unwrap();
        let fetched = reopened.get(meeting.id).await.unwrap();
        assert_eq!(fetched.title, "Persisted");
    }

    #[test]
    fn datetime_parsing_fallbacks() {
        let rfc = parse_datetime("2025-01-10T12:30:00+00:00");
        assert_eq!(rfc.to_rfc3339(), "2025-01-10T12:30:00+00:00");
        let sqlite = parse_datetime("2025-01-10 12:30:00");
        assert_eq!(sqlite.to_rfc3339(), "2025-01-10T12:30:00+00:00");
    }
}
