//! In-memory store backend.
//!
//! Backs unit tests and ephemeral dev runs. `save` performs the same
//! compare-and-swap on the meeting version that the libSQL backend expresses
//! in its `UPDATE … WHERE version = ?` guard.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::meetings::model::{ActivityEntry, Meeting};
use crate::notify::Notification;
use crate::store::traits::{ActivityLog, MeetingStore, NotificationSink};

/// In-memory implementation of all three store traits.
#[derive(Default)]
pub struct MemoryStore {
    meetings: Mutex<HashMap<Uuid, Meeting>>,
    activity: Mutex<Vec<ActivityEntry>>,
    notifications: Mutex<Vec<Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit log (test inspection).
    pub async fn activity_entries(&self) -> Vec<ActivityEntry> {
        self.activity.lock().await.clone()
    }

    /// Snapshot of pushed notifications (test inspection).
    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().await.clone()
    }
}

#[async_trait]
impl MeetingStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Meeting, StoreError> {
        self.meetings
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::meeting_not_found(id))
    }

    async fn insert(&self, meeting: &Meeting) -> Result<(), StoreError> {
        let mut meetings = self.meetings.lock().await;
        if meetings.contains_key(&meeting.id) {
            return Err(StoreError::Query(format!(
                "meeting {} already exists",
                meeting.id
            )));
        }
        meetings.insert(meeting.id, meeting.clone());
        Ok(())
    }

    async fn save(&self, meeting: &Meeting) -> Result<Meeting, StoreError> {
        let mut meetings = self.meetings.lock().await;
        let stored = meetings
            .get_mut(&meeting.id)
            .ok_or_else(|| StoreError::meeting_not_found(meeting.id))?;

        if stored.version != meeting.version {
            return Err(StoreError::meeting_conflict(meeting.id));
        }

        let mut updated = meeting.clone();
        updated.version += 1;
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<Meeting>, StoreError> {
        let mut all: Vec<Meeting> = self.meetings.lock().await.values().cloned().collect();
        all.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(all)
    }
}

#[async_trait]
impl ActivityLog for MemoryStore {
    async fn append(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        self.activity.lock().await.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for MemoryStore {
    async fn push(&self, notification: &Notification) -> Result<(), StoreError> {
        self.notifications.lock().await.push(notification.clone());
        Ok(())
    }
}
