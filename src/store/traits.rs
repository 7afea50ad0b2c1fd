//! Backend-agnostic persistence traits.
//!
//! The core only needs atomic read-modify-write of a meeting record plus
//! append-only sinks for audit entries and notifications; each is a separate
//! trait because the consumers are separate (the engine writes audit entries
//! it never reads, the pipeline only pushes notifications).

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::meetings::model::{ActivityEntry, Meeting};
use crate::notify::Notification;

/// Meeting persistence with optimistic concurrency.
#[async_trait]
pub trait MeetingStore: Send + Sync {
    /// Fetch a meeting by ID.
    async fn get(&self, id: Uuid) -> Result<Meeting, StoreError>;

    /// Insert a newly created meeting.
    async fn insert(&self, meeting: &Meeting) -> Result<(), StoreError>;

    /// Save a modified meeting.
    ///
    /// The write succeeds only if the stored version still matches
    /// `meeting.version`; otherwise `StoreError::Conflict` is returned and
    /// nothing is written. On success the returned copy carries the bumped
    /// version.
    async fn save(&self, meeting: &Meeting) -> Result<Meeting, StoreError>;

    /// List all meetings, most recent first.
    async fn list(&self) -> Result<Vec<Meeting>, StoreError>;
}

/// Append-only audit log. Entries are never mutated or deleted.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(&self, entry: &ActivityEntry) -> Result<(), StoreError>;
}

/// Notification sink. Callers treat pushes as fire-and-forget.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn push(&self, notification: &Notification) -> Result<(), StoreError>;
}
