//! Notifications about object lifecycle.
//!
//! Events are human-readable and keyed by (object, reason, message); repeats
//! of the same event are counted instead of stored twice.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use dirsync_api::ObjectKey;

/// Reason for a dependency that is not ready yet.
pub const REASON_NOT_READY: &str = "NotReady";
/// Reason for a reconcile that ended in the Failed phase.
pub const REASON_FAILED: &str = "Failed";
/// Reason for an entry that was created or reached Ready.
pub const REASON_CREATED: &str = "Created";
/// Reason for an entry removed from the directory.
pub const REASON_DELETED: &str = "Deleted";
/// Reason for a directory root waiting on its server.
pub const REASON_PENDING: &str = "Pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub object: ObjectKey,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

impl Event {
    pub fn normal(object: &ObjectKey, reason: &str, message: impl Into<String>) -> Self {
        Self {
            object: object.clone(),
            event_type: EventType::Normal,
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(object: &ObjectKey, reason: &str, message: impl Into<String>) -> Self {
        Self {
            object: object.clone(),
            event_type: EventType::Warning,
            reason: reason.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: Event);
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

#[async_trait]
impl EventRecorder for LogRecorder {
    async fn record(&self, event: Event) {
        match event.event_type {
            EventType::Normal => info!(
                object = %event.object,
                reason = %event.reason,
                "{}",
                event.message
            ),
            EventType::Warning => warn!(
                object = %event.object,
                reason = %event.reason,
                "{}",
                event.message
            ),
        }
    }
}

/// A recorded event and how often it was seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub event: Event,
    pub count: u32,
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<BTreeMap<(ObjectKey, String, String), RecordedEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().await.values().cloned().collect()
    }

    /// Events recorded for one object.
    pub async fn events_for(&self, object: &ObjectKey) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .await
            .values()
            .filter(|recorded| &recorded.event.object == object)
            .cloned()
            .collect()
    }

    /// Whether `object` has an event with `reason`.
    pub async fn has_reason(&self, object: &ObjectKey, reason: &str) -> bool {
        self.events_for(object)
            .await
            .iter()
            .any(|recorded| recorded.event.reason == reason)
    }
}

#[async_trait]
impl EventRecorder for MemoryRecorder {
    async fn record(&self, event: Event) {
        let key = (
            event.object.clone(),
            event.reason.clone(),
            event.message.clone(),
        );
        self.events
            .lock()
            .await
            .entry(key)
            .and_modify(|recorded| recorded.count += 1)
            .or_insert(RecordedEvent { event, count: 1 });
    }
}
