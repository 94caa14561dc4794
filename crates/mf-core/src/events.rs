//! Task event stream.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late subscribers can catch up on
//! tasks that started before they connected.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::{TaskId, UserId};
use crate::job::JobKind;
use crate::media::FileKind;
use crate::session::Stage;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

/// Audience category for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Operator-only events (startup recovery, maintenance).
    Admin,
    /// Events about a user's own tasks.
    User,
}

/// Payload describing what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Intake ---------------------------------------------------------------
    InputStaged {
        user_id: UserId,
        kind: FileKind,
        name: String,
    },

    // -- Task lifecycle -------------------------------------------------------
    TaskAdmitted {
        task_id: TaskId,
        user_id: UserId,
        job_kind: JobKind,
    },
    TaskStageChanged {
        task_id: TaskId,
        stage: Stage,
    },
    TaskProgress {
        task_id: TaskId,
        stage: Stage,
        /// Overall task progress, 0.0 to 100.0.
        progress: f32,
    },
    TaskCompleted {
        task_id: TaskId,
        /// Public link when the output went to object storage.
        link: Option<String>,
    },
    TaskFailed {
        task_id: TaskId,
        stage: Option<String>,
        error: String,
    },
    TaskCancelled {
        task_id: TaskId,
    },

    // -- Maintenance ----------------------------------------------------------
    OrphansReset {
        count: usize,
    },
}

impl EventPayload {
    /// Task the event belongs to, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            EventPayload::TaskAdmitted { task_id, .. }
            | EventPayload::TaskStageChanged { task_id, .. }
            | EventPayload::TaskProgress { task_id, .. }
            | EventPayload::TaskCompleted { task_id, .. }
            | EventPayload::TaskFailed { task_id, .. }
            | EventPayload::TaskCancelled { task_id } => Some(*task_id),
            EventPayload::InputStaged { .. } | EventPayload::OrphansReset { .. } => None,
        }
    }

    /// Whether the event ends its task's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventPayload::TaskCompleted { .. }
                | EventPayload::TaskFailed { .. }
                | EventPayload::TaskCancelled { .. }
        )
    }
}

/// A timestamped, categorised event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(category: EventCategory, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category,
            payload,
        }
    }
}

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// `capacity` sizes the broadcast channel, not the ring buffer.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, category: EventCategory, payload: EventPayload) {
        let event = Event::new(category, payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }

    /// Recent events for one task, oldest first.
    pub fn task_history(&self, task_id: TaskId) -> Vec<Event> {
        let recent = self.recent.read();
        recent
            .iter()
            .rev()
            .filter(|e| e.payload.task_id() == Some(task_id))
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
