//! Work items: payload, tombstone flag, deadline and one-shot callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

/// The function that performs an item's work. Runs at most once.
pub type WorkCallback = Box<dyn FnOnce(WorkTicket) + Send>;

/// Handle given to a callback when its item is started.
///
/// Cloneable and `Send`, so it can travel into a spawned task. Before taking
/// any externally visible action the holder must check [`WorkTicket::is_allowed`]:
/// once the item is retired the flag reads false and the action is skipped.
#[derive(Debug, Clone)]
pub struct WorkTicket {
    id: WorkId,
    payload: Arc<serde_json::Value>,
    allowed: Arc<AtomicBool>,
}

impl WorkTicket {
    pub fn id(&self) -> WorkId {
        self.id
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed.load(Ordering::Acquire)
    }
}

/// One pending or in-flight unit of work.
pub struct WorkItem {
    id: WorkId,
    payload: Arc<serde_json::Value>,
    allowed: Arc<AtomicBool>,
    deadline: Option<Instant>,
    callback: Option<WorkCallback>,
    received_at: DateTime<Utc>,
    started_at: Option<Instant>,
}

impl WorkItem {
    pub fn new(
        payload: serde_json::Value,
        deadline: Option<Instant>,
        callback: WorkCallback,
    ) -> Self {
        Self {
            id: WorkId::new(),
            payload: Arc::new(payload),
            allowed: Arc::new(AtomicBool::new(true)),
            deadline,
            callback: Some(callback),
            received_at: Utc::now(),
            started_at: None,
        }
    }

    pub fn id(&self) -> WorkId {
        self.id
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed.load(Ordering::Acquire)
    }

    /// True once the callback has been invoked.
    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// When the callback was invoked, if it was.
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Invoke the callback. Returns false if it already ran or the item was closed.
    pub(crate) fn start(&mut self, now: Instant) -> bool {
        if !self.is_allowed() {
            return false;
        }
        let Some(callback) = self.callback.take() else {
            return false;
        };
        self.started_at = Some(now);
        callback(WorkTicket {
            id: self.id,
            payload: Arc::clone(&self.payload),
            allowed: Arc::clone(&self.allowed),
        });
        true
    }

    /// Tombstone the item. Any ticket still held by a running callback reads
    /// `is_allowed() == false` from here on.
    pub(crate) fn close(&mut self) {
        self.allowed.store(false, Ordering::Release);
        self.callback = None;
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .field("allowed", &self.is_allowed())
            .field("deadline", &self.deadline)
            .field("started", &self.is_started())
            .field("received_at", &self.received_at)
            .finish()
    }
}

/// Why an item left the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retirement {
    Completed,
    Failed(String),
    TimedOut,
    Cancelled,
}

impl Retirement {
    /// Short label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Retirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
