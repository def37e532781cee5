//! Postgres implementation of the notification channel.
//!
//! Heartbeats run on the shared pool in their own task. LISTEN has to go
//! over the listener connection owned by the control loop, so requests are
//! parked here and flushed by the loop after each dispatcher step.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::Db;
use crate::engine::{Channel, ChannelEvent};

pub struct PgChannel {
    db: Arc<Db>,
    events: UnboundedSender<ChannelEvent>,
    listening: HashSet<String>,
    pending: Vec<String>,
}

impl PgChannel {
    pub fn new(db: Arc<Db>, events: UnboundedSender<ChannelEvent>) -> Self {
        Self {
            db,
            events,
            listening: HashSet::new(),
            pending: Vec::new(),
        }
    }

    /// LISTEN requests not yet sent to the listener connection.
    pub fn take_pending(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    /// Record a confirmed LISTEN.
    pub fn mark_listening(&mut self, channel: &str) {
        self.listening.insert(channel.to_string());
    }

    /// The listener connection dropped; every listen must be re-issued.
    pub fn mark_lost(&mut self) {
        if !self.listening.is_empty() {
            debug!(channels = ?self.listening, "listener connection lost");
        }
        self.listening.clear();
    }
}

impl Channel for PgChannel {
    fn is_listening(&self, channel: &str) -> bool {
        self.listening.contains(channel)
    }

    fn listen(&mut self, channel: &str) {
        if !self.pending.iter().any(|c| c == channel) {
            self.pending.push(channel.to_string());
        }
    }

    fn heartbeat(&mut self) {
        let db = Arc::clone(&self.db);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = db.heartbeat().await;
            // Receiver gone means the control loop has exited.
            let _ = events.send(ChannelEvent::Heartbeat(result));
        });
    }
}
