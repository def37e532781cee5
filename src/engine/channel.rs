//! Contract between the dispatcher and the database notification channel.
//!
//! Commands are fire-and-forget: the channel issues them and reports the
//! outcome later by calling back into the dispatcher on the control task.

use crate::error::Result;
use crate::model::WorkId;

/// Asynchronous command surface the dispatcher drives.
pub trait Channel {
    /// Whether a LISTEN on `channel` is currently confirmed.
    fn is_listening(&self, channel: &str) -> bool;

    /// Issue `LISTEN <channel>`. Outcome arrives via
    /// [`Dispatcher::on_listen_result`](super::Dispatcher::on_listen_result).
    fn listen(&mut self, channel: &str);

    /// Issue the heartbeat call. Outcome arrives via
    /// [`Dispatcher::on_heartbeat_result`](super::Dispatcher::on_heartbeat_result).
    fn heartbeat(&mut self);
}

/// Outcomes of asynchronous work, delivered back to the control task.
#[derive(Debug)]
pub enum ChannelEvent {
    /// The heartbeat command finished.
    Heartbeat(Result<()>),
    /// A work item's action finished. `Err` carries the failure reason.
    Finished {
        id: WorkId,
        outcome: std::result::Result<(), String>,
    },
}
