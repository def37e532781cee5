//! Work actions: what a started work item actually does.
//!
//! The dispatcher only knows that an item has a callback. The control plane
//! binds that callback to a [`WorkAction`], runs it on its own task and
//! reports the result back. Talking to the messaging API lives behind this
//! trait and is supplied by the embedding application.

use std::future::Future;

use tracing::info;

use crate::error::Result;
use crate::model::WorkTicket;

/// An external action performed for a work item.
///
/// Implementations must check [`WorkTicket::is_allowed`] before any
/// externally visible effect: a ticket whose item timed out or was cancelled
/// reads false, and the action must then do nothing.
pub trait WorkAction: Send + Sync + 'static {
    fn perform(&self, ticket: &WorkTicket) -> impl Future<Output = Result<()>> + Send;
}

/// Acknowledges each item by logging its payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAction;

impl WorkAction for LogAction {
    async fn perform(&self, ticket: &WorkTicket) -> Result<()> {
        if !ticket.is_allowed() {
            return Ok(());
        }
        info!(work_id = %ticket.id(), payload = %ticket.payload(), "bot notification");
        Ok(())
    }
}
