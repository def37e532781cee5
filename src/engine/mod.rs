//! Dispatcher engine: work queue, notification channel contract, the
//! dispatcher state machine and the async control loop that drives it.

pub mod channel;
pub mod control;
pub mod dispatcher;
pub mod queue;

pub use channel::{Channel, ChannelEvent};
pub use control::{ControlConfig, ControlPlane, bounded};
pub use dispatcher::{
    Dispatcher, DispatcherConfig, LISTEN_CHANNEL, TickOutcome, WorkHandler,
};
pub use queue::WorkQueue;
