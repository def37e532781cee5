//! Core data model.
//!
//! A work item is one unit of dispatchable work created from a database
//! notification. The dispatcher moves through two process states and reads
//! OS signals as plain values handed to it on every tick.

pub mod work;

pub use work::{Retirement, WorkCallback, WorkId, WorkItem, WorkTicket};

// ---------------------------------------------------------------------------
// Process status
// ---------------------------------------------------------------------------

/// Whether the dispatcher currently holds a confirmed subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessStatus {
    /// No confirmed subscription. Heartbeats are not emitted.
    #[default]
    Stopped,
    /// Subscription confirmed; heartbeats flow.
    Running,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Process signals observed since the previous tick.
///
/// The bootstrap side collects these from the OS and passes them in
/// explicitly; the dispatcher never reads process-wide state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    /// SIGTERM / SIGINT.
    pub terminate: bool,
    /// SIGQUIT: graceful shutdown.
    pub quit: bool,
    /// SIGHUP: reload configuration.
    pub reconfigure: bool,
    /// SIGUSR1: reopen log files.
    pub reopen_logs: bool,
}

impl Signals {
    pub fn terminate() -> Self {
        Self {
            terminate: true,
            ..Self::default()
        }
    }

    pub fn reconfigure() -> Self {
        Self {
            reconfigure: true,
            ..Self::default()
        }
    }

    /// True if no signal is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold signals received later into this set.
    pub fn merge(&mut self, other: Signals) {
        self.terminate |= other.terminate;
        self.quit |= other.quit;
        self.reconfigure |= other.reconfigure;
        self.reopen_logs |= other.reopen_logs;
    }
}
