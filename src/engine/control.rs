//! Control plane: owns the clock, the listener connection and OS signals,
//! and feeds all of them to the dispatcher on a single task.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::postgres::PgListener;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Span, info};

use super::channel::ChannelEvent;
use super::dispatcher::{
    Dispatcher, DispatcherConfig, LISTEN_CHANNEL, TickOutcome, WorkHandler, later,
};
use crate::action::WorkAction;
use crate::db::{Db, PgChannel};
use crate::error::{Error, Result};
use crate::model::{Signals, WorkTicket};
use crate::telemetry::work::{record_outcome, start_work_span};

/// Produces fresh dispatcher settings on SIGHUP.
pub type Reloader = Arc<dyn Fn() -> Result<DispatcherConfig> + Send + Sync>;

/// Configuration for the control plane.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Clock tick driving checks, sweeps and heartbeats.
    pub tick_interval: Duration,
    /// Longest a LISTEN may take before it counts as a failed subscribe.
    pub listen_timeout: Duration,
    pub dispatcher: DispatcherConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            listen_timeout: Duration::from_secs(5),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

/// The control loop: listen for notifications, tick the dispatcher, run actions.
pub struct ControlPlane<A: WorkAction> {
    db: Arc<Db>,
    action: Arc<A>,
    config: ControlConfig,
    shutdown: Arc<Notify>,
    reloader: Option<Reloader>,
}

impl<A: WorkAction> Clone for ControlPlane<A> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            action: Arc::clone(&self.action),
            config: self.config.clone(),
            shutdown: Arc::clone(&self.shutdown),
            reloader: self.reloader.clone(),
        }
    }
}

impl<A: WorkAction> ControlPlane<A> {
    pub fn new(db: Arc<Db>, action: Arc<A>, config: ControlConfig) -> Self {
        Self {
            db,
            action,
            config,
            shutdown: Arc::new(Notify::new()),
            reloader: None,
        }
    }

    /// Source of new settings when a reconfigure signal arrives.
    pub fn with_reloader(mut self, reloader: Reloader) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Ask the loop to finish queued work and return.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run until shutdown has been requested and the queue is empty.
    pub async fn run(&self) -> Result<()> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let channel = PgChannel::new(Arc::clone(&self.db), events_tx.clone());
        let mut dispatcher = Dispatcher::new(
            self.config.dispatcher.clone(),
            channel,
            self.work_handler(events_tx),
        );

        let mut listener = PgListener::connect_with(self.db.pool()).await?;
        let mut os_signals = OsSignals::install()?;
        let mut pending = Signals::default();
        // Set after a listener error; the listener is not polled until then.
        let mut listener_retry_at: Option<Instant> = None;

        let period = self.config.tick_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            channel = LISTEN_CHANNEL,
            max_queue = dispatcher.max_queue(),
            "control plane started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    pending.terminate = true;
                }
                received = os_signals.recv() => {
                    pending.merge(received);
                }
                _ = ticker.tick() => {
                    let now = Instant::now();
                    if listener_retry_at.is_some_and(|at| now >= at) {
                        listener_retry_at = None;
                    }
                    let signals = std::mem::take(&mut pending);
                    if signals.reconfigure {
                        self.reconfigure(&mut dispatcher);
                    }
                    if dispatcher.tick(now, signals) == TickOutcome::Stop {
                        break;
                    }
                }
                received = listener.try_recv(), if listener_retry_at.is_none() => {
                    let now = Instant::now();
                    match received {
                        Ok(Some(notification)) => {
                            dispatcher.on_notify(now, notification.channel(), notification.payload());
                        }
                        Ok(None) => {
                            // Reconnects on the next try_recv.
                            dispatcher.channel_mut().mark_lost();
                            dispatcher.on_connection_error(
                                now,
                                &Error::Other("listener connection closed".to_string()),
                            );
                        }
                        Err(e) => {
                            dispatcher.channel_mut().mark_lost();
                            dispatcher.on_connection_error(now, &Error::from(e));
                            listener_retry_at = Some(later(now, dispatcher.config().fatal_backoff));
                        }
                    }
                }
                Some(event) = events_rx.recv() => {
                    dispatcher.on_event(Instant::now(), event);
                }
            }

            self.flush_listens(&mut dispatcher, &mut listener).await;
        }

        info!("control plane stopped");
        Ok(())
    }

    /// Bind started items to the action, each on its own task.
    fn work_handler(&self, events: UnboundedSender<ChannelEvent>) -> WorkHandler {
        let action = Arc::clone(&self.action);
        Arc::new(move |ticket: WorkTicket| {
            let action = Arc::clone(&action);
            let events = events.clone();
            let span = start_work_span(&ticket.id());
            tokio::spawn(
                async move {
                    let outcome = action.perform(&ticket).await.map_err(|e| e.to_string());
                    record_outcome(&Span::current(), &outcome);
                    let _ = events.send(ChannelEvent::Finished {
                        id: ticket.id(),
                        outcome,
                    });
                }
                .instrument(span),
            );
        })
    }

    /// Send parked LISTEN requests over the listener connection.
    async fn flush_listens(
        &self,
        dispatcher: &mut Dispatcher<PgChannel>,
        listener: &mut PgListener,
    ) {
        for channel in dispatcher.channel_mut().take_pending() {
            let result = bounded(self.config.listen_timeout, listener.listen(&channel)).await;
            if result.is_ok() {
                dispatcher.channel_mut().mark_listening(&channel);
            }
            dispatcher.on_listen_result(result);
        }
    }

    fn reconfigure(&self, dispatcher: &mut Dispatcher<PgChannel>) {
        let Some(reloader) = &self.reloader else {
            return;
        };
        match reloader() {
            Ok(config) => dispatcher.reconfigure(config),
            Err(e) => dispatcher.report_error(&e),
        }
    }
}

/// Await a database call for at most `limit`.
///
/// # Errors
///
/// The call's own error, or [`Error::Other`] once `limit` has elapsed.
pub async fn bounded<T, E>(
    limit: Duration,
    call: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    Error: From<E>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::Other(format!("timed out after {} ms", limit.as_millis()))),
    }
}

/// Unix signals mapped onto [`Signals`].
struct OsSignals {
    terminate: Signal,
    interrupt: Signal,
    quit: Signal,
    hangup: Signal,
    user1: Signal,
}

impl OsSignals {
    fn install() -> Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            quit: signal(SignalKind::quit())?,
            hangup: signal(SignalKind::hangup())?,
            user1: signal(SignalKind::user_defined1())?,
        })
    }

    async fn recv(&mut self) -> Signals {
        tokio::select! {
            _ = self.terminate.recv() => Signals::terminate(),
            _ = self.interrupt.recv() => Signals::terminate(),
            _ = self.quit.recv() => Signals {
                quit: true,
                ..Signals::default()
            },
            _ = self.hangup.recv() => Signals::reconfigure(),
            _ = self.user1.recv() => Signals {
                reopen_logs: true,
                ..Signals::default()
            },
        }
    }
}
