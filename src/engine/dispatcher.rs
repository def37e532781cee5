//! Dispatcher: subscription upkeep, queue draining, timeout sweeps,
//! heartbeats and fault recovery.
//!
//! Everything here runs on a single control task. Methods take `&mut self`
//! and never block; asynchronous outcomes re-enter through the `on_*`
//! methods with the time they were observed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::{debug, error, info, warn};

use super::channel::{Channel, ChannelEvent};
use super::queue::WorkQueue;
use crate::config::MAX_INTERVAL;
use crate::error::Error;
use crate::model::{ProcessStatus, Retirement, Signals, WorkCallback, WorkId, WorkItem, WorkTicket};
use crate::telemetry::metrics;

/// The notification channel the dispatcher listens on.
pub const LISTEN_CHANNEL: &str = "tg_bot";

/// Shared handler bound into every notification-created item.
pub type WorkHandler = Arc<dyn Fn(WorkTicket) + Send + Sync>;

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum number of items executing at once.
    pub max_queue: usize,
    /// Spacing between heartbeats while running.
    pub heartbeat_interval: Duration,
    /// Deadline given to items created from notifications.
    pub item_timeout: Option<Duration>,
    /// Quiet period after a fatal error.
    pub fatal_backoff: Duration,
    /// Spacing between subscription checks.
    pub check_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_queue: crate::config::DEFAULT_POOL_SIZE,
            heartbeat_interval: Duration::from_millis(5_000),
            item_timeout: Some(Duration::from_millis(15_000)),
            fatal_backoff: Duration::from_secs(10),
            check_interval: Duration::from_secs(60),
        }
    }
}

/// `now + delay`, saturating at [`MAX_INTERVAL`] past `now` when the sum
/// does not fit in an `Instant`.
pub(crate) fn later(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(MAX_INTERVAL))
        .unwrap_or(now)
}

/// What the driver should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Shutdown was requested and all work has been retired.
    Stop,
}

/// The dispatcher state machine.
pub struct Dispatcher<C: Channel> {
    channel: C,
    handler: WorkHandler,
    queue: WorkQueue,
    config: DispatcherConfig,
    progress: usize,
    check_date: Option<Instant>,
    call_date: Option<Instant>,
    status: ProcessStatus,
    subscribing: bool,
    shutting_down: bool,
    last_error: Option<String>,
}

impl<C: Channel> Dispatcher<C> {
    pub fn new(config: DispatcherConfig, channel: C, handler: WorkHandler) -> Self {
        Self {
            channel,
            handler,
            queue: WorkQueue::new(),
            config,
            progress: 0,
            check_date: None,
            call_date: None,
            status: ProcessStatus::Stopped,
            subscribing: false,
            shutting_down: false,
            last_error: None,
        }
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    /// Number of items whose callback is running.
    pub fn progress(&self) -> usize {
        self.progress
    }

    pub fn max_queue(&self) -> usize {
        self.config.max_queue
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Next subscription check. `None` means due now.
    pub fn check_date(&self) -> Option<Instant> {
        self.check_date
    }

    /// Next heartbeat. `None` means due now.
    pub fn call_date(&self) -> Option<Instant> {
        self.call_date
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    // -----------------------------------------------------------------------
    // Subscription
    // -----------------------------------------------------------------------

    /// Issue LISTEN unless one is already in flight.
    pub fn ensure_subscribed(&mut self) {
        if self.subscribing {
            return;
        }
        self.subscribing = true;
        debug!(channel = LISTEN_CHANNEL, "subscribing");
        self.channel.listen(LISTEN_CHANNEL);
    }

    /// Re-subscribe if the listen was lost, at most once per check interval.
    pub fn check_subscription(&mut self, now: Instant) {
        if self.check_date.is_some_and(|date| now < date) {
            return;
        }
        self.check_date = Some(later(now, self.config.check_interval));

        if !self.channel.is_listening(LISTEN_CHANNEL) || self.status == ProcessStatus::Stopped {
            self.ensure_subscribed();
        }
    }

    /// Outcome of a LISTEN issued by [`ensure_subscribed`](Self::ensure_subscribed).
    pub fn on_listen_result(&mut self, result: crate::error::Result<()>) {
        if !self.subscribing {
            // Superseded by a fatal error or reload while in flight.
            debug!(?result, "ignoring stale subscribe result");
            return;
        }
        self.subscribing = false;

        match result {
            Ok(()) => {
                if self.status != ProcessStatus::Running {
                    info!(channel = LISTEN_CHANNEL, "subscription confirmed, running");
                }
                self.status = ProcessStatus::Running;
            }
            Err(e) => self.report_error(&e),
        }
    }

    /// Route an inbound notification. Returns the id of the created item.
    pub fn on_notify(&mut self, now: Instant, channel: &str, extra: &str) -> Option<WorkId> {
        if channel != LISTEN_CHANNEL {
            debug!(channel, "ignoring notification on foreign channel");
            record_notification("ignored");
            return None;
        }
        if self.shutting_down {
            warn!(channel, "shutting down, notification dropped");
            record_notification("rejected");
            return None;
        }

        let payload = serde_json::from_str(extra).unwrap_or_else(|e| {
            warn!(error = %e, "notification payload is not JSON, keeping raw text");
            serde_json::Value::String(extra.to_string())
        });
        record_notification("accepted");

        let deadline = self.config.item_timeout.map(|timeout| later(now, timeout));
        let handler = Arc::clone(&self.handler);
        let id = self.enqueue(payload, deadline, Box::new(move |ticket| handler(ticket)));

        self.drain(now);
        Some(id)
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    /// Register a new item. It runs on the next drain with free capacity.
    pub fn enqueue(
        &mut self,
        payload: serde_json::Value,
        deadline: Option<Instant>,
        callback: WorkCallback,
    ) -> WorkId {
        let id = self.queue.push(WorkItem::new(payload, deadline, callback));
        debug!(work_id = %id, queued = self.queue.len(), "work queued");
        id
    }

    /// Start eligible items front to back until the cap is reached.
    /// Returns the number of callbacks invoked.
    pub fn drain(&mut self, now: Instant) -> usize {
        let mut started = 0;
        for item in self.queue.iter_mut() {
            if self.progress >= self.config.max_queue {
                break;
            }
            if item.start(now) {
                self.progress += 1;
                started += 1;
                debug!(work_id = %item.id(), progress = self.progress, "work started");
            }
        }
        if started > 0 {
            metrics::work_dispatched().add(started as u64, &[]);
        }
        started
    }

    /// Evict every item whose deadline has passed, newest first.
    /// Returns the evicted ids in eviction order.
    pub fn sweep(&mut self, now: Instant) -> Vec<WorkId> {
        let expired = self.queue.expired(now);
        for &id in &expired {
            self.retire(now, id, Retirement::TimedOut);
        }
        if !expired.is_empty() {
            self.drain(now);
        }
        expired
    }

    /// The item's work succeeded. Returns false if it was already retired.
    pub fn complete(&mut self, now: Instant, id: WorkId) -> bool {
        self.finish(now, id, Retirement::Completed)
    }

    /// The item's work failed. Returns false if it was already retired.
    pub fn fail(&mut self, now: Instant, id: WorkId, reason: impl Into<String>) -> bool {
        self.finish(now, id, Retirement::Failed(reason.into()))
    }

    /// Close an item whether or not it is running.
    pub fn cancel(&mut self, now: Instant, id: WorkId) -> bool {
        self.finish(now, id, Retirement::Cancelled)
    }

    fn finish(&mut self, now: Instant, id: WorkId, retirement: Retirement) -> bool {
        let retired = self.retire(now, id, retirement);
        if retired {
            self.drain(now);
        }
        retired
    }

    /// Single retirement point: remove, tombstone, release capacity.
    fn retire(&mut self, now: Instant, id: WorkId, retirement: Retirement) -> bool {
        let Some(mut item) = self.queue.remove(id) else {
            debug!(work_id = %id, %retirement, "work already retired");
            return false;
        };
        item.close();

        if let Some(started_at) = item.started_at() {
            self.progress = self.progress.saturating_sub(1);
            metrics::work_duration_ms().record(
                now.saturating_duration_since(started_at).as_secs_f64() * 1000.0,
                &[KeyValue::new("reason", retirement.label())],
            );
        }
        metrics::work_retired().add(1, &[KeyValue::new("reason", retirement.label())]);

        match &retirement {
            Retirement::Completed => {
                debug!(work_id = %id, progress = self.progress, "work completed")
            }
            Retirement::Failed(reason) => {
                warn!(work_id = %id, progress = self.progress, %reason, "work failed")
            }
            Retirement::TimedOut => warn!(
                work_id = %id,
                progress = self.progress,
                received_at = %item.received_at(),
                "work timed out"
            ),
            Retirement::Cancelled => {
                info!(work_id = %id, progress = self.progress, "work cancelled")
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------------

    /// Emit a heartbeat if running and due.
    pub fn heartbeat(&mut self, now: Instant) {
        if self.status != ProcessStatus::Running {
            return;
        }
        if self.call_date.is_some_and(|date| now < date) {
            return;
        }
        self.call_date = Some(later(now, self.config.heartbeat_interval));
        debug!("heartbeat");
        self.channel.heartbeat();
    }

    /// Outcome of a heartbeat. Any failure is fatal.
    pub fn on_heartbeat_result(&mut self, now: Instant, result: crate::error::Result<()>) {
        match result {
            Ok(()) => metrics::heartbeats().add(1, &[KeyValue::new("result", "ok")]),
            Err(e) => {
                metrics::heartbeats().add(1, &[KeyValue::new("result", "error")]);
                self.fatal(now, &e);
            }
        }
    }

    /// Route an asynchronous outcome to its handler.
    pub fn on_event(&mut self, now: Instant, event: ChannelEvent) {
        match event {
            ChannelEvent::Heartbeat(result) => self.on_heartbeat_result(now, result),
            ChannelEvent::Finished { id, outcome: Ok(()) } => {
                self.complete(now, id);
            }
            ChannelEvent::Finished {
                id,
                outcome: Err(reason),
            } => {
                self.fail(now, id, reason);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Fault recovery
    // -----------------------------------------------------------------------

    /// Transport-level failure. Fatal only while running.
    pub fn on_connection_error(&mut self, now: Instant, error: &Error) {
        if self.status == ProcessStatus::Running {
            self.fatal(now, error);
        } else {
            self.report_error(error);
        }
    }

    /// Stop and hold off new subscription and heartbeat attempts for the
    /// backoff period. Queue bookkeeping is left alone.
    pub fn fatal(&mut self, now: Instant, error: &Error) {
        self.check_date = Some(later(now, self.config.fatal_backoff));
        self.call_date = None;
        self.status = ProcessStatus::Stopped;
        self.subscribing = false;
        self.last_error = Some(error.to_string());

        metrics::fatal_errors().add(1, &[]);
        error!(error = %error, "fatal error");
        info!(
            backoff_secs = self.config.fatal_backoff.as_secs(),
            "continue after backoff"
        );
    }

    /// Non-fatal error: log only.
    pub fn report_error(&mut self, error: &Error) {
        self.last_error = Some(error.to_string());
        error!(error = %error, "dispatcher error");
    }

    /// Force re-subscription on the next tick.
    pub fn reload(&mut self) {
        self.check_date = None;
        self.call_date = None;
        self.status = ProcessStatus::Stopped;
        self.subscribing = false;
        info!("successful reloading");
    }

    /// Replace tuning. Takes effect from the next drain or tick.
    pub fn reconfigure(&mut self, config: DispatcherConfig) {
        if config != self.config {
            info!(
                max_queue = config.max_queue,
                heartbeat_ms = config.heartbeat_interval.as_millis() as u64,
                "dispatcher reconfigured"
            );
        }
        self.config = config;
    }

    /// Stop accepting notifications. Queued work still runs.
    pub fn begin_shutdown(&mut self) {
        if !self.shutting_down {
            info!(queued = self.queue.len(), "gracefully shutting down");
            self.shutting_down = true;
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Periodic step: signals, then check, drain, sweep, heartbeat.
    pub fn tick(&mut self, now: Instant, signals: Signals) -> TickOutcome {
        if signals.terminate || signals.quit {
            self.begin_shutdown();
        }
        if signals.reconfigure {
            debug!("reconfiguring");
            self.reload();
        }
        if signals.reopen_logs {
            debug!("reopening logs");
        }

        self.check_subscription(now);
        self.drain(now);
        self.sweep(now);
        self.heartbeat(now);

        if self.shutting_down && self.queue.is_empty() {
            info!("stop dispatcher");
            TickOutcome::Stop
        } else {
            TickOutcome::Continue
        }
    }
}

fn record_notification(result: &'static str) {
    metrics::notifications().add(1, &[KeyValue::new("result", result)]);
}
