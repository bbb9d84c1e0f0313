//! Reconnecting stream: retry loop, cancellation, and health monitoring.
//!
//! Each stream owns its endpoint and a cancellation token. The token is
//! shared by the backoff wait, the in-flight attempt, and the health
//! monitor, so `disconnect()` stops all three at once.
//!
//! ```text
//! Idle ─connect()─► Connecting ─ok─► Connected ─mark_dropped()─► Connecting
//!                       │  ▲                                         │
//!                       │  └── retryable, budget left: sleep ────────┘
//!                       └─ fatal / exhausted / disconnect() ─► Disconnected
//! ```
//!
//! The health monitor retries a `Disconnected` stream on its next tick
//! unless the stream was stopped with `disconnect()`.

mod status;

pub use status::{StreamState, StreamStatus};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::attempt::{ConnectionAttempt, Connector};
use crate::endpoint::StreamEndpoint;
use crate::retry::{RetryDecision, RetryPolicy, StreamError};

struct Inner {
    endpoint: StreamEndpoint,
    state: StreamState,
    attempt_count: u32,
    last_error: Option<String>,
}

/// One named event stream that reconnects on its own.
pub struct ReconnectingStream {
    name: String,
    policy: Arc<RetryPolicy>,
    attempt: ConnectionAttempt,
    inner: Mutex<Inner>,
    /// Keeps attempts strictly sequential when the registry and the monitor
    /// both call `connect()`.
    connect_serial: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ReconnectingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingStream")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ReconnectingStream {
    pub fn new(
        name: impl Into<String>,
        endpoint: StreamEndpoint,
        policy: Arc<RetryPolicy>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            name: name.into(),
            policy,
            attempt: ConnectionAttempt::new(connector),
            inner: Mutex::new(Inner {
                endpoint,
                state: StreamState::Idle,
                attempt_count: 0,
                last_error: None,
            }),
            connect_serial: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            monitor: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect, retrying transient failures with backoff.
    ///
    /// Returns `Fatal` on the first non-retryable error, `RetriesExhausted`
    /// after `max_retries + 1` failed attempts, and `Cancelled` once
    /// `disconnect()` has been called. All three leave the stream
    /// `Disconnected`.
    pub async fn connect(&self) -> Result<(), StreamError> {
        let _serial = tokio::select! {
            guard = self.connect_serial.lock() => guard,
            _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
        };
        if self.cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        {
            let mut inner = self.lock();
            if inner.endpoint.is_connected() {
                return Ok(());
            }
            inner.state = StreamState::Connecting;
            inner.attempt_count = 0;
        }

        let mut attempt_index: u32 = 0;
        loop {
            let request = self.lock().endpoint.request();
            let err = match self.attempt.open(request, &self.cancel).await {
                Ok(head) => {
                    {
                        let mut inner = self.lock();
                        // disconnect() may have landed while the attempt finished.
                        if self.cancel.is_cancelled() {
                            inner.endpoint.set_connected(false);
                            inner.state = StreamState::Disconnected;
                            return Err(StreamError::Cancelled);
                        }
                        inner.endpoint.set_connected(true);
                        inner.state = StreamState::Connected;
                        inner.attempt_count = 0;
                        inner.last_error = None;
                    }
                    tracing::info!(
                        stream = %self.name,
                        status = head.status,
                        attempts = attempt_index + 1,
                        "stream connected"
                    );
                    return Ok(());
                }
                Err(err) => err,
            };

            if matches!(err, StreamError::Cancelled) {
                self.finish_disconnected(None);
                return Err(StreamError::Cancelled);
            }

            tracing::warn!(
                stream = %self.name,
                attempt = attempt_index + 1,
                max_attempts = self.policy.max_retries.saturating_add(1),
                tag = err.tag(),
                "connection attempt failed: {}",
                err
            );

            match self.policy.decide(attempt_index, &err) {
                RetryDecision::Fatal => {
                    let err = err.into_fatal();
                    self.finish_disconnected(Some(&err));
                    return Err(err);
                }
                RetryDecision::Exhausted => {
                    let err = StreamError::RetriesExhausted {
                        attempts: attempt_index + 1,
                        last: Box::new(err),
                    };
                    self.finish_disconnected(Some(&err));
                    return Err(err);
                }
                RetryDecision::RetryAfter(delay) => {
                    self.lock().last_error = Some(err.to_string());
                    tracing::debug!(
                        stream = %self.name,
                        ?delay,
                        "retrying stream connection"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => {
                            self.finish_disconnected(None);
                            return Err(StreamError::Cancelled);
                        }
                    }
                    attempt_index += 1;
                    self.lock().attempt_count = attempt_index;
                }
            }
        }
    }

    fn finish_disconnected(&self, err: Option<&StreamError>) {
        let mut inner = self.lock();
        inner.endpoint.set_connected(false);
        inner.state = StreamState::Disconnected;
        if let Some(err) = err {
            inner.last_error = Some(err.to_string());
        }
    }

    /// Stop the stream: wakes any backoff wait, in-flight attempt, and the
    /// health monitor. Idempotent.
    pub fn disconnect(&self) {
        self.cancel.cancel();
        let mut inner = self.lock();
        let was = inner.state;
        inner.endpoint.set_connected(false);
        inner.state = StreamState::Disconnected;
        drop(inner);
        if was != StreamState::Disconnected {
            tracing::info!(stream = %self.name, "stream disconnected");
        }
    }

    /// `disconnect()`, then wait for the health monitor task to exit.
    pub async fn shutdown(&self) {
        self.disconnect();
        let handle = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(stream = %self.name, "health monitor task failed: {}", e);
            }
        }
    }

    /// Report that the live connection was lost. The next heartbeat reconnects.
    pub fn mark_dropped(&self) {
        let mut inner = self.lock();
        if inner.state == StreamState::Connected {
            inner.endpoint.set_connected(false);
            inner.state = StreamState::Connecting;
            drop(inner);
            tracing::warn!(stream = %self.name, "stream reported dropped");
        }
    }

    /// Check the connection every `heartbeat_interval` and reconnect when it
    /// is down. A failed reconnect run is logged and retried on a later tick.
    /// Returns only on cancellation.
    pub async fn monitor_health(&self) {
        let period = self.policy.heartbeat_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.cancel.cancelled() => break,
            }
            if self.is_connected() {
                continue;
            }
            tracing::info!(stream = %self.name, "stream connection lost, reconnecting");
            match self.connect().await {
                Ok(()) => {}
                Err(StreamError::Cancelled) => break,
                Err(err) => {
                    tracing::error!(stream = %self.name, tag = err.tag(), "stream reconnection failed: {}", err);
                }
            }
        }
        tracing::debug!(stream = %self.name, "health monitor stopped");
    }

    /// Spawn `monitor_health` on the current tokio runtime. No-op while a
    /// monitor is already running.
    pub fn start_health_monitoring(self: &Arc<Self>) {
        let mut slot = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let this = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { this.monitor_health().await }));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn state(&self) -> StreamState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.lock().endpoint.is_connected()
    }

    pub fn attempt_count(&self) -> u32 {
        self.lock().attempt_count
    }

    pub fn address(&self) -> String {
        self.lock().endpoint.address().to_string()
    }

    pub fn last_event_id(&self) -> String {
        self.lock().endpoint.last_event_id().to_string()
    }

    /// Record the last processed event; sent as `Last-Event-ID` on reconnect.
    pub fn set_last_event_id(&self, id: impl Into<String>) {
        self.lock().endpoint.set_last_event_id(id);
    }

    /// Set an outbound header; takes effect on the next attempt.
    pub fn set_header(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), StreamError> {
        self.lock().endpoint.set_header(name, value)
    }

    pub fn status(&self) -> StreamStatus {
        let inner = self.lock();
        StreamStatus {
            name: self.name.clone(),
            address: inner.endpoint.address().to_string(),
            state: inner.state,
            connected: inner.endpoint.is_connected(),
            attempt_count: inner.attempt_count,
            last_event_id: inner.endpoint.last_event_id().to_string(),
            last_error: inner.last_error.clone(),
        }
    }
}

/// Build a stream for `endpoint` and connect it before returning.
pub async fn connect_with_retry(
    name: impl Into<String>,
    endpoint: StreamEndpoint,
    policy: Arc<RetryPolicy>,
    connector: Arc<dyn Connector>,
) -> Result<Arc<ReconnectingStream>, StreamError> {
    let stream = Arc::new(ReconnectingStream::new(name, endpoint, policy, connector));
    stream.connect().await?;
    Ok(stream)
}
