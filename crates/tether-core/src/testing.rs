//! Scripted connectors for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::attempt::{Connector, ResponseHead, EVENT_STREAM_MEDIA_TYPE};
use crate::endpoint::AttemptRequest;
use crate::retry::{StreamError, TransportKind};

pub(crate) fn event_stream_head() -> ResponseHead {
    ResponseHead {
        status: 200,
        content_type: Some(EVENT_STREAM_MEDIA_TYPE.to_string()),
    }
}

pub(crate) fn refused() -> StreamError {
    StreamError::transport(TransportKind::ConnectionRefused, "connection refused")
}

enum Fallback {
    Head(ResponseHead),
    Err(fn() -> StreamError),
    Panic,
    BlockUntilCancelled,
}

/// Connector that replays a script of outcomes, then repeats a fallback.
/// Records every request it receives.
pub(crate) struct ScriptedConnector {
    script: Mutex<VecDeque<Result<ResponseHead, StreamError>>>,
    fallback: Fallback,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<AttemptRequest>>,
}

impl ScriptedConnector {
    fn with_fallback(fallback: Fallback) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn always_ok() -> Self {
        Self::with_fallback(Fallback::Head(event_stream_head()))
    }

    pub(crate) fn always_head(head: ResponseHead) -> Self {
        Self::with_fallback(Fallback::Head(head))
    }

    pub(crate) fn always_err(make: fn() -> StreamError) -> Self {
        Self::with_fallback(Fallback::Err(make))
    }

    pub(crate) fn panicking() -> Self {
        Self::with_fallback(Fallback::Panic)
    }

    pub(crate) fn blocking_until_cancelled() -> Self {
        Self::with_fallback(Fallback::BlockUntilCancelled)
    }

    /// Outcomes returned, in order, before the fallback kicks in.
    pub(crate) fn then_script(
        self,
        outcomes: impl IntoIterator<Item = Result<ResponseHead, StreamError>>,
    ) -> Self {
        self.script.lock().unwrap().extend(outcomes);
        self
    }

    /// Sleep this long inside every attempt (on the blocking thread).
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<AttemptRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Connector for ScriptedConnector {
    fn open(
        &self,
        request: &AttemptRequest,
        cancel: &CancellationToken,
    ) -> Result<ResponseHead, StreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            return outcome;
        }
        match &self.fallback {
            Fallback::Head(head) => Ok(head.clone()),
            Fallback::Err(make) => Err(make()),
            Fallback::Panic => panic!("scripted connector panic"),
            Fallback::BlockUntilCancelled => {
                while !cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(StreamError::Cancelled)
            }
        }
    }
}
