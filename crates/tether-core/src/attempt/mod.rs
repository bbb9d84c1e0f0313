//! A single connection attempt against a stream endpoint.
//!
//! The blocking transport (`Connector`) runs on tokio's blocking pool; the
//! async side races it against the stream's cancellation token, turns a
//! panicking connector into a fatal error, and validates the response head
//! (success status, `text/event-stream` media type).

mod parse;
mod transport;

use std::any::Any;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::endpoint::{AttemptRequest, StreamEndpoint};
use crate::retry::StreamError;

pub use transport::{CurlConnector, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEADER_TIMEOUT};

/// Media type a successful stream response must declare.
pub const EVENT_STREAM_MEDIA_TYPE: &str = "text/event-stream";

/// Status and declared content type of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u32,
    pub content_type: Option<String>,
}

/// Blocking transport that opens one stream request and reports the response head.
///
/// Implementations must return promptly (with any error) once `cancel` fires,
/// and map transport failures to `StreamError::Transport` with the right kind.
pub trait Connector: Send + Sync + 'static {
    fn open(
        &self,
        request: &AttemptRequest,
        cancel: &CancellationToken,
    ) -> Result<ResponseHead, StreamError>;
}

/// Runs single connection attempts through a shared connector.
#[derive(Clone)]
pub struct ConnectionAttempt {
    connector: Arc<dyn Connector>,
}

impl ConnectionAttempt {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Issue `request` once and validate the response head.
    pub async fn open(
        &self,
        request: AttemptRequest,
        cancel: &CancellationToken,
    ) -> Result<ResponseHead, StreamError> {
        if cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        let connector = Arc::clone(&self.connector);
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || connector.open(&request, &token));

        // On cancellation the blocking task is detached; connectors observe
        // the same token and wind down on their own.
        let head = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            joined = task => match joined {
                Ok(result) => result?,
                Err(e) if e.is_panic() => {
                    return Err(StreamError::Fatal {
                        message: format!(
                            "connection attempt panicked: {}",
                            panic_message(e.into_panic().as_ref())
                        ),
                        source: None,
                    });
                }
                Err(e) => {
                    return Err(StreamError::Fatal {
                        message: format!("connection attempt aborted: {e}"),
                        source: None,
                    });
                }
            },
        };

        validate(&head)?;
        Ok(head)
    }

    /// One attempt for an owned endpoint; marks it connected on success.
    pub async fn connect(
        &self,
        endpoint: &mut StreamEndpoint,
        cancel: &CancellationToken,
    ) -> Result<ResponseHead, StreamError> {
        let head = self.open(endpoint.request(), cancel).await?;
        endpoint.set_connected(true);
        Ok(head)
    }
}

/// Success class is 2xx except 204, which servers use to say "stop reconnecting".
fn validate(head: &ResponseHead) -> Result<(), StreamError> {
    if !(200..300).contains(&head.status) || head.status == 204 {
        return Err(StreamError::Status { code: head.status });
    }
    if !parse::is_event_stream(head.content_type.as_deref()) {
        return Err(StreamError::Protocol {
            content_type: head.content_type.clone(),
        });
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_string()
}
