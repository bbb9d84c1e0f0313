//! libcurl-backed connector (via the `curl` crate).
//!
//! Issues the GET, reads only the response head, and stops the transfer as
//! soon as the final header block is complete. Keeping the body open and
//! decoding events is left to the consumer of the stream.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::parse::HeadCollector;
use super::{Connector, ResponseHead};
use crate::endpoint::AttemptRequest;
use crate::retry::{classify_curl_error, StreamError, TransportKind};

/// Connect timeout used when the config does not set one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// How long a connected server may stay silent before the response head
/// arrives, when the config does not set it.
pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REDIRECTS: u32 = 10;

/// Production connector. Runs in the calling thread; `ConnectionAttempt`
/// puts it on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct CurlConnector {
    connect_timeout: Duration,
    header_timeout: Duration,
}

impl Default for CurlConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl CurlConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            header_timeout: DEFAULT_HEADER_TIMEOUT,
        }
    }

    /// Fail the attempt with a timeout when no bytes arrive for this long
    /// (curl's low-speed check, whole seconds, at least one).
    pub fn with_header_timeout(mut self, header_timeout: Duration) -> Self {
        self.header_timeout = header_timeout;
        self
    }
}

fn setup_error(e: curl::Error) -> StreamError {
    StreamError::transport(TransportKind::Other, format!("request setup failed: {e}"))
}

impl Connector for CurlConnector {
    fn open(
        &self,
        request: &AttemptRequest,
        cancel: &CancellationToken,
    ) -> Result<ResponseHead, StreamError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(&request.url).map_err(setup_error)?;
        easy.get(true).map_err(setup_error)?;
        easy.follow_location(true).map_err(setup_error)?;
        easy.max_redirections(MAX_REDIRECTS).map_err(setup_error)?;
        easy.connect_timeout(self.connect_timeout)
            .map_err(setup_error)?;
        // A server that accepts and then stays silent trips CURLE_OPERATION_TIMEDOUT.
        easy.low_speed_limit(1).map_err(setup_error)?;
        easy.low_speed_time(Duration::from_secs(self.header_timeout.as_secs().max(1)))
            .map_err(setup_error)?;
        // Progress callbacks are how a blocked transfer notices cancellation.
        easy.progress(true).map_err(setup_error)?;

        let mut list = curl::easy::List::new();
        for (k, v) in &request.headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))
                .map_err(setup_error)?;
        }
        if !request.headers.is_empty() {
            easy.http_headers(list).map_err(setup_error)?;
        }

        let mut collector = HeadCollector::default();
        let perform_result = {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| collector.push_line(data))
                .map_err(setup_error)?;
            transfer
                .write_function(|data| Ok(data.len()))
                .map_err(setup_error)?;
            transfer
                .progress_function(|_, _, _, _| !cancel.is_cancelled())
                .map_err(setup_error)?;
            transfer.perform()
        };

        if let Err(e) = perform_result {
            // Aborting from the header callback surfaces as a write error.
            if !collector.is_complete() {
                if cancel.is_cancelled() {
                    return Err(StreamError::Cancelled);
                }
                let errno = easy.os_errno().unwrap_or(0);
                let kind = classify_curl_error(&e, errno);
                tracing::debug!(url = %request.url, errno, ?kind, "curl transfer failed: {}", e);
                return Err(StreamError::transport(kind, e.to_string()));
            }
        }

        collector.finish().ok_or_else(|| {
            StreamError::transport(TransportKind::MalformedReply, "response carried no status line")
        })
    }
}
