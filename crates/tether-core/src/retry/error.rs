//! Stream connection error taxonomy.

use std::fmt;
use thiserror::Error;

/// Network-level failure recorded where the transport reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    DnsResolution,
    NetworkUnreachable,
    /// A proxy or gateway replied with nothing, or with something that is not HTTP.
    MalformedReply,
    /// Anything else (TLS setup, bad URL, redirect loop, ...). Not transient.
    Other,
}

impl TransportKind {
    /// True for the well-known transient conditions that are always worth retrying.
    pub fn is_transient(self) -> bool {
        !matches!(self, TransportKind::Other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::ConnectionRefused => "connection refused",
            TransportKind::ConnectionReset => "connection reset",
            TransportKind::Timeout => "timeout",
            TransportKind::DnsResolution => "dns resolution failed",
            TransportKind::NetworkUnreachable => "network unreachable",
            TransportKind::MalformedReply => "malformed reply",
            TransportKind::Other => "transport failure",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error produced by a connection attempt or by the reconnect loop around it.
///
/// Attempts return the raw variants (`Status`, `Protocol`, `Transport`); the
/// reconnect loop turns them into `RetriesExhausted` or `Fatal`.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Response status outside the success class.
    #[error("server returned status {code}")]
    Status { code: u32 },
    /// Response did not declare the event-stream media type.
    #[error("unexpected content type: {}", .content_type.as_deref().unwrap_or("<none>"))]
    Protocol { content_type: Option<String> },
    #[error("{kind}: {message}")]
    Transport { kind: TransportKind, message: String },
    /// Every attempt failed retryably.
    #[error("failed to connect after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<StreamError>,
    },
    /// Non-retryable failure; the loop stopped without consuming further attempts.
    #[error("non-retryable error: {message}")]
    Fatal {
        message: String,
        source: Option<Box<StreamError>>,
    },
    #[error("stream cancelled")]
    Cancelled,
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("invalid retry policy: {0}")]
    Config(String),
}

impl StreamError {
    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        StreamError::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Wrap a classified error as fatal. Already-terminal errors are returned unchanged.
    pub fn into_fatal(self) -> Self {
        if self.is_terminal() {
            return self;
        }
        StreamError::Fatal {
            message: self.to_string(),
            source: Some(Box::new(self)),
        }
    }

    /// Errors the reconnect loop never retries, whatever the configured tags say.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamError::RetriesExhausted { .. }
                | StreamError::Fatal { .. }
                | StreamError::Cancelled
                | StreamError::InvalidEndpoint(_)
                | StreamError::Config(_)
        )
    }

    /// Classification tag matched against `RetryPolicy::retryable_tags`.
    pub fn tag(&self) -> &'static str {
        super::classify::tag(self)
    }

    /// The attempt-level error behind a `Fatal` or `RetriesExhausted`, if any.
    pub fn cause(&self) -> Option<&StreamError> {
        match self {
            StreamError::RetriesExhausted { last, .. } => Some(last.as_ref()),
            StreamError::Fatal {
                source: Some(inner),
                ..
            } => Some(inner.as_ref()),
            _ => None,
        }
    }
}
