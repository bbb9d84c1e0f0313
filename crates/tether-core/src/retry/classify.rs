//! Classify HTTP status and curl errors into retry tags and transport kinds.

use super::error::{StreamError, TransportKind};

/// Tag for a non-success HTTP status.
pub fn classify_http_status(code: u32) -> &'static str {
    match code {
        408 => "timeout",
        429 | 503 => "temporary_failure",
        500..=599 => "server_error",
        _ => "client_error",
    }
}

/// Classify a curl error. `os_errno` is the errno curl recorded for the
/// failed socket call (0 when unknown); it refines connect failures.
pub fn classify_curl_error(e: &curl::Error, os_errno: i32) -> TransportKind {
    if e.is_operation_timedout() {
        return TransportKind::Timeout;
    }
    if e.is_couldnt_resolve_host() || e.is_couldnt_resolve_proxy() {
        return TransportKind::DnsResolution;
    }
    if e.is_couldnt_connect() {
        return kind_from_errno(os_errno).unwrap_or(TransportKind::ConnectionRefused);
    }
    if e.is_recv_error() || e.is_send_error() || e.is_read_error() || e.is_partial_file() {
        return kind_from_errno(os_errno).unwrap_or(TransportKind::ConnectionReset);
    }
    if e.is_got_nothing() {
        return TransportKind::MalformedReply;
    }
    TransportKind::Other
}

#[cfg(unix)]
fn kind_from_errno(errno: i32) -> Option<TransportKind> {
    match errno {
        libc::ECONNREFUSED => Some(TransportKind::ConnectionRefused),
        libc::ECONNRESET | libc::ECONNABORTED | libc::EPIPE => Some(TransportKind::ConnectionReset),
        libc::ENETUNREACH | libc::EHOSTUNREACH | libc::ENETDOWN => {
            Some(TransportKind::NetworkUnreachable)
        }
        libc::ETIMEDOUT => Some(TransportKind::Timeout),
        _ => None,
    }
}

#[cfg(not(unix))]
fn kind_from_errno(_errno: i32) -> Option<TransportKind> {
    None
}

/// Tag for any stream error, matched against the policy's retryable tags.
pub(crate) fn tag(e: &StreamError) -> &'static str {
    match e {
        StreamError::Status { code } => classify_http_status(*code),
        StreamError::Protocol { .. } => "protocol_error",
        StreamError::Transport { kind, .. } => match kind {
            TransportKind::Timeout => "timeout",
            TransportKind::Other => "transport_error",
            _ => "network_error",
        },
        StreamError::RetriesExhausted { .. } => "retries_exhausted",
        StreamError::Fatal { .. } => "fatal",
        StreamError::Cancelled => "cancelled",
        StreamError::InvalidEndpoint(_) => "invalid_endpoint",
        StreamError::Config(_) => "config_error",
    }
}
