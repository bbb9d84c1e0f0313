//! Retry and backoff policy.
//!
//! This module encapsulates error classification (transport kinds, status
//! tags) and exponential backoff decisions so that every reconnecting stream
//! shares a consistent policy.

mod classify;
mod error;
mod policy;

pub use classify::{classify_curl_error, classify_http_status};
pub use error::{StreamError, TransportKind};
pub use policy::{RetryDecision, RetryPolicy, DEFAULT_RETRYABLE_TAGS};
