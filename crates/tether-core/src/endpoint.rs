//! Stream endpoint: target address, outbound headers, and resume position.

use std::collections::BTreeMap;

use crate::retry::StreamError;

/// Request header carrying the last processed event id on reconnect.
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// One logical event stream.
///
/// `connected` is only ever flipped by the `ReconnectingStream` that owns the
/// endpoint; callers observe it through the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    address: String,
    headers: BTreeMap<String, String>,
    last_event_id: String,
    connected: bool,
}

/// Snapshot of everything one connection attempt sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRequest {
    pub url: String,
    /// Header (name, value) pairs in send order.
    pub headers: Vec<(String, String)>,
}

impl AttemptRequest {
    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl StreamEndpoint {
    /// Create an endpoint for an absolute http(s) URL.
    pub fn new(address: impl Into<String>) -> Result<Self, StreamError> {
        let address = address.into();
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(StreamError::InvalidEndpoint("address is empty".into()));
        }
        let parsed = url::Url::parse(trimmed)
            .map_err(|e| StreamError::InvalidEndpoint(format!("{trimmed}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StreamError::InvalidEndpoint(format!(
                "{trimmed}: unsupported scheme `{}`",
                parsed.scheme()
            )));
        }
        Ok(Self {
            address: trimmed.to_string(),
            headers: BTreeMap::new(),
            last_event_id: String::new(),
            connected: false,
        })
    }

    /// Builder form of [`set_header`](Self::set_header).
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, StreamError> {
        self.set_header(name, value)?;
        Ok(self)
    }

    /// Builder form of [`set_last_event_id`](Self::set_last_event_id).
    pub fn with_last_event_id(mut self, id: impl Into<String>) -> Self {
        self.set_last_event_id(id);
        self
    }

    /// Set (or replace) an outbound header. Rejects names and values that
    /// would break the request line framing.
    pub fn set_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), StreamError> {
        let name = name.into().trim().to_string();
        let value = value.into().trim().to_string();
        if name.is_empty() || name.contains(|c: char| c == ':' || c.is_whitespace()) {
            return Err(StreamError::InvalidEndpoint(format!(
                "invalid header name `{name}`"
            )));
        }
        if value.contains(|c: char| c == '\r' || c == '\n') {
            return Err(StreamError::InvalidEndpoint(format!(
                "header `{name}` value contains a line break"
            )));
        }
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Last processed event id; empty until at least one event was processed.
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    pub fn set_last_event_id(&mut self, id: impl Into<String>) {
        self.last_event_id = id.into();
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Request for the next attempt: configured headers plus `Last-Event-ID`
    /// when a position is known. The position wins over a configured header
    /// of the same name.
    pub fn request(&self) -> AttemptRequest {
        let resume = !self.last_event_id.is_empty();
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .filter(|(k, _)| !(resume && k.eq_ignore_ascii_case(LAST_EVENT_ID_HEADER)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if resume {
            headers.push((LAST_EVENT_ID_HEADER.to_string(), self.last_event_id.clone()));
        }
        AttemptRequest {
            url: self.address.clone(),
            headers,
        }
    }
}
