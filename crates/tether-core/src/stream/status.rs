//! Lifecycle state and status snapshot of a reconnecting stream.

use serde::Serialize;

/// Lifecycle of a reconnecting stream.
///
/// `Idle → Connecting → Connected → Connecting (on drop) → Disconnected`.
/// `Disconnected` follows exhausted retries, a fatal error, or an explicit
/// disconnect. Only the last one is final; the health monitor keeps trying
/// the other two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

impl StreamState {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Idle => "idle",
            StreamState::Connecting => "connecting",
            StreamState::Connected => "connected",
            StreamState::Disconnected => "disconnected",
        }
    }
}

/// Point-in-time view of a stream, safe to hand to callers outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    pub name: String,
    pub address: String,
    pub state: StreamState,
    pub connected: bool,
    /// 0-based index of the current attempt within a connect run.
    pub attempt_count: u32,
    pub last_event_id: String,
    pub last_error: Option<String>,
}
