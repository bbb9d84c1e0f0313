pub mod config;
pub mod logging;

pub mod attempt;
pub mod endpoint;
pub mod registry;
pub mod retry;
pub mod stream;

#[cfg(test)]
mod testing;

pub use attempt::{ConnectionAttempt, Connector, CurlConnector, ResponseHead};
pub use endpoint::{AttemptRequest, StreamEndpoint};
pub use registry::{RegistryError, StreamRegistry};
pub use retry::{RetryDecision, RetryPolicy, StreamError, TransportKind};
pub use stream::{connect_with_retry, ReconnectingStream, StreamState, StreamStatus};
