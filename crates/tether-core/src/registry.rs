//! Named collection of reconnecting streams.
//!
//! The registry owns one `ReconnectingStream` per name. Adding a stream
//! reserves the name before the first connect, so concurrent adds of the same
//! name cannot both win; the reservation is only promoted to a live entry once
//! the first connect succeeds.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::attempt::Connector;
use crate::endpoint::StreamEndpoint;
use crate::retry::{RetryPolicy, StreamError};
use crate::stream::{ReconnectingStream, StreamStatus};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("stream `{0}` is already registered")]
    DuplicateName(String),
    #[error("stream `{name}` failed to connect: {source}")]
    Connect {
        name: String,
        #[source]
        source: StreamError,
    },
}

enum Slot {
    /// Name reserved while the first connect is in flight.
    Pending(Arc<ReconnectingStream>),
    Active(Arc<ReconnectingStream>),
}

impl Slot {
    fn stream(&self) -> &Arc<ReconnectingStream> {
        match self {
            Slot::Pending(s) | Slot::Active(s) => s,
        }
    }

    fn active(&self) -> Option<&Arc<ReconnectingStream>> {
        match self {
            Slot::Active(s) => Some(s),
            Slot::Pending(_) => None,
        }
    }

    fn into_stream(self) -> Arc<ReconnectingStream> {
        match self {
            Slot::Pending(s) | Slot::Active(s) => s,
        }
    }
}

/// Registry of named streams sharing one retry policy and one connector.
pub struct StreamRegistry {
    policy: Arc<RetryPolicy>,
    connector: Arc<dyn Connector>,
    streams: RwLock<HashMap<String, Slot>>,
}

impl StreamRegistry {
    pub fn new(policy: Arc<RetryPolicy>, connector: Arc<dyn Connector>) -> Self {
        Self {
            policy,
            connector,
            streams: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.streams.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.streams.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Register `endpoint` under `name`, connect it, and start its health monitor.
    ///
    /// Fails with `DuplicateName` when the name is taken (live or still
    /// connecting). A failed first connect releases the name. A stream removed
    /// while its first connect is in flight yields `Connect { source: Cancelled }`.
    pub async fn add_connection(
        &self,
        name: impl Into<String>,
        endpoint: StreamEndpoint,
    ) -> Result<Arc<ReconnectingStream>, RegistryError> {
        let name = name.into();
        let stream = match self.write().entry(name.clone()) {
            Entry::Occupied(_) => return Err(RegistryError::DuplicateName(name)),
            Entry::Vacant(vacant) => {
                let stream = Arc::new(ReconnectingStream::new(
                    name.clone(),
                    endpoint,
                    Arc::clone(&self.policy),
                    Arc::clone(&self.connector),
                ));
                vacant.insert(Slot::Pending(Arc::clone(&stream)));
                stream
            }
        };

        if let Err(source) = stream.connect().await {
            self.release_if_same(&name, &stream);
            tracing::warn!(stream = %name, "failed to add stream: {}", source);
            return Err(RegistryError::Connect { name, source });
        }

        let promoted = {
            let mut map = self.write();
            match map.get_mut(&name) {
                Some(slot) if Arc::ptr_eq(slot.stream(), &stream) => {
                    *slot = Slot::Active(Arc::clone(&stream));
                    true
                }
                _ => false,
            }
        };
        if !promoted {
            // Removed (or the registry drained) while connecting.
            stream.disconnect();
            return Err(RegistryError::Connect {
                name,
                source: StreamError::Cancelled,
            });
        }

        stream.start_health_monitoring();
        tracing::info!(stream = %name, url = %stream.address(), "stream added");
        Ok(stream)
    }

    fn release_if_same(&self, name: &str, stream: &Arc<ReconnectingStream>) {
        let mut map = self.write();
        if map
            .get(name)
            .is_some_and(|slot| Arc::ptr_eq(slot.stream(), stream))
        {
            map.remove(name);
        }
    }

    /// Disconnect and forget `name`. Returns false when no such stream exists.
    pub async fn remove_connection(&self, name: &str) -> bool {
        let removed = self.write().remove(name);
        match removed {
            Some(slot) => {
                slot.into_stream().shutdown().await;
                tracing::info!(stream = %name, "stream removed");
                true
            }
            None => false,
        }
    }

    /// Live stream registered under `name`.
    pub fn get_connection(&self, name: &str) -> Option<Arc<ReconnectingStream>> {
        self.read().get(name).and_then(Slot::active).cloned()
    }

    /// Disconnect and remove every stream, then wait for their monitors.
    pub async fn disconnect_all(&self) {
        let drained: Vec<Arc<ReconnectingStream>> =
            self.write().drain().map(|(_, slot)| slot.into_stream()).collect();
        for stream in &drained {
            stream.disconnect();
        }
        for stream in &drained {
            stream.shutdown().await;
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "all streams disconnected");
        }
    }

    /// Number of live streams.
    pub fn len(&self) -> usize {
        self.read().values().filter(|s| s.active().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of live streams, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, slot)| slot.active().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Status of every live stream, sorted by name.
    pub fn snapshot(&self) -> Vec<StreamStatus> {
        let mut out: Vec<StreamStatus> = self
            .read()
            .values()
            .filter_map(Slot::active)
            .map(|s| s.status())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

impl Drop for StreamRegistry {
    fn drop(&mut self) {
        let map = self
            .streams
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for slot in map.values() {
            slot.stream().disconnect();
        }
    }
}
