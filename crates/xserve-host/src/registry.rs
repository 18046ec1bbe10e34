//! Request-keyed connection registry.
//!
//! Hosts that only hand handlers a request (not its connection) answer
//! "who sent this?" through a lookup table keyed by [`RequestKey`]. An entry
//! lives exactly as long as the request is in flight.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;

use xserve_core::RequestKey;

/// Concurrent map from in-flight requests to their remote address.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: DashMap<RequestKey, SocketAddr>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `addr` for `key` until the returned guard is dropped.
    pub fn track(self: &Arc<Self>, key: RequestKey, addr: SocketAddr) -> Tracked {
        self.peers.insert(key, addr);
        Tracked {
            registry: Arc::clone(self),
            key,
        }
    }

    /// Remote address of an in-flight request.
    pub fn lookup(&self, key: &RequestKey) -> Option<SocketAddr> {
        self.peers.get(key).map(|entry| *entry.value())
    }

    /// Number of requests currently tracked.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no request is tracked.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Removes its registry entry on drop.
#[derive(Debug)]
pub struct Tracked {
    registry: Arc<ConnectionRegistry>,
    key: RequestKey,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.registry.peers.remove(&self.key);
    }
}
