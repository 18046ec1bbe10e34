//! Peer-address augmentation.
//!
//! When enabled, each request carries a [`PeerAddress`]: a memoized accessor
//! that asks the host's connection-introspection capability ([`PeerLookup`])
//! for the remote address the first time it is read, and never again.
//! When disabled, [`Request::peer_address`](crate::Request::peer_address)
//! returns `None`, so handlers can tell "not enabled" from "unknown".

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::request::Request;

/// A host capability that can report the remote address of one request.
///
/// Implementations carry whatever key their host needs to find the
/// connection (a socket, a request id, platform metadata).
pub trait PeerLookup: Send + Sync + 'static {
    /// Look up the remote address, or `None` if the host no longer knows it.
    fn peer_addr(&self) -> Option<SocketAddr>;
}

impl PeerLookup for SocketAddr {
    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(*self)
    }
}

/// Lazily-resolved remote address of a request.
///
/// Clones share the memo, so every clone of a request observes the same
/// value.
#[derive(Clone)]
pub struct PeerAddress {
    lookup: Arc<dyn PeerLookup>,
    resolved: Arc<OnceLock<Option<String>>>,
}

impl PeerAddress {
    /// Create an unresolved accessor backed by `lookup`.
    pub fn lazy(lookup: Arc<dyn PeerLookup>) -> Self {
        Self {
            lookup,
            resolved: Arc::new(OnceLock::new()),
        }
    }

    /// The remote IP address, resolved on first call.
    ///
    /// Returns `None` when the host cannot resolve the request, e.g. because
    /// the native request it was keyed on has already completed.
    pub fn get(&self) -> Option<&str> {
        self.resolved
            .get_or_init(|| match self.lookup.peer_addr() {
                Some(addr) => Some(addr.ip().to_string()),
                None => {
                    warn!("Peer address unavailable: host did not recognize the request");
                    None
                }
            })
            .as_deref()
    }

    /// Whether the lookup has already run.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}

impl fmt::Debug for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerAddress")
            .field("resolved", &self.resolved.get())
            .finish_non_exhaustive()
    }
}

/// Attach a lazily-resolved peer address to `request`.
///
/// The lookup is not performed here; it runs on the first
/// [`PeerAddress::get`].
pub fn augment(request: Request, lookup: Arc<dyn PeerLookup>) -> Request {
    request.with_peer_address(PeerAddress::lazy(lookup))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingLookup {
        addr: Option<SocketAddr>,
        calls: AtomicUsize,
    }

    impl PeerLookup for CountingLookup {
        fn peer_addr(&self) -> Option<SocketAddr> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.addr
        }
    }

    fn counting(addr: Option<&str>) -> Arc<CountingLookup> {
        Arc::new(CountingLookup {
            addr: addr.map(|a| a.parse().unwrap()),
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_lookup_is_lazy_and_memoized() {
        let lookup = counting(Some("192.0.2.7:51000"));
        let peer = PeerAddress::lazy(lookup.clone());

        assert!(!peer.is_resolved());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);

        assert_eq!(peer.get(), Some("192.0.2.7"));
        assert_eq!(peer.get(), Some("192.0.2.7"));
        assert!(peer.is_resolved());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unresolvable_lookup_is_none() {
        let lookup = counting(None);
        let peer = PeerAddress::lazy(lookup.clone());

        assert_eq!(peer.get(), None);
        assert_eq!(peer.get(), None);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_memo() {
        let lookup = counting(Some("[2001:db8::1]:443"));
        let peer = PeerAddress::lazy(lookup.clone());
        let clone = peer.clone();

        assert_eq!(clone.get(), Some("2001:db8::1"));
        assert!(peer.is_resolved());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_augment_installs_accessor() {
        let request = Request::new(http::Method::GET, "http://localhost/").unwrap();
        assert!(request.peer_address().is_none());

        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let request = augment(request, Arc::new(addr));

        let peer = request.peer_address().unwrap();
        assert!(!peer.is_resolved());
        assert_eq!(peer.get(), Some("127.0.0.1"));
    }
}
