//! Native listener hosts for xserve.
//!
//! Each host is an opaque capability with its own native surface: how it
//! binds, what its handler receives, and how it reports the remote peer.
//! The adapter layer in `xserve-server` normalizes them.
//!
//! # Hosts
//!
//! - [`socket`]: Binds a `socket2` socket and drives connections with
//!   hyper's HTTP/1 builder. Handlers receive the native request plus a
//!   [`SocketTransport`] describing the connection.
//! - [`axum_host`]: Hands a tokio listener to `axum::serve`. Handlers receive
//!   the native request plus an [`AxumServerRef`] that can look up the peer
//!   of any in-flight request by its [`RequestKey`](xserve_core::RequestKey).
//! - [`edge`]: A platform-managed listener installed process-wide. The
//!   platform owns the socket; handlers receive a buffered request plus
//!   [`EdgeServeInfo`].
//!
//! # Shutdown
//!
//! Every host closes its listener first, then either drains in-flight work
//! ([`StopMode::Drain`]) or cuts it off ([`StopMode::Force`]).

pub mod axum_host;
pub mod bind;
pub mod edge;
pub mod registry;
pub mod respond;
pub mod shutdown;
pub mod socket;

pub use axum_host::{AxumHandler, AxumPeer, AxumServeOptions, AxumServer, AxumServerRef};
pub use bind::{resolve_bind_addr, url_host};
pub use edge::{
    DispatchError, EdgeHandler, EdgeListener, EdgePlatform, EdgeServeInfo, EdgeServeOptions,
    InMemoryPlatform, install_platform, installed_platform,
};
pub use registry::ConnectionRegistry;
pub use shutdown::StopMode;
pub use socket::{SocketHandler, SocketListenOptions, SocketNative, SocketServer, SocketTransport};
