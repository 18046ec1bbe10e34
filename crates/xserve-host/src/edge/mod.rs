//! Edge host.
//!
//! An edge platform owns its listening sockets; the process only registers
//! handlers with it. The platform is a process-wide capability: it is
//! installed once with [`install_platform`], and its presence is what host
//! detection looks for first.
//!
//! Handlers receive a fully buffered request plus [`EdgeServeInfo`], which
//! carries the remote address the platform observed (if any).

mod memory;

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bytes::Bytes;

use xserve_common::ServeError;
use xserve_core::{BoxFuture, HandlerResult, PeerLookup};

use crate::shutdown::StopMode;

pub use memory::{DispatchError, InMemoryPlatform};

/// Native serve options of an edge platform.
#[derive(Debug, Clone, Default)]
pub struct EdgeServeOptions {
    /// Port to register; `0` lets the platform choose.
    pub port: u16,
    /// Hostname or IP to register; `None` means every interface.
    pub hostname: Option<String>,
    /// Share the port with other registrations.
    pub reuse_port: bool,
}

/// Connection metadata passed alongside every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeServeInfo {
    /// Address the request was received on.
    pub local_addr: SocketAddr,
    /// Remote address reported by the platform.
    pub remote_addr: Option<SocketAddr>,
}

impl PeerLookup for EdgeServeInfo {
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// Native handler: the buffered request plus connection metadata.
pub type EdgeHandler = Arc<
    dyn Fn(http::Request<Bytes>, EdgeServeInfo) -> BoxFuture<'static, HandlerResult> + Send + Sync,
>;

/// A platform that can register request handlers on ports.
pub trait EdgePlatform: Send + Sync + 'static {
    /// Platform name, used in logs.
    fn name(&self) -> &str;

    /// Register `handler`; the returned listener is active immediately.
    fn serve(
        &self,
        options: EdgeServeOptions,
        handler: EdgeHandler,
    ) -> Result<Box<dyn EdgeListener>, ServeError>;
}

/// An active registration on an [`EdgePlatform`].
#[async_trait]
pub trait EdgeListener: Send + Sync {
    /// The registered address.
    fn local_addr(&self) -> SocketAddr;

    /// Unregister and wait according to `mode`.
    async fn shutdown(self: Box<Self>, mode: StopMode) -> Result<(), ServeError>;
}

static PLATFORM: OnceLock<Arc<dyn EdgePlatform>> = OnceLock::new();

/// Install the process-wide edge platform.
///
/// # Errors
///
/// Returns [`ServeError::Configuration`] if a platform is already
/// installed.
pub fn install_platform(platform: Arc<dyn EdgePlatform>) -> Result<(), ServeError> {
    let name = platform.name().to_string();
    PLATFORM.set(platform).map_err(|_| {
        ServeError::configuration(format!(
            "cannot install edge platform {name:?}: a platform is already installed"
        ))
    })?;
    tracing::info!(platform = %name, "Edge platform installed");
    Ok(())
}

/// The installed edge platform, if any.
pub fn installed_platform() -> Option<Arc<dyn EdgePlatform>> {
    PLATFORM.get().cloned()
}
