//! Server configuration record.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use xserve_common::{AxumOverrides, EdgeOverrides, PortSpec, ServerOptions, SocketOverrides};
use xserve_core::{Handler, IntoResponse, Request, handler_fn};

/// Everything needed to start a server: the handler plus its options.
///
/// # Example
///
/// ```ignore
/// let config = ServerConfig::from_fn(|_req| async { "hello" })
///     .with_hostname("127.0.0.1")
///     .with_port(8080u16)
///     .with_peer_address(true);
/// ```
#[derive(Clone)]
pub struct ServerConfig {
    handler: Arc<dyn Handler>,
    options: ServerOptions,
}

impl ServerConfig {
    /// Create a config with default options.
    pub fn new(handler: impl Handler) -> Self {
        Self {
            handler: Arc::new(handler),
            options: ServerOptions::default(),
        }
    }

    /// Create a config from an async closure.
    pub fn from_fn<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + Send + 'static,
    {
        Self::new(handler_fn(f))
    }

    /// Replace every option at once, e.g. with values loaded from a file.
    #[must_use]
    pub fn with_options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the port. Numbers and numeric strings are accepted.
    #[must_use]
    pub fn with_port(mut self, port: impl Into<PortSpec>) -> Self {
        self.options.port = Some(port.into());
        self
    }

    /// Set the hostname to bind.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.options.hostname = Some(hostname.into());
        self
    }

    /// Allow sharing the port with other listeners.
    #[must_use]
    pub fn with_reuse_port(mut self, reuse_port: bool) -> Self {
        self.options.reuse_port = reuse_port;
        self
    }

    /// Attach a lazily-resolved peer address to every request.
    #[must_use]
    pub fn with_peer_address(mut self, enabled: bool) -> Self {
        self.options.peer_address = enabled;
        self
    }

    /// Set socket host overrides.
    #[must_use]
    pub fn with_socket(mut self, overrides: SocketOverrides) -> Self {
        self.options.socket = overrides;
        self
    }

    /// Set axum host overrides.
    #[must_use]
    pub fn with_axum(mut self, overrides: AxumOverrides) -> Self {
        self.options.axum = overrides;
        self
    }

    /// Set edge host overrides.
    #[must_use]
    pub fn with_edge(mut self, overrides: EdgeOverrides) -> Self {
        self.options.edge = overrides;
        self
    }

    /// The configured options.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub(crate) fn into_parts(self) -> (Arc<dyn Handler>, ServerOptions) {
        (self.handler, self.options)
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
