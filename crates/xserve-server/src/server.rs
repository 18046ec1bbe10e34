//! Server lifecycle.
//!
//! [`Server`] is the uniform handle over whichever host is running. Its
//! address getters are answered from the bound listener, and [`Server::stop`]
//! consumes it, so a stopped server cannot be used again.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use xserve_common::{ServeError, ServerOptions};
use xserve_core::Handler;
use xserve_host::{StopMode, url_host};

use crate::adapter::{HostAdapter, ListenPlan};
use crate::adapters::{AxumAdapter, EdgeAdapter, SocketAdapter};
use crate::config::ServerConfig;
use crate::detect::{HostKind, active_host};

enum Running {
    Socket(SocketAdapter),
    Axum(AxumAdapter),
    Edge(EdgeAdapter),
}

impl Running {
    fn start(
        host: HostKind,
        plan: ListenPlan,
        options: &ServerOptions,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, ServeError> {
        Ok(match host {
            HostKind::Socket => Self::Socket(SocketAdapter::start(plan, options, handler)?),
            HostKind::Axum => Self::Axum(AxumAdapter::start(plan, options, handler)?),
            HostKind::Edge => Self::Edge(EdgeAdapter::start(plan, options, handler)?),
        })
    }

    fn kind(&self) -> HostKind {
        match self {
            Self::Socket(_) => SocketAdapter::KIND,
            Self::Axum(_) => AxumAdapter::KIND,
            Self::Edge(_) => EdgeAdapter::KIND,
        }
    }

    fn local_addr(&self) -> SocketAddr {
        match self {
            Self::Socket(adapter) => adapter.local_addr(),
            Self::Axum(adapter) => adapter.local_addr(),
            Self::Edge(adapter) => adapter.local_addr(),
        }
    }

    fn hostname(&self) -> Option<&str> {
        match self {
            Self::Socket(adapter) => adapter.hostname(),
            Self::Axum(adapter) => adapter.hostname(),
            Self::Edge(adapter) => adapter.hostname(),
        }
    }

    async fn stop(self, mode: StopMode) -> Result<(), ServeError> {
        match self {
            Self::Socket(adapter) => adapter.stop(mode).await,
            Self::Axum(adapter) => adapter.stop(mode).await,
            Self::Edge(adapter) => adapter.stop(mode).await,
        }
    }
}

/// A running server.
///
/// Dropping a `Server` without calling [`stop`](Self::stop) closes the
/// listener and drains in-flight requests in the background.
pub struct Server {
    running: Running,
}

impl Server {
    /// Start `config` on a specific host, skipping detection.
    ///
    /// The listener is bound when this returns.
    ///
    /// # Errors
    ///
    /// - [`ServeError::Configuration`] for an invalid port
    /// - [`ServeError::Bind`] when the address cannot be bound
    /// - [`ServeError::UnsupportedHost`] when `host` is not available here
    pub fn start(host: HostKind, config: ServerConfig) -> Result<Self, ServeError> {
        let (handler, options) = config.into_parts();
        let plan = ListenPlan::resolve(&options)?;

        let running = Running::start(host, plan, &options, handler)?;
        let server = Self { running };

        info!(runtime = %host, url = %server.url(), "Server listening");
        Ok(server)
    }

    /// The host this server runs on.
    pub fn runtime(&self) -> HostKind {
        self.running.kind()
    }

    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.running.local_addr()
    }

    /// The bound port, the OS-assigned one if `0` was requested.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// The hostname the server was asked to bind, if any.
    pub fn hostname(&self) -> Option<&str> {
        self.running.hostname()
    }

    /// A URL that reaches this server.
    pub fn url(&self) -> String {
        format!(
            "http://{}:{}/",
            url_host(self.hostname(), self.addr()),
            self.port()
        )
    }

    /// Stop the server.
    ///
    /// The listener closes first, so new connections are refused at once.
    /// With `close_all` in-flight requests are cut off; otherwise they are
    /// allowed to finish before this returns.
    pub async fn stop(self, close_all: bool) -> Result<(), ServeError> {
        let mode = StopMode::from_close_all(close_all);
        let runtime = self.runtime();
        let addr = self.addr();

        self.running.stop(mode).await?;
        info!(runtime = %runtime, addr = %addr, mode = ?mode, "Server stopped");
        Ok(())
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("runtime", &self.runtime())
            .field("addr", &self.addr())
            .field("hostname", &self.hostname())
            .finish()
    }
}

/// Serve `config` on the host detected in this process.
///
/// # Errors
///
/// Returns [`ServeError::UnsupportedHost`] when no host is available, and
/// otherwise whatever [`Server::start`] reports.
pub fn serve(config: ServerConfig) -> Result<Server, ServeError> {
    let host = active_host()?;
    Server::start(host, config)
}
