//! Socket host.
//!
//! Owns a `socket2` listening socket and drives each accepted connection
//! with hyper's HTTP/1 connection builder. Handlers receive the native
//! request and a [`SocketTransport`] for the connection it arrived on, so
//! the remote address is always known without a lookup table.
//!
//! Stopping closes the listener immediately. In-flight connections are then
//! either told to finish their current request ([`StopMode::Drain`]) or
//! dropped on the spot ([`StopMode::Force`]).

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use xserve_common::ServeError;
use xserve_core::{BoxFuture, HandlerResult, PeerLookup};

use crate::bind::resolve_bind_addr;
use crate::respond::settle;
use crate::shutdown::{
    StopMode, StopReceiver, StopSender, force_requested, stop_channel, stop_requested,
};

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 1024;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Native listen options of the socket host.
#[derive(Debug, Clone)]
pub struct SocketListenOptions {
    /// Port to bind; `0` picks a free port.
    pub port: u16,
    /// Hostname or IP to bind; `None` binds every interface.
    pub hostname: Option<String>,
    /// Refuse to share the port with other sockets (no `SO_REUSEPORT`).
    pub exclusive: bool,
    /// Listen backlog.
    pub backlog: u32,
    /// Set `TCP_NODELAY` on accepted connections.
    pub nodelay: bool,
    /// Keep connections open between requests.
    pub keep_alive: bool,
    /// Close connections that take longer than this to send their headers.
    pub header_read_timeout: Option<Duration>,
}

impl Default for SocketListenOptions {
    fn default() -> Self {
        Self {
            port: 0,
            hostname: None,
            exclusive: true,
            backlog: DEFAULT_BACKLOG,
            nodelay: true,
            keep_alive: true,
            header_read_timeout: None,
        }
    }
}

/// The connection a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketTransport {
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
}

impl SocketTransport {
    /// Local end of the connection.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Remote end of the connection.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl PeerLookup for SocketTransport {
    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.remote_addr)
    }
}

/// Native view of a socket-host request, kept reachable after
/// normalization.
///
/// The header map keeps the features the normalized view drops, such as
/// per-value access through [`HeaderMap::get_all`] and value counts.
#[derive(Debug, Clone)]
pub struct SocketNative {
    /// The connection.
    pub transport: SocketTransport,
    /// Headers exactly as the client sent them.
    pub headers: HeaderMap,
}

/// Native handler: the hyper request plus its connection.
pub type SocketHandler = Arc<
    dyn Fn(http::Request<Incoming>, SocketTransport) -> BoxFuture<'static, HandlerResult>
        + Send
        + Sync,
>;

/// A listening socket host.
///
/// Dropping it stops accepting and drains in the background.
pub struct SocketServer {
    local_addr: SocketAddr,
    stop_tx: StopSender,
    task: JoinHandle<()>,
}

impl SocketServer {
    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the host and wait until every connection is closed.
    pub async fn close(self, mode: StopMode) -> Result<(), ServeError> {
        self.stop_tx.send_replace(Some(mode));
        self.task
            .await
            .map_err(|e| ServeError::shutdown(format!("socket host task failed: {e}")))
    }
}

impl fmt::Debug for SocketServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketServer")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

/// Per-connection settings copied into every connection task.
#[derive(Debug, Clone, Copy)]
struct ConnectionSettings {
    nodelay: bool,
    keep_alive: bool,
    header_read_timeout: Option<Duration>,
}

/// Bind and start accepting.
///
/// Must be called from within a tokio runtime. The listener is bound
/// before this returns, so bind failures are reported here.
pub fn listen(
    options: SocketListenOptions,
    handler: SocketHandler,
) -> Result<SocketServer, ServeError> {
    let runtime = Handle::try_current()
        .map_err(|_| ServeError::unsupported_host("the socket host requires a tokio runtime"))?;

    let addr = resolve_bind_addr(options.hostname.as_deref(), options.port)?;
    let std_listener = bind_socket(addr, &options).map_err(|e| ServeError::bind(addr, e))?;
    let listener = {
        let _guard = runtime.enter();
        TcpListener::from_std(std_listener).map_err(|e| ServeError::bind(addr, e))?
    };
    let local_addr = listener.local_addr()?;

    let settings = ConnectionSettings {
        nodelay: options.nodelay,
        keep_alive: options.keep_alive,
        header_read_timeout: options.header_read_timeout,
    };
    let (stop_tx, stop_rx) = stop_channel();

    info!(addr = %local_addr, exclusive = options.exclusive, "Socket host listening");
    let task = runtime.spawn(accept_loop(listener, local_addr, handler, settings, stop_rx));

    Ok(SocketServer {
        local_addr,
        stop_tx,
        task,
    })
}

fn bind_socket(
    addr: SocketAddr,
    options: &SocketListenOptions,
) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    #[cfg(unix)]
    {
        socket.set_reuse_address(true)?;
        if !options.exclusive {
            socket.set_reuse_port(true)?;
        }
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(options.backlog).unwrap_or(i32::MAX))?;

    Ok(socket.into())
}

async fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: SocketHandler,
    settings: ConnectionSettings,
    mut stop_rx: StopReceiver,
) {
    let graceful = GracefulShutdown::new();
    let force_rx = stop_rx.clone();

    let mode = loop {
        tokio::select! {
            mode = stop_requested(&mut stop_rx) => break mode,
            (stream, remote_addr) = accept_with_backoff(|| listener.accept()) => {

                if settings.nodelay {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(error = %e, "Failed to set TCP_NODELAY");
                    }
                }

                let transport = SocketTransport { local_addr, remote_addr };
                let handler = Arc::clone(&handler);
                let service = service_fn(move |request: http::Request<Incoming>| {
                    let handler = Arc::clone(&handler);
                    async move {
                        debug!(
                            method = %request.method(),
                            uri = %request.uri(),
                            "Socket host request"
                        );
                        let response = settle(handler(request, transport).await);
                        Ok::<_, Infallible>(response.map(Full::new))
                    }
                });

                let connection = graceful.watch(
                    connection_builder(settings).serve_connection(TokioIo::new(stream), service),
                );
                let forced = force_requested(force_rx.clone());

                tokio::spawn(async move {
                    tokio::select! {
                        result = connection => {
                            if let Err(e) = result {
                                debug!(
                                    remote_addr = %remote_addr,
                                    error = %e,
                                    "Connection ended with error"
                                );
                            }
                        }
                        () = forced => {
                            debug!(remote_addr = %remote_addr, "Connection dropped by forced stop");
                        }
                    }
                });
            }
        }
    };

    drop(listener);
    info!(addr = %local_addr, mode = ?mode, "Socket host stopped accepting");

    graceful.shutdown().await;
    debug!(addr = %local_addr, "Socket host connections closed");
}

/// Retry `accept` until it yields a connection, pausing after each failure
/// so exhausted file descriptors do not spin the loop.
async fn accept_with_backoff<F, Fut, T>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(connection) => return connection,
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

fn connection_builder(settings: ConnectionSettings) -> http1::Builder {
    let mut builder = http1::Builder::new();
    builder.keep_alive(settings.keep_alive);
    if let Some(timeout) = settings.header_read_timeout {
        builder.timer(TokioTimer::new()).header_read_timeout(timeout);
    }
    builder
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpStream;

    use xserve_core::response::text;

    use super::*;

    fn ok_handler() -> SocketHandler {
        Arc::new(
            |_request: http::Request<Incoming>,
             transport: SocketTransport|
             -> BoxFuture<'static, HandlerResult> {
                Box::pin(async move {
                    Ok(text(
                        http::StatusCode::OK,
                        transport.remote_addr().ip().to_string(),
                    ))
                })
            },
        )
    }

    fn loopback() -> SocketListenOptions {
        SocketListenOptions {
            hostname: Some("127.0.0.1".to_string()),
            ..SocketListenOptions::default()
        }
    }

    #[tokio::test]
    async fn test_listen_reports_remote_address() {
        let server = listen(loopback(), ok_handler()).unwrap();
        let url = format!("http://{}/", server.local_addr());

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let body = client.get(&url).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "127.0.0.1");

        server.close(StopMode::Drain).await.unwrap();
    }

    #[tokio::test]
    async fn test_exclusive_port_conflict() {
        let first = listen(loopback(), ok_handler()).unwrap();
        let options = SocketListenOptions {
            port: first.local_addr().port(),
            ..loopback()
        };

        let err = listen(options, ok_handler()).unwrap_err();
        assert!(err.is_addr_in_use());

        first.close(StopMode::Drain).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_releases_port() {
        let server = listen(loopback(), ok_handler()).unwrap();
        let addr = server.local_addr();
        server.close(StopMode::Force).await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_accept_errors_back_off() {
        let mut failures = 2;
        let started = std::time::Instant::now();

        let accepted = accept_with_backoff(|| {
            let result = if failures > 0 {
                failures -= 1;
                Err(io::Error::other("too many open files"))
            } else {
                Ok(7)
            };
            async move { result }
        })
        .await;

        assert_eq!(accepted, 7);
        assert_eq!(failures, 0);
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF * 2);
    }

    #[test]
    fn test_listen_requires_runtime() {
        let err = listen(loopback(), ok_handler()).unwrap_err();
        assert!(err.is_unsupported_host());
    }
}
