//! Axum host.
//!
//! Binds a tokio listener and hands it to `axum::serve`. A single fallback
//! route receives every request; it stamps the request with a
//! [`RequestKey`], records the connection's remote address in a
//! [`ConnectionRegistry`] for the lifetime of the request, and calls the
//! native handler with an [`AxumServerRef`]. Handlers ask the server
//! reference for the peer of a request by its key.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use tokio::net::{TcpListener, TcpSocket};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use xserve_common::ServeError;
use xserve_core::{BoxFuture, HandlerResult, PeerLookup, RequestKey};

use crate::bind::resolve_bind_addr;
use crate::registry::ConnectionRegistry;
use crate::respond::{forced_close, settle};
use crate::shutdown::{
    StopMode, StopReceiver, StopSender, force_requested, stop_channel, stop_requested,
};

const LISTEN_BACKLOG: u32 = 1024;

/// Native serve options of the axum host.
#[derive(Debug, Clone, Default)]
pub struct AxumServeOptions {
    /// Port to bind; `0` picks a free port.
    pub port: u16,
    /// Hostname or IP to bind; `None` binds every interface.
    pub hostname: Option<String>,
    /// Allow other sockets to bind the same port.
    pub reuse_port: bool,
    /// Answer 408 when a request takes longer than this.
    pub request_timeout: Option<Duration>,
    /// Wrap the router in `tower_http`'s HTTP trace layer.
    pub trace: bool,
}

/// Server reference handed to every native handler call.
#[derive(Debug, Clone)]
pub struct AxumServerRef {
    registry: Arc<ConnectionRegistry>,
    local_addr: SocketAddr,
}

impl AxumServerRef {
    /// Remote address of an in-flight request.
    ///
    /// Returns `None` once the request has completed, or for a key this
    /// server never issued.
    pub fn request_ip(&self, key: &RequestKey) -> Option<SocketAddr> {
        self.registry.lookup(key)
    }

    /// A deferred peer lookup for `key`.
    pub fn peer_lookup(&self, key: RequestKey) -> AxumPeer {
        AxumPeer {
            server: self.clone(),
            key,
        }
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Peer lookup that resolves through the server reference on demand.
#[derive(Debug, Clone)]
pub struct AxumPeer {
    server: AxumServerRef,
    key: RequestKey,
}

impl PeerLookup for AxumPeer {
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.server.request_ip(&self.key)
    }
}

/// Native handler: the axum request plus the server reference.
pub type AxumHandler =
    Arc<dyn Fn(Request, AxumServerRef) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// A listening axum host.
///
/// Dropping it triggers a graceful shutdown in the background.
pub struct AxumServer {
    server_ref: AxumServerRef,
    stop_tx: StopSender,
    task: JoinHandle<io::Result<()>>,
}

impl AxumServer {
    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.server_ref.local_addr
    }

    /// Stop the host and wait for `axum::serve` to return.
    pub async fn close(self, mode: StopMode) -> Result<(), ServeError> {
        self.stop_tx.send_replace(Some(mode));
        self.task
            .await
            .map_err(|e| ServeError::shutdown(format!("axum host task failed: {e}")))??;
        Ok(())
    }
}

impl fmt::Debug for AxumServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AxumServer")
            .field("local_addr", &self.server_ref.local_addr)
            .finish_non_exhaustive()
    }
}

/// Bind and start serving.
///
/// Must be called from within a tokio runtime.
pub fn serve(options: AxumServeOptions, handler: AxumHandler) -> Result<AxumServer, ServeError> {
    let runtime = Handle::try_current()
        .map_err(|_| ServeError::unsupported_host("the axum host requires a tokio runtime"))?;

    let addr = resolve_bind_addr(options.hostname.as_deref(), options.port)?;
    let listener = {
        let _guard = runtime.enter();
        bind_listener(addr, options.reuse_port).map_err(|e| ServeError::bind(addr, e))?
    };
    let local_addr = listener.local_addr()?;

    let server_ref = AxumServerRef {
        registry: Arc::new(ConnectionRegistry::new()),
        local_addr,
    };
    let (stop_tx, stop_rx) = stop_channel();
    let app = build_router(handler, server_ref.clone(), stop_rx.clone(), &options);

    info!(addr = %local_addr, reuse_port = options.reuse_port, "Axum host listening");

    let mut shutdown_rx = stop_rx;
    let task = runtime.spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let mode = stop_requested(&mut shutdown_rx).await;
            info!(addr = %local_addr, mode = ?mode, "Axum host stopped accepting");
        })
        .await
    });

    Ok(AxumServer {
        server_ref,
        stop_tx,
        task,
    })
}

fn bind_listener(addr: SocketAddr, reuse_port: bool) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    #[cfg(unix)]
    {
        socket.set_reuseaddr(true)?;
        socket.set_reuseport(reuse_port)?;
    }
    #[cfg(not(unix))]
    let _ = reuse_port;

    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Build the router every request goes through.
///
/// The dispatch route needs [`ConnectInfo<SocketAddr>`] from the make
/// service, or a `MockConnectInfo` layer in tests.
pub(crate) fn build_router(
    handler: AxumHandler,
    server: AxumServerRef,
    stop_rx: StopReceiver,
    options: &AxumServeOptions,
) -> Router {
    let dispatch = move |ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
                         mut request: Request| {
        let handler = Arc::clone(&handler);
        let server = server.clone();
        let forced = force_requested(stop_rx.clone());

        async move {
            let key = RequestKey::new();
            request.extensions_mut().insert(key);
            let _tracked = server.registry.track(key, remote_addr);
            debug!(request_key = %key, remote_addr = %remote_addr, "Axum host request");

            tokio::select! {
                result = handler(request, server.clone()) => settle(result).map(Body::from),
                () = forced => forced_close().map(Body::from),
            }
        }
    };

    let mut router = Router::new().fallback(dispatch);
    if let Some(timeout) = options.request_timeout {
        router = router.layer(TimeoutLayer::new(timeout));
    }
    if options.trace {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

#[cfg(test)]
mod tests {
    use axum::extract::connect_info::MockConnectInfo;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use xserve_core::HandlerError;
    use xserve_core::response::text;

    use super::*;

    fn peer_echo() -> AxumHandler {
        Arc::new(
            |request: Request, server: AxumServerRef| -> BoxFuture<'static, HandlerResult> {
                Box::pin(async move {
                    let key = request.extensions().get::<RequestKey>().copied().unwrap();
                    let ip = server.request_ip(&key).map(|addr| addr.ip().to_string());
                    Ok(text(StatusCode::OK, ip.unwrap_or_default()))
                })
            },
        )
    }

    fn test_server() -> AxumServerRef {
        AxumServerRef {
            registry: Arc::new(ConnectionRegistry::new()),
            local_addr: "127.0.0.1:3000".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_request_ip_during_request() {
        let server = test_server();
        let (_stop_tx, stop_rx) = stop_channel();
        let peer: SocketAddr = "198.51.100.4:50000".parse().unwrap();
        let app = build_router(peer_echo(), server.clone(), stop_rx, &AxumServeOptions::default())
            .layer(MockConnectInfo(peer));

        let response = app
            .oneshot(
                http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"198.51.100.4");
        assert!(server.registry.is_empty());
    }

    #[test]
    fn test_stale_key_resolves_to_none() {
        let server = test_server();
        let key = RequestKey::new();
        let guard = server.registry.track(key, "198.51.100.4:1".parse().unwrap());
        let peer = server.peer_lookup(key);
        assert!(peer.peer_addr().is_some());

        drop(guard);
        assert_eq!(peer.peer_addr(), None);
    }

    #[tokio::test]
    async fn test_handler_error_is_500() {
        let failing: AxumHandler = Arc::new(
            |_request: Request, _server: AxumServerRef| -> BoxFuture<'static, HandlerResult> {
                Box::pin(async { Err(HandlerError::from("boom")) })
            },
        );
        let (_stop_tx, stop_rx) = stop_channel();
        let app = build_router(failing, test_server(), stop_rx, &AxumServeOptions::default())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 1))));

        let response = app
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_forced_stop_answers_503() {
        let stalled: AxumHandler = Arc::new(
            |_request: Request, _server: AxumServerRef| -> BoxFuture<'static, HandlerResult> {
                Box::pin(async {
                    std::future::pending::<()>().await;
                    Ok(text(StatusCode::OK, "never"))
                })
            },
        );
        let (stop_tx, stop_rx) = stop_channel();
        let app = build_router(stalled, test_server(), stop_rx, &AxumServeOptions::default())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 1))));

        let pending = tokio::spawn(
            app.oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap()),
        );
        tokio::task::yield_now().await;
        stop_tx.send_replace(Some(StopMode::Force));

        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
