//! Socket host adapter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use tracing::instrument;

use xserve_common::{RequestError, ServeError, ServerOptions};
use xserve_core::{BoxFuture, Handler, HandlerResult, RawTransport, Request, augment};
use xserve_host::socket::{self, DEFAULT_BACKLOG};
use xserve_host::{
    SocketHandler, SocketListenOptions, SocketNative, SocketServer, SocketTransport, StopMode,
};

use crate::adapter::{HostAdapter, ListenPlan, rejected};
use crate::detect::HostKind;

pub(crate) struct SocketAdapter {
    server: SocketServer,
    hostname: Option<String>,
}

#[async_trait]
impl HostAdapter for SocketAdapter {
    const KIND: HostKind = HostKind::Socket;

    #[instrument(name = "socket_adapter_start", skip_all, fields(port = plan.port))]
    fn start(
        plan: ListenPlan,
        options: &ServerOptions,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, ServeError> {
        let overrides = &options.socket;
        let plan = plan.merge(overrides.port, overrides.hostname.as_ref(), None);

        let listen = SocketListenOptions {
            port: plan.port,
            hostname: plan.hostname.clone(),
            exclusive: overrides.exclusive.unwrap_or(!plan.reuse_port),
            backlog: overrides.backlog.unwrap_or(DEFAULT_BACKLOG),
            nodelay: overrides.nodelay.unwrap_or(true),
            keep_alive: overrides.keep_alive.unwrap_or(true),
            header_read_timeout: overrides.header_read_timeout_secs.map(Duration::from_secs),
        };

        let peer_address = plan.peer_address;
        let shim: SocketHandler = Arc::new(
            move |request: http::Request<Incoming>,
                  transport: SocketTransport|
                  -> BoxFuture<'static, HandlerResult> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let request = match normalize(request, transport).await {
                        Ok(request) => request,
                        Err(e) => return rejected(&e),
                    };
                    let request = if peer_address {
                        augment(request, Arc::new(transport))
                    } else {
                        request
                    };
                    handler.call(request).await
                })
            },
        );

        let server = socket::listen(listen, shim)?;
        Ok(Self {
            server,
            hostname: plan.hostname,
        })
    }

    fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    async fn stop(self, mode: StopMode) -> Result<(), ServeError> {
        self.server.close(mode).await
    }
}

async fn normalize(
    request: http::Request<Incoming>,
    transport: SocketTransport,
) -> Result<Request, RequestError> {
    let (parts, body) = request.into_parts();
    let body = body
        .collect()
        .await
        .map_err(RequestError::body_read)?
        .to_bytes();

    let native = SocketNative {
        transport,
        headers: parts.headers.clone(),
    };
    let request = Request::from_parts(parts, body, &transport.local_addr().to_string())?;
    Ok(request.with_raw(RawTransport::new(native)))
}
