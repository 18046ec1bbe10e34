//! Axum host adapter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use xserve_common::{RequestError, ServeError, ServerOptions};
use xserve_core::{BoxFuture, Handler, HandlerResult, Request, RequestKey, augment};
use xserve_host::axum_host;
use xserve_host::{AxumHandler, AxumServeOptions, AxumServer, AxumServerRef, StopMode};

use crate::adapter::{HostAdapter, ListenPlan, rejected};
use crate::detect::HostKind;

pub(crate) struct AxumAdapter {
    server: AxumServer,
    hostname: Option<String>,
}

#[async_trait]
impl HostAdapter for AxumAdapter {
    const KIND: HostKind = HostKind::Axum;

    #[instrument(name = "axum_adapter_start", skip_all, fields(port = plan.port))]
    fn start(
        plan: ListenPlan,
        options: &ServerOptions,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, ServeError> {
        let overrides = &options.axum;
        let plan = plan.merge(
            overrides.port,
            overrides.hostname.as_ref(),
            overrides.reuse_port,
        );

        let serve_options = AxumServeOptions {
            port: plan.port,
            hostname: plan.hostname.clone(),
            reuse_port: plan.reuse_port,
            request_timeout: overrides.request_timeout_secs.map(Duration::from_secs),
            trace: overrides.trace.unwrap_or(true),
        };

        let body_limit = overrides.max_body_bytes.unwrap_or(usize::MAX);
        let peer_address = plan.peer_address;
        let shim: AxumHandler = Arc::new(
            move |request: axum::extract::Request,
                  server: AxumServerRef|
                  -> BoxFuture<'static, HandlerResult> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    // A request the host never stamped resolves to no peer.
                    let key = request
                        .extensions()
                        .get::<RequestKey>()
                        .copied()
                        .unwrap_or_default();

                    let authority = server.local_addr().to_string();
                    let request = match normalize(request, body_limit, &authority).await {
                        Ok(request) => request,
                        Err(e) => return rejected(&e),
                    };
                    let request = if peer_address {
                        augment(request, Arc::new(server.peer_lookup(key)))
                    } else {
                        request
                    };
                    handler.call(request).await
                })
            },
        );

        let server = axum_host::serve(serve_options, shim)?;
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
    request: axum::extract::Request,
    limit: usize,
    authority: &str,
) -> Result<Request, RequestError> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, limit).await.map_err(|e| {
        let inner = e.into_inner();
        if inner.is::<http_body_util::LengthLimitError>() {
            RequestError::BodyTooLarge { limit }
        } else {
            RequestError::body_read(inner)
        }
    })?;

    Request::from_parts(parts, body, authority)
}
