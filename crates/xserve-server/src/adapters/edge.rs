//! Edge host adapter.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, instrument};

use xserve_common::{ServeError, ServerOptions};
use xserve_core::{BoxFuture, Handler, HandlerResult, Request, augment};
use xserve_host::{
    EdgeHandler, EdgeListener, EdgeServeInfo, EdgeServeOptions, StopMode, installed_platform,
};

use crate::adapter::{HostAdapter, ListenPlan, rejected};
use crate::detect::HostKind;

pub(crate) struct EdgeAdapter {
    listener: Box<dyn EdgeListener>,
    platform: String,
    hostname: Option<String>,
}

impl fmt::Debug for EdgeAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeAdapter")
            .field("platform", &self.platform)
            .field("local_addr", &self.listener.local_addr())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HostAdapter for EdgeAdapter {
    const KIND: HostKind = HostKind::Edge;

    #[instrument(name = "edge_adapter_start", skip_all, fields(port = plan.port))]
    fn start(
        plan: ListenPlan,
        options: &ServerOptions,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, ServeError> {
        let platform = installed_platform()
            .ok_or_else(|| ServeError::unsupported_host("no edge platform is installed"))?;

        let overrides = &options.edge;
        let plan = plan.merge(
            overrides.port,
            overrides.hostname.as_ref(),
            overrides.reuse_port,
        );

        let serve_options = EdgeServeOptions {
            port: plan.port,
            hostname: plan.hostname.clone(),
            reuse_port: plan.reuse_port,
        };

        let peer_address = plan.peer_address;
        let shim: EdgeHandler = Arc::new(
            move |request: http::Request<Bytes>,
                  info: EdgeServeInfo|
                  -> BoxFuture<'static, HandlerResult> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let (parts, body) = request.into_parts();
                    let request =
                        match Request::from_parts(parts, body, &info.local_addr.to_string()) {
                            Ok(request) => request,
                            Err(e) => return rejected(&e),
                        };
                    let request = if peer_address {
                        augment(request, Arc::new(info))
                    } else {
                        request
                    };
                    handler.call(request).await
                })
            },
        );

        let listener = platform.serve(serve_options, shim)?;
        debug!(
            platform = platform.name(),
            addr = %listener.local_addr(),
            "Edge adapter registered"
        );

        Ok(Self {
            listener,
            platform: platform.name().to_string(),
            hostname: plan.hostname,
        })
    }

    fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    async fn stop(self, mode: StopMode) -> Result<(), ServeError> {
        self.listener.shutdown(mode).await
    }
}
