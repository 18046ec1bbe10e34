//! The shared adapter pipeline.
//!
//! Every host goes through the same three steps:
//!
//! 1. resolve the normalized options into a [`ListenPlan`] (port
//!    precedence, hostname, reuse, peer addresses);
//! 2. merge the host's override record over the plan and start the native
//!    listener with a shim that normalizes each native request before
//!    calling the user handler;
//! 3. wrap the running host in a [`HostAdapter`] the lifecycle can drive.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::warn;

use xserve_common::{RequestError, ServeError, ServerOptions};
use xserve_core::response::error;
use xserve_core::{Handler, HandlerResult};
use xserve_host::StopMode;

use crate::detect::HostKind;

/// Normalized listen parameters, before host overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListenPlan {
    pub port: u16,
    pub hostname: Option<String>,
    pub reuse_port: bool,
    pub peer_address: bool,
}

impl ListenPlan {
    /// Resolve `options`, reading `PORT` when no port is configured.
    pub fn resolve(options: &ServerOptions) -> Result<Self, ServeError> {
        Ok(Self {
            port: options.resolve_port()?,
            hostname: options
                .hostname
                .as_deref()
                .map(str::trim)
                .filter(|host| !host.is_empty())
                .map(str::to_string),
            reuse_port: options.reuse_port,
            peer_address: options.peer_address,
        })
    }

    /// Apply a host's override record. `Some` values win.
    #[must_use]
    pub fn merge(
        mut self,
        port: Option<u16>,
        hostname: Option<&String>,
        reuse_port: Option<bool>,
    ) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(hostname) = hostname {
            self.hostname = Some(hostname.clone());
        }
        if let Some(reuse_port) = reuse_port {
            self.reuse_port = reuse_port;
        }
        self
    }
}

/// A running host, wrapped for the lifecycle.
#[async_trait]
pub(crate) trait HostAdapter: Sized + Send + Sync + 'static {
    const KIND: HostKind;

    /// Start the native listener. Binding completes before this returns.
    fn start(
        plan: ListenPlan,
        options: &ServerOptions,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, ServeError>;

    /// The bound address.
    fn local_addr(&self) -> SocketAddr;

    /// The effective hostname after overrides.
    fn hostname(&self) -> Option<&str>;

    /// Stop the host.
    async fn stop(self, mode: StopMode) -> Result<(), ServeError>;
}

/// Answer a request that could not be normalized, without calling the
/// user handler.
pub(crate) fn rejected(err: &RequestError) -> HandlerResult {
    warn!(error = %err, "Rejected request before reaching the handler");
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    Ok(error(status, &err.to_string()))
}

#[cfg(test)]
mod tests {
    use xserve_common::PortSpec;

    use super::*;

    fn options(port: u16) -> ServerOptions {
        ServerOptions {
            port: Some(PortSpec::from(port)),
            ..ServerOptions::default()
        }
    }

    #[test]
    fn test_resolve_plan() {
        let mut opts = options(8080);
        opts.hostname = Some("  ".to_string());
        opts.peer_address = true;

        let plan = ListenPlan::resolve(&opts).unwrap();
        assert_eq!(
            plan,
            ListenPlan {
                port: 8080,
                hostname: None,
                reuse_port: false,
                peer_address: true,
            }
        );
    }

    #[test]
    fn test_invalid_port_is_configuration_error() {
        let opts = ServerOptions {
            port: Some(PortSpec::from("eighty")),
            ..ServerOptions::default()
        };
        assert!(ListenPlan::resolve(&opts).unwrap_err().is_configuration());
    }

    #[test]
    fn test_overrides_win() {
        let plan = ListenPlan::resolve(&options(8080)).unwrap();
        let merged = plan
            .clone()
            .merge(Some(9090), Some(&"127.0.0.1".to_string()), Some(true));

        assert_eq!(merged.port, 9090);
        assert_eq!(merged.hostname.as_deref(), Some("127.0.0.1"));
        assert!(merged.reuse_port);

        assert_eq!(plan.clone().merge(None, None, None), plan);
    }

    #[test]
    fn test_rejected_status() {
        let response = rejected(&RequestError::BodyTooLarge { limit: 4 }).unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = rejected(&RequestError::body_read("reset")).unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
