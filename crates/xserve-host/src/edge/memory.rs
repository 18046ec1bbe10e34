//! In-process edge platform.
//!
//! Registrations live in a shared table instead of the kernel: requests are
//! delivered with [`InMemoryPlatform::dispatch`]. Port allocation, conflict
//! detection and shutdown follow the same rules a socket-owning platform
//! applies.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use xserve_common::ServeError;
use xserve_core::Response;

use super::{EdgeHandler, EdgeListener, EdgePlatform, EdgeServeInfo, EdgeServeOptions};
use crate::bind::resolve_bind_addr;
use crate::respond::settle;
use crate::shutdown::{StopMode, StopReceiver, StopSender, force_requested, stop_channel};

const EPHEMERAL_PORTS: std::ops::RangeInclusive<u16> = 49152..=65535;

/// Delivery failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Nothing is registered on the port.
    #[error("Connection refused: nothing is listening on port {port}")]
    ConnectionRefused {
        /// The target port.
        port: u16,
    },

    /// The registration was force-closed while the request was in flight.
    #[error("Request aborted: listener on port {port} was closed")]
    Aborted {
        /// The target port.
        port: u16,
    },
}

struct Route {
    id: u64,
    local_addr: SocketAddr,
    reuse_port: bool,
    handler: EdgeHandler,
    stop_rx: StopReceiver,
    // Dropped with the last `Arc<Route>`, which wakes a draining listener.
    _in_flight: watch::Receiver<()>,
}

struct Table {
    routes: Vec<Arc<Route>>,
    next_id: u64,
    next_port: u16,
    rotation: usize,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            next_id: 0,
            next_port: *EPHEMERAL_PORTS.start(),
            rotation: 0,
        }
    }
}

impl Table {
    fn port_in_use(&self, port: u16) -> bool {
        self.routes.iter().any(|route| route.local_addr.port() == port)
    }

    fn allocate_port(&mut self) -> Option<u16> {
        let span = usize::from(EPHEMERAL_PORTS.end() - EPHEMERAL_PORTS.start()) + 1;
        for _ in 0..span {
            let port = self.next_port;
            self.next_port = if port == *EPHEMERAL_PORTS.end() {
                *EPHEMERAL_PORTS.start()
            } else {
                port + 1
            };
            if !self.port_in_use(port) {
                return Some(port);
            }
        }
        None
    }

    fn conflicts(&self, addr: SocketAddr, reuse_port: bool) -> bool {
        self.routes.iter().any(|route| {
            let same_port = route.local_addr.port() == addr.port();
            let overlapping = route.local_addr.ip() == addr.ip()
                || route.local_addr.ip().is_unspecified()
                || addr.ip().is_unspecified();
            same_port && overlapping && !(reuse_port && route.reuse_port)
        })
    }

    fn pick(&mut self, port: u16) -> Option<Arc<Route>> {
        let matching: Vec<_> = self
            .routes
            .iter()
            .filter(|route| route.local_addr.port() == port)
            .collect();
        if matching.is_empty() {
            return None;
        }
        self.rotation = self.rotation.wrapping_add(1);
        Some(Arc::clone(matching[self.rotation % matching.len()]))
    }
}

/// Edge platform that keeps registrations in process memory.
#[derive(Clone, Default)]
pub struct InMemoryPlatform {
    table: Arc<Mutex<Table>>,
}

impl InMemoryPlatform {
    /// Create a platform with no registrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `request` to whatever is registered on `port`.
    ///
    /// `remote_addr` is what the handler will see as the peer.
    pub async fn dispatch(
        &self,
        port: u16,
        request: http::Request<Bytes>,
        remote_addr: Option<SocketAddr>,
    ) -> Result<Response, DispatchError> {
        let route = self
            .table
            .lock()
            .pick(port)
            .ok_or(DispatchError::ConnectionRefused { port })?;

        let info = EdgeServeInfo {
            local_addr: route.local_addr,
            remote_addr,
        };
        let forced = force_requested(route.stop_rx.clone());

        tokio::select! {
            result = (route.handler)(request, info) => Ok(settle(result)),
            () = forced => Err(DispatchError::Aborted { port }),
        }
    }

    /// Number of active registrations.
    pub fn listener_count(&self) -> usize {
        self.table.lock().routes.len()
    }
}

impl EdgePlatform for InMemoryPlatform {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn serve(
        &self,
        options: EdgeServeOptions,
        handler: EdgeHandler,
    ) -> Result<Box<dyn EdgeListener>, ServeError> {
        let ip = resolve_bind_addr(options.hostname.as_deref(), options.port)?.ip();
        let mut table = self.table.lock();

        let port = if options.port == 0 {
            table.allocate_port().ok_or_else(|| {
                ServeError::bind(
                    SocketAddr::new(ip, 0),
                    io::Error::new(io::ErrorKind::AddrNotAvailable, "no free ports"),
                )
            })?
        } else {
            options.port
        };
        let local_addr = SocketAddr::new(ip, port);

        if table.conflicts(local_addr, options.reuse_port) {
            return Err(ServeError::bind(
                local_addr,
                io::Error::from(io::ErrorKind::AddrInUse),
            ));
        }

        let (stop_tx, stop_rx) = stop_channel();
        let (idle_tx, idle_rx) = watch::channel(());
        let id = table.next_id;
        table.next_id += 1;
        table.routes.push(Arc::new(Route {
            id,
            local_addr,
            reuse_port: options.reuse_port,
            handler,
            stop_rx,
            _in_flight: idle_rx,
        }));

        info!(addr = %local_addr, platform = self.name(), "Edge listener registered");

        Ok(Box::new(InMemoryListener {
            table: Arc::clone(&self.table),
            id,
            local_addr,
            stop_tx,
            idle_tx,
        }))
    }
}

struct InMemoryListener {
    table: Arc<Mutex<Table>>,
    id: u64,
    local_addr: SocketAddr,
    stop_tx: StopSender,
    idle_tx: watch::Sender<()>,
}

impl InMemoryListener {
    fn unregister(&self) {
        self.table.lock().routes.retain(|route| route.id != self.id);
    }
}

#[async_trait]
impl EdgeListener for InMemoryListener {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn shutdown(self: Box<Self>, mode: StopMode) -> Result<(), ServeError> {
        self.unregister();
        self.stop_tx.send_replace(Some(mode));
        info!(addr = %self.local_addr, mode = ?mode, "Edge listener unregistered");

        self.idle_tx.closed().await;
        debug!(addr = %self.local_addr, "Edge listener idle");
        Ok(())
    }
}

impl Drop for InMemoryListener {
    fn drop(&mut self) {
        self.unregister();
    }
}
