//! Cross-host HTTP serving for xserve.
//!
//! Write one handler against the canonical [`Request`](xserve_core::Request)
//! and serve it unmodified on whichever host is present:
//!
//! ```ignore
//! use xserve_core::handler_fn;
//! use xserve_server::{ServerConfig, serve};
//!
//! let server = serve(ServerConfig::new(handler_fn(|_req| async { "ok" })).with_port(0u16))?;
//! println!("listening on {}", server.url());
//! server.stop(false).await?;
//! ```
//!
//! # Modules
//!
//! - [`config`]: The configuration record and its builder
//! - [`detect`]: Host kinds and process-wide host detection
//! - [`server`]: The lifecycle wrapper returned by [`serve`]
//! - `adapter` / `adapters`: One adapter per host, normalizing its native
//!   request into the canonical one

mod adapter;
mod adapters;
pub mod config;
pub mod detect;
pub mod server;

pub use config::ServerConfig;
pub use detect::{HOST_ENV, HostKind, active_host, detect_host};
pub use server::{Server, serve};
pub use xserve_host::StopMode;
