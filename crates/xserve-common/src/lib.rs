//! Common types, errors, and configuration for xserve.
//!
//! This crate provides shared functionality used across the xserve workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Server option records and their per-host override bags
//! - Port resolution (explicit value, `PORT` environment variable, default)
//! - TOML configuration file loading

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{
    AxumOverrides, DEFAULT_PORT, EdgeOverrides, PORT_ENV, PortSpec, ServerOptions,
    SocketOverrides, resolve_port, resolve_port_from_env,
};
pub use config_file::{ConfigFile, ConfigFileError, LogConfig, LogFormat};
pub use error::{BoxError, RequestError, ServeError};
