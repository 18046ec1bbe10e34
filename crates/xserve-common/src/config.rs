//! Server option records.
//!
//! This module defines the host-independent options every adapter accepts:
//! - [`ServerOptions`]: Normalized fields plus one override bag per host
//! - [`PortSpec`]: A port given as a number or as text
//! - [`SocketOverrides`], [`AxumOverrides`], [`EdgeOverrides`]: Host-specific
//!   escape hatches, merged after the normalized fields
//!
//! Port precedence is explicit value, then the `PORT` environment variable,
//! then [`DEFAULT_PORT`].

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ServeError;

/// Port used when neither an explicit value nor `PORT` is set.
pub const DEFAULT_PORT: u16 = 3000;

/// Environment variable consulted when no explicit port is configured.
pub const PORT_ENV: &str = "PORT";

/// A port given either as a number or as text (e.g. from a CLI or env file).
///
/// `0` asks the host for an OS-assigned port. Any number or string
/// deserializes; range and integer checks happen when the port is
/// resolved, so the error names the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PortSpec {
    /// Numeric port.
    Number(i64),
    /// Textual port, parsed strictly after trimming whitespace.
    Text(String),
}

impl<'de> Deserialize<'de> for PortSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PortSpecVisitor)
    }
}

struct PortSpecVisitor;

impl Visitor<'_> for PortSpecVisitor {
    type Value = PortSpec;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a port number or string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<PortSpec, E> {
        Ok(PortSpec::Number(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<PortSpec, E> {
        Ok(i64::try_from(v).map_or_else(|_| PortSpec::Text(v.to_string()), PortSpec::Number))
    }

    // Debug keeps the fraction, so `8080.0` is rejected rather than read as 8080.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<PortSpec, E> {
        Ok(PortSpec::Text(format!("{v:?}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<PortSpec, E> {
        Ok(PortSpec::Text(v.to_string()))
    }
}

impl PortSpec {
    /// Parse this value into a bindable port.
    fn parse(&self, source: &str) -> Result<u16, ServeError> {
        match self {
            Self::Number(n) => u16::try_from(*n).map_err(|_| {
                ServeError::configuration(format!("{source} port {n} is out of range 0-65535"))
            }),
            Self::Text(text) => text.trim().parse::<u16>().map_err(|_| {
                ServeError::configuration(format!(
                    "{source} port {text:?} is not a non-negative integer in range 0-65535"
                ))
            }),
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<u16> for PortSpec {
    fn from(port: u16) -> Self {
        Self::Number(i64::from(port))
    }
}

impl From<&str> for PortSpec {
    fn from(port: &str) -> Self {
        Self::Text(port.to_string())
    }
}

impl From<String> for PortSpec {
    fn from(port: String) -> Self {
        Self::Text(port)
    }
}

/// Resolve the port to bind.
///
/// Precedence: `explicit`, then `env` (the value of `PORT`), then
/// [`DEFAULT_PORT`]. An empty or whitespace-only `env` counts as unset.
///
/// # Errors
///
/// Returns [`ServeError::Configuration`] if the chosen value is not an
/// unsigned integer in `0..=65535`.
pub fn resolve_port(explicit: Option<&PortSpec>, env: Option<&str>) -> Result<u16, ServeError> {
    if let Some(port) = explicit {
        return port.parse("configured");
    }

    match env.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => PortSpec::Text(value.to_string()).parse(PORT_ENV),
        None => Ok(DEFAULT_PORT),
    }
}

/// Resolve the port, reading `PORT` from the process environment.
pub fn resolve_port_from_env(explicit: Option<&PortSpec>) -> Result<u16, ServeError> {
    let env = std::env::var(PORT_ENV).ok();
    resolve_port(explicit, env.as_deref())
}

/// Host-independent server options.
///
/// This is the configuration record minus the request handler. It can be
/// loaded from a TOML file or built in code.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerOptions {
    /// Port to listen on. Falls back to `PORT`, then 3000.
    #[serde(default)]
    pub port: Option<PortSpec>,

    /// Hostname or IP to bind. Unset binds all interfaces.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Allow other processes to bind the same port (`SO_REUSEPORT`).
    ///
    /// Binding is non-exclusive only when this is set, on every host.
    #[serde(default)]
    pub reuse_port: bool,

    /// Attach a lazily-resolved peer address to every request.
    #[serde(default)]
    pub peer_address: bool,

    /// Socket host overrides.
    #[serde(default)]
    pub socket: SocketOverrides,

    /// Axum host overrides.
    #[serde(default)]
    pub axum: AxumOverrides,

    /// Edge host overrides.
    #[serde(default)]
    pub edge: EdgeOverrides,
}

impl ServerOptions {
    /// Resolve the configured port against the process environment.
    pub fn resolve_port(&self) -> Result<u16, ServeError> {
        resolve_port_from_env(self.port.as_ref())
    }
}

/// Socket host native options.
///
/// `port`, `hostname` and `exclusive` override the normalized fields when set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SocketOverrides {
    /// Port override.
    #[serde(default)]
    pub port: Option<u16>,

    /// Hostname override.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Exclusive binding. Defaults to `!reuse_port`.
    #[serde(default)]
    pub exclusive: Option<bool>,

    /// Listen backlog.
    #[serde(default)]
    pub backlog: Option<u32>,

    /// Set `TCP_NODELAY` on accepted connections.
    #[serde(default)]
    pub nodelay: Option<bool>,

    /// Keep HTTP/1.1 connections alive between requests.
    #[serde(default)]
    pub keep_alive: Option<bool>,

    /// Timeout for reading request headers, in seconds.
    #[serde(default)]
    pub header_read_timeout_secs: Option<u64>,
}

/// Axum host native options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AxumOverrides {
    /// Port override.
    #[serde(default)]
    pub port: Option<u16>,

    /// Hostname override.
    #[serde(default)]
    pub hostname: Option<String>,

    /// `SO_REUSEPORT` override.
    #[serde(default)]
    pub reuse_port: Option<bool>,

    /// Per-request timeout in seconds (answers 408 when exceeded).
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Maximum buffered body size in bytes (answers 413 when exceeded).
    #[serde(default)]
    pub max_body_bytes: Option<usize>,

    /// Install the HTTP trace layer. Defaults to `true`.
    #[serde(default)]
    pub trace: Option<bool>,
}

/// Edge host native options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EdgeOverrides {
    /// Port override.
    #[serde(default)]
    pub port: Option<u16>,

    /// Hostname override.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Port sharing override.
    #[serde(default)]
    pub reuse_port: Option<bool>,
}
