//! Error types for xserve.
//!
//! This module defines the error hierarchy using `thiserror`:
//! - [`ServeError`]: Failures reported to the caller of `serve` / `Server::start`
//! - [`RequestError`]: Failures while reading or mutating a canonical request

use std::io;

use thiserror::Error;

/// Boxed error type produced by user request handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level server errors.
///
/// Every variant is reported synchronously to the caller of `serve` or
/// `Server::start`. None of them is retried: a failed start means no
/// server is running.
#[derive(Error, Debug)]
pub enum ServeError {
    /// A configuration value could not be parsed, or the active host cannot
    /// honor it.
    #[error("Invalid configuration: {reason}")]
    Configuration {
        /// Description of the configuration problem.
        reason: String,
    },

    /// The native listen call failed (port in use, permission denied,
    /// unresolvable hostname).
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// No recognized host capability is present in this process.
    #[error("Unsupported host: {reason}")]
    UnsupportedHost {
        /// Why no host could be selected.
        reason: String,
    },

    /// A user request handler failed.
    ///
    /// Hosts log this on their own per-request error path; it is never
    /// returned from `start`.
    #[error("Request handler failed: {0}")]
    Handler(#[source] BoxError),

    /// The server task ended abnormally while shutting down.
    #[error("Shutdown failed: {reason}")]
    Shutdown {
        /// Description of the failure.
        reason: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by the canonical request surface.
#[derive(Error, Debug)]
pub enum RequestError {
    /// The body has already been read.
    #[error("Request body already used")]
    BodyUsed,

    /// The body could not be collected from the native request.
    #[error("Failed to read request body: {reason}")]
    BodyRead {
        /// Description of the read failure.
        reason: String,
    },

    /// The body exceeded the configured limit.
    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },

    /// The body is not valid UTF-8.
    #[error("Request body is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The body is not valid JSON for the requested type.
    #[error("Invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A header name is not a valid HTTP token.
    #[error("Invalid header name: {name}")]
    InvalidHeaderName {
        /// The rejected name.
        name: String,
    },

    /// A header value contains forbidden bytes.
    #[error("Invalid header value for {name}")]
    InvalidHeaderValue {
        /// The header the value was meant for.
        name: String,
    },

    /// The request target could not be turned into an absolute URL.
    #[error("Invalid request URL: {reason}")]
    InvalidUrl {
        /// Description of the parse failure.
        reason: String,
    },
}

impl ServeError {
    /// Create a new `Configuration` error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a new `Bind` error.
    pub fn bind(addr: impl ToString, source: io::Error) -> Self {
        Self::Bind {
            addr: addr.to_string(),
            source,
        }
    }

    /// Create a new `UnsupportedHost` error.
    pub fn unsupported_host(reason: impl Into<String>) -> Self {
        Self::UnsupportedHost {
            reason: reason.into(),
        }
    }

    /// Create a new `Shutdown` error.
    pub fn shutdown(reason: impl Into<String>) -> Self {
        Self::Shutdown {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the listener could not be bound.
    pub fn is_bind(&self) -> bool {
        matches!(self, Self::Bind { .. })
    }

    /// Returns `true` if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns `true` if no host capability could be selected.
    pub fn is_unsupported_host(&self) -> bool {
        matches!(self, Self::UnsupportedHost { .. })
    }

    /// Returns `true` if the bind failed because the address is taken.
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, Self::Bind { source, .. } if source.kind() == io::ErrorKind::AddrInUse)
    }
}

impl RequestError {
    /// Create a new `InvalidHeaderName` error.
    pub fn invalid_header_name(name: impl Into<String>) -> Self {
        Self::InvalidHeaderName { name: name.into() }
    }

    /// Create a new `InvalidHeaderValue` error.
    pub fn invalid_header_value(name: impl Into<String>) -> Self {
        Self::InvalidHeaderValue { name: name.into() }
    }

    /// Create a new `BodyRead` error.
    pub fn body_read(reason: impl ToString) -> Self {
        Self::BodyRead {
            reason: reason.to_string(),
        }
    }

    /// Create a new `InvalidUrl` error.
    pub fn invalid_url(reason: impl ToString) -> Self {
        Self::InvalidUrl {
            reason: reason.to_string(),
        }
    }

    /// HTTP status a host should answer with when normalization fails.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BodyTooLarge { .. } => 413,
            _ => 400,
        }
    }
}
