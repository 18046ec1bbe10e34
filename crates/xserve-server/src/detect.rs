//! Host detection.
//!
//! Exactly one host kind is active per process. The first successful
//! detection is cached and reused by every later [`serve`](crate::serve)
//! call.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use tokio::runtime::Handle;
use tracing::debug;

use xserve_common::ServeError;
use xserve_host::installed_platform;

/// Environment variable naming the host to use inside a tokio runtime.
pub const HOST_ENV: &str = "XSERVE_HOST";

/// The host capabilities xserve can serve on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    /// Socket-owning host driven by hyper's connection builder.
    Socket,
    /// Runtime-native accept loop provided by `axum::serve`.
    Axum,
    /// Platform-managed listener.
    Edge,
}

impl HostKind {
    /// Lowercase name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Axum => "axum",
            Self::Edge => "edge",
        }
    }
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostKind {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "socket" => Ok(Self::Socket),
            "axum" => Ok(Self::Axum),
            "edge" => Ok(Self::Edge),
            other => Err(ServeError::unsupported_host(format!(
                "unknown host {other:?} (expected socket, axum or edge)"
            ))),
        }
    }
}

/// Pick a host from what the process offers.
///
/// An installed edge platform wins. Otherwise a tokio runtime selects the
/// `requested` host, or the socket host when nothing is requested.
pub(crate) fn select_host(
    platform_installed: bool,
    runtime_present: bool,
    requested: Option<&str>,
) -> Result<HostKind, ServeError> {
    if platform_installed {
        return Ok(HostKind::Edge);
    }
    if !runtime_present {
        return Err(ServeError::unsupported_host(
            "no edge platform is installed and no tokio runtime is running",
        ));
    }

    match requested.map(str::trim).filter(|name| !name.is_empty()) {
        None => Ok(HostKind::Socket),
        Some(name) => match name.parse::<HostKind>()? {
            HostKind::Edge => Err(ServeError::unsupported_host(format!(
                "{HOST_ENV}=edge but no edge platform is installed"
            ))),
            kind => Ok(kind),
        },
    }
}

/// Inspect the process for a host capability, without caching.
pub fn detect_host() -> Result<HostKind, ServeError> {
    let requested = std::env::var(HOST_ENV).ok();
    select_host(
        installed_platform().is_some(),
        Handle::try_current().is_ok(),
        requested.as_deref(),
    )
}

static ACTIVE: OnceLock<HostKind> = OnceLock::new();

/// The host selected for this process.
///
/// Detection runs until it first succeeds; the result is then fixed.
pub fn active_host() -> Result<HostKind, ServeError> {
    if let Some(kind) = ACTIVE.get() {
        return Ok(*kind);
    }

    let detected = detect_host()?;
    let kind = *ACTIVE.get_or_init(|| detected);
    debug!(host = %kind, "Host selected");
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_wins() {
        assert_eq!(select_host(true, false, None).unwrap(), HostKind::Edge);
        assert_eq!(select_host(true, true, Some("axum")).unwrap(), HostKind::Edge);
    }

    #[test]
    fn test_runtime_defaults_to_socket() {
        assert_eq!(select_host(false, true, None).unwrap(), HostKind::Socket);
        assert_eq!(select_host(false, true, Some(" ")).unwrap(), HostKind::Socket);
    }

    #[test]
    fn test_requested_host() {
        assert_eq!(select_host(false, true, Some("AXUM")).unwrap(), HostKind::Axum);
        assert_eq!(select_host(false, true, Some("socket")).unwrap(), HostKind::Socket);
    }

    #[test]
    fn test_unsupported() {
        assert!(select_host(false, false, None).unwrap_err().is_unsupported_host());
        assert!(
            select_host(false, true, Some("edge"))
                .unwrap_err()
                .is_unsupported_host()
        );
        assert!(
            select_host(false, true, Some("iis"))
                .unwrap_err()
                .is_unsupported_host()
        );
    }

    #[test]
    fn test_host_kind_round_trip() {
        for kind in [HostKind::Socket, HostKind::Axum, HostKind::Edge] {
            assert_eq!(kind.to_string().parse::<HostKind>().unwrap(), kind);
        }
    }
}
