//! Bind-address resolution shared by the hosts that own a socket.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

use xserve_common::ServeError;

/// Resolve `hostname` and `port` into the address to bind.
///
/// An unset or blank hostname binds every IPv4 interface. IP literals
/// (bracketed or not) are used as-is; names are resolved through the system
/// resolver, preferring an IPv4 result.
pub fn resolve_bind_addr(hostname: Option<&str>, port: u16) -> Result<SocketAddr, ServeError> {
    let Some(host) = hostname.map(str::trim).filter(|host| !host.is_empty()) else {
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    };

    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let target = format!("{host}:{port}");
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| ServeError::bind(&target, e))?
        .collect();

    candidates
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| {
            ServeError::bind(
                &target,
                io::Error::new(io::ErrorKind::NotFound, "hostname resolved to no addresses"),
            )
        })
}

/// Host part of a URL that reaches a server bound to `addr`.
///
/// The configured hostname wins; wildcard binds are reported as
/// `localhost`.
pub fn url_host(hostname: Option<&str>, addr: SocketAddr) -> String {
    match hostname.map(str::trim).filter(|host| !host.is_empty()) {
        Some(host) if host.contains(':') && !host.starts_with('[') => format!("[{host}]"),
        Some(host) => host.to_string(),
        None if addr.ip().is_unspecified() => "localhost".to_string(),
        None => match addr.ip() {
            IpAddr::V4(ip) => ip.to_string(),
            IpAddr::V6(ip) => format!("[{ip}]"),
        },
    }
}
