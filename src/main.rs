//! xserve CLI entry point.
//!
//! Serves a demonstration echo handler on the detected host: `GET`
//! requests are answered with a JSON description of the request, any other
//! method echoes the request body back.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use http::{Method, StatusCode};
use serde_json::{Map, Value, json};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use xserve_common::{ConfigFile, LogConfig, LogFormat, PortSpec, RequestError};
use xserve_core::{PeerAddress, Request, Response, response};
use xserve_server::{HostKind, Server, ServerConfig, serve};

/// Serve one handler on whichever host is available.
#[derive(Debug, Parser)]
#[command(name = "xserve", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "XSERVE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (falls back to PORT, then 3000).
    #[arg(long)]
    port: Option<String>,

    /// Hostname or IP to bind.
    #[arg(long, env = "XSERVE_HOSTNAME")]
    hostname: Option<String>,

    /// Allow other processes to bind the same port.
    #[arg(long)]
    reuse_port: bool,

    /// Include the client's address in echoed requests.
    #[arg(long)]
    peer_address: bool,

    /// Host to serve on instead of detecting one.
    #[arg(long, env = "XSERVE_HOST")]
    host: Option<HostKind>,

    /// Log output format.
    #[arg(long, value_enum, env = "XSERVE_LOG_FORMAT")]
    log_format: Option<LogFormatArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

impl Args {
    /// Layer command-line flags over the configuration file.
    fn apply(&self, file: &mut ConfigFile) {
        if let Some(port) = &self.port {
            file.server.port = Some(PortSpec::from(port.as_str()));
        }
        if let Some(hostname) = &self.hostname {
            file.server.hostname = Some(hostname.clone());
        }
        if self.reuse_port {
            file.server.reuse_port = true;
        }
        if self.peer_address {
            file.server.peer_address = true;
        }
        if let Some(format) = self.log_format {
            file.log.format = format.into();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut file = match &args.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigFile::default(),
    };
    args.apply(&mut file);

    init_tracing(&file.log);
    info!("Starting xserve");

    let config = ServerConfig::from_fn(echo).with_options(file.server);
    let server = match args.host {
        Some(host) => Server::start(host, config),
        None => serve(config),
    }
    .context("Failed to start server")?;

    info!(runtime = %server.runtime(), url = %server.url(), "Echo server ready");

    shutdown_signal()
        .await
        .context("Failed to install signal handlers")?;
    server.stop(false).await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let registry = tracing_subscriber::registry().with(filter);

    match log.format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn echo(mut request: Request) -> Result<Response, RequestError> {
    if *request.method() != Method::GET {
        let body = request.bytes()?;
        return Ok(Response::new(body));
    }

    let headers: Map<String, Value> = request
        .headers()
        .iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect();
    let body = json!({
        "method": request.method().as_str(),
        "url": request.url().as_str(),
        "peer_address": request.peer_address().and_then(PeerAddress::get),
        "headers": headers,
    });

    Ok(response::json(StatusCode::OK, &body))
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }

    info!("Shutdown signal received");
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let args = Args::parse_from([
            "xserve",
            "--port",
            "8081",
            "--peer-address",
            "--host",
            "axum",
            "--log-format",
            "json",
        ]);
        let mut file = ConfigFile::from_toml("[server]\nport = 9000\nhostname = \"127.0.0.1\"")
            .unwrap();
        args.apply(&mut file);

        assert_eq!(file.server.resolve_port().unwrap(), 8081);
        assert_eq!(file.server.hostname.as_deref(), Some("127.0.0.1"));
        assert!(file.server.peer_address);
        assert!(!file.server.reuse_port);
        assert_eq!(file.log.format, LogFormat::Json);
        assert_eq!(args.host, Some(HostKind::Axum));
    }

    #[test]
    fn test_echo_get_describes_request() {
        let mut request = Request::new(Method::GET, "http://localhost:3000/a?b=1").unwrap();
        request.headers_mut().set("x-demo", "yes").unwrap();

        let response = tokio_test::block_on(echo(request)).unwrap();
        let body: Value = serde_json::from_slice(response.body()).unwrap();

        assert_eq!(body["method"], "GET");
        assert_eq!(body["url"], "http://localhost:3000/a?b=1");
        assert_eq!(body["peer_address"], Value::Null);
        assert_eq!(body["headers"]["x-demo"], "yes");
    }

    #[test]
    fn test_echo_returns_body() {
        let request = Request::new(Method::POST, "http://localhost/")
            .unwrap()
            .with_body("ping");

        let response = tokio_test::block_on(echo(request)).unwrap();
        assert_eq!(response.body().as_ref(), b"ping");
    }
}
