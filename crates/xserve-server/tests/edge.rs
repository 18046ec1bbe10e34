//! Edge host tests against the in-memory platform.
//!
//! Installing a platform is process-wide, so every test in this binary
//! serves on the edge host.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;

use xserve_common::RequestError;
use xserve_core::{Request, sync_handler};
use xserve_host::{DispatchError, InMemoryPlatform, install_platform};
use xserve_server::{HostKind, ServerConfig, serve};

fn platform() -> &'static InMemoryPlatform {
    static PLATFORM: OnceLock<InMemoryPlatform> = OnceLock::new();
    PLATFORM.get_or_init(|| {
        let platform = InMemoryPlatform::new();
        install_platform(Arc::new(platform.clone())).unwrap();
        platform
    })
}

fn get(uri: &str) -> http::Request<Bytes> {
    http::Request::builder()
        .uri(uri)
        .body(Bytes::new())
        .unwrap()
}

fn remote(addr: &str) -> Option<SocketAddr> {
    Some(addr.parse().unwrap())
}

fn body_text(response: &xserve_core::Response) -> String {
    String::from_utf8(response.body().to_vec()).unwrap()
}

#[tokio::test]
async fn test_serve_selects_edge_platform() {
    let platform = platform();
    let server = serve(
        ServerConfig::from_fn(|_req| async { "ok" })
            .with_hostname("127.0.0.1")
            .with_port(0u16),
    )
    .unwrap();

    assert_eq!(server.runtime(), HostKind::Edge);
    assert_eq!(server.hostname(), Some("127.0.0.1"));
    assert_eq!(server.url(), format!("http://127.0.0.1:{}/", server.port()));

    let response = platform.dispatch(server.port(), get("/"), None).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "ok");

    server.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_request_is_normalized() {
    let platform = platform();
    let handler = sync_handler(|mut req: Request| {
        let body = req.text()?;
        Ok::<_, RequestError>(format!("{} {} {body}", req.method(), req.url()))
    });
    let server = serve(ServerConfig::new(handler).with_port(0u16)).unwrap();

    let request = http::Request::builder()
        .method("POST")
        .uri("/items?x=1")
        .header("host", "edge.test")
        .body(Bytes::from("hi"))
        .unwrap();
    let response = platform.dispatch(server.port(), request, None).await.unwrap();
    assert_eq!(body_text(&response), "POST http://edge.test/items?x=1 hi");

    server.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_peer_address_from_platform() {
    let platform = platform();
    let handler = sync_handler(|req: Request| match req.peer_address() {
        None => "absent".to_string(),
        Some(peer) => peer.get().unwrap_or("unknown").to_string(),
    });

    let enabled = serve(
        ServerConfig::new(handler.clone())
            .with_port(0u16)
            .with_peer_address(true),
    )
    .unwrap();
    let disabled = serve(ServerConfig::new(handler).with_port(0u16)).unwrap();

    let response = platform
        .dispatch(enabled.port(), get("/"), remote("203.0.113.9:5000"))
        .await
        .unwrap();
    assert_eq!(body_text(&response), "203.0.113.9");

    let response = platform.dispatch(enabled.port(), get("/"), None).await.unwrap();
    assert_eq!(body_text(&response), "unknown");

    let response = platform
        .dispatch(disabled.port(), get("/"), remote("203.0.113.9:5000"))
        .await
        .unwrap();
    assert_eq!(body_text(&response), "absent");

    enabled.stop(false).await.unwrap();
    disabled.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_port_conflict_is_bind_error() {
    platform();
    let first = serve(ServerConfig::from_fn(|_req| async { "a" }).with_port(0u16)).unwrap();

    let err = serve(ServerConfig::from_fn(|_req| async { "b" }).with_port(first.port()))
        .unwrap_err();
    assert!(err.is_addr_in_use());

    first.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_handler_error_is_500() {
    let platform = platform();
    let server = serve(
        ServerConfig::new(sync_handler(|_req| {
            Err::<&'static str, _>(std::io::Error::other("boom"))
        }))
        .with_port(0u16),
    )
    .unwrap();

    let response = platform.dispatch(server.port(), get("/"), None).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    server.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_drain_then_refuse() {
    let platform = platform();
    let server = serve(
        ServerConfig::from_fn(|_req| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            "slow"
        })
        .with_port(0u16),
    )
    .unwrap();
    let port = server.port();

    let in_flight = tokio::spawn(platform.dispatch(port, get("/"), None));
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.stop(false).await.unwrap();

    let response = in_flight.await.unwrap().unwrap();
    assert_eq!(body_text(&response), "slow");
    assert_eq!(
        platform.dispatch(port, get("/"), None).await.unwrap_err(),
        DispatchError::ConnectionRefused { port }
    );
}

#[tokio::test]
async fn test_force_aborts_in_flight() {
    let platform = platform();
    let server = serve(
        ServerConfig::from_fn(|_req| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "never"
        })
        .with_port(0u16),
    )
    .unwrap();
    let port = server.port();

    let in_flight = tokio::spawn(platform.dispatch(port, get("/"), None));
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), server.stop(true))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        in_flight.await.unwrap().unwrap_err(),
        DispatchError::Aborted { port }
    );
}
