//! Request handler contract.
//!
//! A handler maps a canonical [`Request`] to a response, possibly after
//! suspending. Errors are returned, never swallowed: adapters hand them to
//! the host's own per-request error path.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use xserve_common::BoxError;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Error produced by a user handler.
pub type HandlerError = BoxError;

/// Outcome of one handler invocation.
pub type HandlerResult = Result<Response, HandlerError>;

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A request handler shared by every connection of a server.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handle one request.
    async fn call(&self, request: Request) -> HandlerResult;
}

/// Handler backed by an async closure. See [`handler_fn`].
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`Handler`].
///
/// ```ignore
/// let handler = handler_fn(|_request| async { "ok" });
/// ```
pub fn handler_fn<F, Fut, R>(f: F) -> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut, R> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    async fn call(&self, request: Request) -> HandlerResult {
        (self.f)(request).await.into_response()
    }
}

/// Handler backed by a synchronous closure. See [`sync_handler`].
#[derive(Clone)]
pub struct SyncHandler<F> {
    f: F,
}

/// Wrap a synchronous closure as a [`Handler`].
pub fn sync_handler<F, R>(f: F) -> SyncHandler<F>
where
    F: Fn(Request) -> R + Send + Sync + 'static,
    R: IntoResponse + Send + 'static,
{
    SyncHandler { f }
}

#[async_trait]
impl<F, R> Handler for SyncHandler<F>
where
    F: Fn(Request) -> R + Send + Sync + 'static,
    R: IntoResponse + Send + 'static,
{
    async fn call(&self, request: Request) -> HandlerResult {
        (self.f)(request).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use http::{Method, StatusCode};

    use super::*;

    fn request(body: &'static str) -> Request {
        Request::new(Method::POST, "http://localhost/")
            .unwrap()
            .with_body(body)
    }

    #[test]
    fn test_async_handler() {
        let handler = handler_fn(|mut request: Request| async move {
            request.text().map(|body| body.to_uppercase())
        });

        let response = tokio_test::block_on(handler.call(request("hi"))).unwrap();
        assert_eq!(response.body(), &Bytes::from("HI"));
    }

    #[test]
    fn test_sync_handler() {
        let handler = sync_handler(|_request| (StatusCode::ACCEPTED, "queued"));

        let response = tokio_test::block_on(handler.call(request(""))).unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_handler_error_propagates() {
        let handler = sync_handler(|_request| Err::<&'static str, _>("handler exploded"));

        let err = tokio_test::block_on(handler.call(request(""))).unwrap_err();
        assert_eq!(err.to_string(), "handler exploded");
    }

    #[test]
    fn test_handler_as_trait_object() {
        let handler: Arc<dyn Handler> = Arc::new(handler_fn(|_request| async { "ok" }));

        let response = tokio_test::block_on(handler.call(request(""))).unwrap();
        assert_eq!(response.body(), &Bytes::from("ok"));
    }
}
