//! Host-side per-request error path.

use bytes::Bytes;
use http::StatusCode;
use tracing::error;

use xserve_common::ServeError;
use xserve_core::response::text;
use xserve_core::{HandlerResult, Response};

/// Turn a handler outcome into the response a host writes.
///
/// Handler errors are logged and answered with a generic 500; their
/// details never reach the client.
pub fn settle(result: HandlerResult) -> Response {
    match result {
        Ok(response) => response,
        Err(e) => {
            let err = ServeError::Handler(e);
            error!(error = %err, "Request handler failed");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// Response sent in place of one cut off by a forced stop.
pub fn forced_close() -> http::Response<Bytes> {
    let mut response = text(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable");
    response.headers_mut().insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("close"),
    );
    response
}
