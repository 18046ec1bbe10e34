//! Response type and conversions.
//!
//! Handlers may return anything implementing [`IntoResponse`]: a full
//! [`Response`], a string, bytes, a `(StatusCode, body)` pair, or a
//! `Result` of those.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::StatusCode;

use crate::handler::{HandlerError, HandlerResult};

/// Host-independent HTTP response with a fully buffered body.
pub type Response = http::Response<Bytes>;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// Conversion from handler return values into a response.
pub trait IntoResponse {
    /// Convert into a response, or the handler error to propagate.
    fn into_response(self) -> HandlerResult;
}

impl IntoResponse for Response {
    fn into_response(self) -> HandlerResult {
        Ok(self)
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> HandlerResult {
        Ok(text(StatusCode::OK, self))
    }
}

impl IntoResponse for String {
    fn into_response(self) -> HandlerResult {
        Ok(text(StatusCode::OK, self))
    }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> HandlerResult {
        Ok(Response::new(self))
    }
}

impl IntoResponse for Vec<u8> {
    fn into_response(self) -> HandlerResult {
        Ok(Response::new(Bytes::from(self)))
    }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> HandlerResult {
        Ok(empty(self))
    }
}

impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> HandlerResult {
        let (status, body) = self;
        let mut response = body.into_response()?;
        *response.status_mut() = status;
        Ok(response)
    }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: Into<HandlerError>,
{
    fn into_response(self) -> HandlerResult {
        self.map_err(Into::into)?.into_response()
    }
}

/// Create a plain-text response.
pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
    with_content_type(status, Bytes::from(body.into()), TEXT_PLAIN)
}

/// Create a JSON response.
pub fn json(status: StatusCode, body: &serde_json::Value) -> Response {
    with_content_type(status, Bytes::from(body.to_string()), APPLICATION_JSON)
}

/// Create an error response with a JSON body.
pub fn error(status: StatusCode, message: &str) -> Response {
    json(status, &serde_json::json!({ "error": message }))
}

/// Create an empty response with just a status code.
pub fn empty(status: StatusCode) -> Response {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

fn with_content_type(status: StatusCode, body: Bytes, content_type: &'static str) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_response() {
        let resp = "Hello, World!".into_response().unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.body(), &Bytes::from("Hello, World!"));
        assert_eq!(resp.headers()[CONTENT_TYPE], TEXT_PLAIN);
    }

    #[test]
    fn test_status_pair() {
        let resp = (StatusCode::CREATED, String::from("made"))
            .into_response()
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.body(), &Bytes::from("made"));
    }

    #[test]
    fn test_error_response() {
        let resp = error(StatusCode::NOT_FOUND, "Not found");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(resp.body()).contains("Not found"));
        assert_eq!(resp.headers()[CONTENT_TYPE], APPLICATION_JSON);
    }

    #[test]
    fn test_result_err_propagates() {
        let result: Result<&'static str, std::io::Error> =
            Err(std::io::Error::other("disk on fire"));
        let err = result.into_response().unwrap_err();
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn test_bare_status() {
        let resp = StatusCode::NO_CONTENT.into_response().unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(resp.body().is_empty());
    }
}
