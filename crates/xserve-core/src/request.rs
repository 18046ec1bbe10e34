//! Canonical request view.
//!
//! [`Request`] is what user handlers receive, whatever host produced the
//! native request. The body is buffered once by the adapter and shared by
//! every clone; it is never copied when normalizing.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::HOST;
use http::uri::Authority;
use http::{HeaderMap, Method, Uri, Version};
use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

use xserve_common::RequestError;

use crate::headers::Headers;
use crate::peer::PeerAddress;

/// Identity stamped on a native request by hosts that resolve connection
/// details through a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey(Uuid);

impl RequestKey {
    /// Generate a fresh key.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Type-erased reference to host-native transport objects.
///
/// This is the escape hatch for host features that are deliberately kept
/// off the canonical surface.
#[derive(Clone)]
pub struct RawTransport(Arc<dyn Any + Send + Sync>);

impl RawTransport {
    /// Wrap a host-native value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the wrapped value if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for RawTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTransport").finish_non_exhaustive()
    }
}

/// Host-independent HTTP request.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    version: Version,
    headers: Headers,
    /// `None` once the body has been read.
    body: Option<Bytes>,
    raw: Option<RawTransport>,
    peer: Option<PeerAddress>,
}

impl Request {
    /// Create a request with an empty body.
    ///
    /// `url` must be absolute.
    pub fn new(method: Method, url: &str) -> Result<Self, RequestError> {
        let url = Url::parse(url).map_err(RequestError::invalid_url)?;
        Ok(Self {
            method,
            url,
            version: Version::HTTP_11,
            headers: Headers::new(),
            body: Some(Bytes::new()),
            raw: None,
            peer: None,
        })
    }

    /// Normalize native request parts and an already-buffered body.
    ///
    /// Origin-form targets are made absolute using the `Host` header, or
    /// `fallback_authority` when the header is missing.
    pub fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        fallback_authority: &str,
    ) -> Result<Self, RequestError> {
        let url = absolute_url(&parts.uri, &parts.headers, fallback_authority)?;

        Ok(Self {
            method: parts.method,
            url,
            version: parts.version,
            headers: Headers::from(parts.headers),
            body: Some(body),
            raw: None,
            peer: None,
        })
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach host-native transport objects.
    #[must_use]
    pub fn with_raw(mut self, raw: RawTransport) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Attach a peer-address accessor.
    #[must_use]
    pub fn with_peer_address(mut self, peer: PeerAddress) -> Self {
        self.peer = Some(peer);
        self
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The absolute request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL path.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// The HTTP version the client spoke.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The normalized headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the normalized headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Host-native transport objects, if the host provides any.
    pub fn raw(&self) -> Option<&RawTransport> {
        self.raw.as_ref()
    }

    /// The peer-address accessor, present only when peer addresses are enabled.
    pub fn peer_address(&self) -> Option<&PeerAddress> {
        self.peer.as_ref()
    }

    /// Whether the body has been read.
    pub fn body_used(&self) -> bool {
        self.body.is_none()
    }

    /// Read the body as bytes.
    pub fn bytes(&mut self) -> Result<Bytes, RequestError> {
        self.body.take().ok_or(RequestError::BodyUsed)
    }

    /// Read the body as UTF-8 text.
    pub fn text(&mut self) -> Result<String, RequestError> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Read the body as JSON.
    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T, RequestError> {
        let bytes = self.bytes()?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Create an independent copy of this request.
    ///
    /// The copy shares the body buffer, the raw transport and the
    /// peer-address memo, but owns its headers; reading either body leaves
    /// the other readable.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BodyUsed`] if the body was already read.
    pub fn try_clone(&self) -> Result<Self, RequestError> {
        let body = self.body.clone().ok_or(RequestError::BodyUsed)?;

        Ok(Self {
            method: self.method.clone(),
            url: self.url.clone(),
            version: self.version,
            headers: self.headers.clone(),
            body: Some(body),
            raw: self.raw.clone(),
            peer: self.peer.clone(),
        })
    }
}

fn absolute_url(
    uri: &Uri,
    headers: &HeaderMap,
    fallback_authority: &str,
) -> Result<Url, RequestError> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Url::parse(&uri.to_string()).map_err(RequestError::invalid_url);
    }

    let host_base = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(host_authority)
        .and_then(|authority| base_url(authority.as_str()).ok());
    let mut url = match host_base {
        Some(url) => url,
        None => base_url(fallback_authority)?,
    };

    // Path and query come from the request target only.
    url.set_path(uri.path());
    url.set_query(uri.query());
    Ok(url)
}

/// A `Host` value usable as a URL authority: a bare host with an optional
/// port, no userinfo.
fn host_authority(host: &str) -> Option<Authority> {
    host.parse::<Authority>()
        .ok()
        .filter(|authority| !authority.as_str().contains('@'))
}

fn base_url(authority: &str) -> Result<Url, RequestError> {
    Url::parse(&format!("http://{authority}/")).map_err(RequestError::invalid_url)
}
