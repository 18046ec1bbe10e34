//! Canonical request view and handler contract for xserve.
//!
//! This crate is host-independent. It provides:
//! - [`Request`]: The canonical request every handler receives
//! - [`Headers`]: The header operations common to all hosts
//! - [`PeerAddress`]: Lazily-resolved, memoized remote address
//! - [`Handler`]: The request → response contract, sync or async
//!
//! # Architecture
//!
//! ```text
//! native request ──► adapter normalizes ──► Request ──► Handler ──► Response
//!                          │                  ▲
//!                          └── augment() ─────┘  (only when peer addresses are enabled)
//! ```

pub mod handler;
pub mod headers;
pub mod peer;
pub mod request;
pub mod response;

pub use handler::{
    BoxFuture, FnHandler, Handler, HandlerError, HandlerResult, SyncHandler, handler_fn,
    sync_handler,
};
pub use headers::Headers;
pub use peer::{PeerAddress, PeerLookup, augment};
pub use request::{RawTransport, Request, RequestKey};
pub use response::{IntoResponse, Response};
