//! One adapter per host.

pub(crate) mod axum;
pub(crate) mod edge;
pub(crate) mod socket;

pub(crate) use self::axum::AxumAdapter;
pub(crate) use self::edge::EdgeAdapter;
pub(crate) use self::socket::SocketAdapter;
