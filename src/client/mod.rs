//! The `client` module defines a live connection as the hub sees it.
//!
//! A `Connection` is the registration half of a session: its id plus the
//! sending side of a bounded outbound channel. The session keeps the
//! receiving side and drains it into the socket.

pub mod connection;
pub use connection::{Connection, ConnectionId};
