//! The `transport` module exposes the relay to clients.
//!
//! - `websocket`: the live-connection listener and per-connection sessions
//! - `http`: submission, read and health endpoints on axum
//! - `message`: HTTP response bodies

pub mod http;
pub mod message;
pub mod websocket;

pub use http::{router, start_http_server};
pub use websocket::{FrameOutcome, serve_websocket, start_websocket_server};
