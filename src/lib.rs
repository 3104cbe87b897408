//! # chatrelay
//!
//! `chatrelay` is a real-time chat relay. Clients submit messages over HTTP
//! or a WebSocket; every message is persisted, cached for a short window,
//! appended to a durable log and fanned out to the other live connections.
//!
//! ## Core Modules
//!
//! - `hub`: registry of live connections and non-blocking broadcast.
//! - `client`: the registration a connection holds with the hub.
//! - `pipeline`: message types and the ingestion pipeline.
//! - `persistence`: the idempotent message store and the TTL cache.
//! - `durable`: the append-only log and its at-least-once consumer loop.
//! - `transport`: WebSocket sessions and HTTP endpoints.
//! - `config`: settings loaded from file and environment.
//! - `app`: process wiring.
//! - `utils`: error type and logging.

pub mod app;
pub mod client;
pub mod config;
pub mod durable;
pub mod hub;
pub mod persistence;
pub mod pipeline;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
