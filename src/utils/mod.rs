//! The `utils` module provides shared building blocks used across `chatrelay`:
//! the crate-wide error type and logging initialization.

pub mod error;
pub mod logging;

pub use error::{ChatError, Result};
