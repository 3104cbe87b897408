//! The `hub` module tracks live connections and fans broadcasts out to them.
//!
//! - `engine`: the `Hub` state and the control loop that owns it
//! - `handle`: the cloneable `HubHandle` every other component talks to
//!
//! The connection set is only ever touched by the control loop. Sessions and
//! handlers send it registrations, unregistrations and broadcasts over three
//! independent channels.

pub mod engine;
pub mod handle;

pub use engine::{Broadcast, BroadcastPolicy, BroadcastReport, Hub};
pub use handle::{HubHandle, spawn_hub};
