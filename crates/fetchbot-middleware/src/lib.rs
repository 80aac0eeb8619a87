//! `fetchbot-middleware` – telemetry plumbing.
//!
//! # Modules
//!
//! - [`bus`] – [`EventBus`][bus::EventBus]: headless broadcast bus carrying
//!   per-cycle [`StatusRecord`][fetchbot_types::StatusRecord] snapshots and
//!   obstacle-override events to whoever cares to listen. Publishing with no
//!   subscribers is a normal condition, never an error.

pub mod bus;

pub use bus::{EventBus, Listener};
