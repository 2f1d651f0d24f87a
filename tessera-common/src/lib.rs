//! # Tessera Common Library
//!
//! Shared code for the Tessera workspace:
//! - Error type shared by all crates
//! - Event types (PlayerEvent enum) and the EventBus
//! - Tick/millisecond conversions for the logical clock
//! - Configuration file resolution
//! - SQLite persistence for resume positions and shuffle history

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod timing;

pub use error::{Error, Result};
pub use events::{EventBus, FailureKind, PlayerEvent, TerminalReason};
