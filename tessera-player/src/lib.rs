//! # Tessera Player Library (tessera-player)
//!
//! Playback orchestration for synchronized multi-window video.
//!
//! **Purpose:** Drive an arbitrary number of independent output windows
//! through their content queues, tolerate network and codec failures without
//! stalling the session, and keep grouped windows aligned on a shared clock.
//!
//! **Architecture:**
//! - [`clock`]: speed-scalable logical clock, private or shared by a group
//! - [`prefetch`]: cancellable look-ahead resolution and caching
//! - [`controller`]: one actor task per window owning its queue and retry state
//! - [`coordinator`]: fixed-tick scheduler aligning groups and gating shared clocks
//!
//! Rendering, URL scraping, cache storage and GUI are external collaborators
//! reached through the traits in [`media`].

pub mod api;
pub mod clock;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod failure;
pub mod media;
pub mod prefetch;
pub mod queue;
pub mod session;
pub mod sim;
pub mod store;

pub use error::{Error, Result};
pub use session::Session;
