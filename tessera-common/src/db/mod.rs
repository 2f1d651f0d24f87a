//! Database initialization and queries
//!
//! Backs the resume-position and shuffle-history persistence used by
//! playback controllers.

pub mod history;
pub mod init;
pub mod positions;

pub use init::*;
