//! Error types for tessera-player
//!
//! Per-item failures never cross controller boundaries as errors; they are
//! counted and retried inside the controller. These variants cover the
//! collaborator seams, configuration and the control surface.

use thiserror::Error;

/// Main error type for tessera-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed locator or missing local file
    #[error("Invalid queue item: {0}")]
    Validation(String),

    /// Page-to-direct locator resolution failed
    #[error("Locator resolution failed: {0}")]
    Resolution(String),

    /// Media engine refused or failed an open request
    #[error("Media open failed: {0}")]
    Open(String),

    /// Background download into the content cache failed
    #[error("Download failed: {0}")]
    Download(String),

    /// Operation observed its cancellation token
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Controller actor is no longer running
    #[error("Controller closed: {0}")]
    ControllerClosed(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Errors surfaced from tessera-common
    #[error(transparent)]
    Common(#[from] tessera_common::Error),

    /// Database query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True if this error only reports that the operation was superseded
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

/// Convenience Result type using tessera-player Error
pub type Result<T> = std::result::Result<T, Error>;
