//! External collaborator interfaces
//!
//! The orchestration core never decodes, renders, scrapes or stores media
//! itself. It reaches those services only through the traits below;
//! [`crate::sim`] and [`crate::store`] provide in-process implementations.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Request headers attached to opens and downloads (Referer, User-Agent, ...)
pub type Headers = HashMap<String, String>;

/// Failure reported by a media engine for an open request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenError {
    /// Engine-specific error code, e.g. `0xC00D36C4`
    pub code: Option<String>,
    pub message: String,
}

impl OpenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Notifications from a media engine to its owning controller
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// An open request finished; `request` and `locator` echo the call
    OpenCompleted {
        request: u64,
        locator: String,
        error: Option<OpenError>,
    },
    /// Playback position in 100 ns ticks
    PositionChanged { ticks: i64 },
    /// Engine started or stopped buffering
    BufferingChanged { buffering: bool },
    /// Current media reached its natural end
    PlaybackEnded,
}

/// Rendering/decoding engine bound to one window
///
/// Calls are fire-and-forget; outcomes arrive as [`EngineEvent`]s on the
/// channel handed out by the [`EngineFactory`].
pub trait MediaEngine: Send + Sync {
    /// Begin opening `locator`; completion is reported asynchronously
    ///
    /// `request` identifies this call and must be echoed unchanged in the
    /// matching [`EngineEvent::OpenCompleted`].
    fn open(&self, request: u64, locator: &str, headers: &Headers) -> Result<()>;
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn seek(&self, position_ms: i64);
    fn set_speed(&self, speed: f64);
    fn set_volume(&self, volume: f32);
    /// Release the engine; no further events are expected afterwards
    fn detach(&self);
}

/// Creates one engine per window
pub trait EngineFactory: Send + Sync {
    fn create(&self, window_id: &str)
        -> (Arc<dyn MediaEngine>, mpsc::UnboundedReceiver<EngineEvent>);
}

/// Resolution quality a resolver expects for a page locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityHint {
    Unknown,
    Standard,
    High,
}

/// Page-to-direct locator resolution (site scrapers live behind this)
#[async_trait]
pub trait LocatorResolver: Send + Sync {
    /// True if `locator` is a page reference rather than direct media
    fn needs_resolution(&self, locator: &str) -> bool;

    /// Cheap, non-blocking quality estimate used to rank prefetch candidates
    fn quality_hint(&self, _locator: &str) -> QualityHint {
        QualityHint::Unknown
    }

    /// Headers the origin expects when fetching `locator`
    fn request_headers(&self, _locator: &str, _original_page: Option<&str>) -> Headers {
        Headers::new()
    }

    /// Resolve `page_locator` to a direct media locator
    ///
    /// Implementations must return promptly once `cancel` fires.
    async fn resolve_direct_locator(
        &self,
        page_locator: &str,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// A cache entry for a locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMedia {
    pub path: PathBuf,
    /// Download did not finish; the file holds only a prefix of the media
    pub partial: bool,
}

/// On-disk content cache
#[async_trait]
pub trait ContentCache: Send + Sync {
    fn cached(&self, locator: &str) -> Option<CachedMedia>;

    /// Download `locator` fully into the cache
    ///
    /// On cancellation nothing may become visible as a complete entry.
    async fn download(
        &self,
        locator: &str,
        headers: &Headers,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>;
}

/// Resume positions and shuffle history
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn position(&self, locator: &str) -> Result<Option<i64>>;
    async fn set_position(&self, locator: &str, position_ms: i64) -> Result<()>;
    async fn clear_position(&self, locator: &str) -> Result<()>;
    async fn played_history(&self, scope: &str) -> Result<Vec<String>>;
    async fn append_played(&self, scope: &str, locator: &str) -> Result<()>;
    async fn clear_played(&self, scope: &str) -> Result<()>;
}

/// Bundle of shared collaborators handed to every controller
#[derive(Clone)]
pub struct Services {
    pub resolver: Arc<dyn LocatorResolver>,
    pub cache: Arc<dyn ContentCache>,
    pub store: Arc<dyn PersistenceStore>,
}
