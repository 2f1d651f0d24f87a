//! Simulated collaborators
//!
//! In-process stand-ins for the renderer, the site resolver and the content
//! cache. The binary uses them to run a full session without real media;
//! tests use them to script engine events and observe calls.
//!
//! [`SimEngine`] runs in one of two modes:
//! - **manual**: `open` only records the call; the test completes it with
//!   [`SimEngine::complete_open`] or injects any [`EngineEvent`]
//! - **auto**: opens complete after `open_delay`, failing when the locator
//!   matches a configured rule; with `media_length` set, playback reports
//!   positions and ends on its own

use crate::error::{Error, Result};
use crate::media::{
    CachedMedia, ContentCache, EngineEvent, EngineFactory, Headers, LocatorResolver,
    MediaEngine, OpenError, QualityHint,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_common::timing::ms_to_ticks;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Position report interval during simulated playback
const POSITION_INTERVAL: Duration = Duration::from_millis(250);

/// Recorded engine call
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Open(String),
    Play,
    Pause,
    Stop,
    Seek(i64),
    SetSpeed(f64),
    SetVolume(f32),
    Detach,
}

/// Behavior shared by every engine a factory creates
#[derive(Debug, Clone, Default)]
pub struct SimBehavior {
    /// Complete opens automatically
    pub auto: bool,
    pub open_delay: Duration,
    /// Locator substring -> error reported for matching opens
    pub failures: Vec<(String, OpenError)>,
    /// Simulated media length; `None` plays forever
    pub media_length: Option<Duration>,
}

impl SimBehavior {
    pub fn manual() -> Self {
        Self::default()
    }

    pub fn auto(open_delay: Duration) -> Self {
        Self {
            auto: true,
            open_delay,
            ..Self::default()
        }
    }

    pub fn failing(mut self, pattern: impl Into<String>, error: OpenError) -> Self {
        self.failures.push((pattern.into(), error));
        self
    }

    pub fn with_media_length(mut self, length: Duration) -> Self {
        self.media_length = Some(length);
        self
    }

    fn failure_for(&self, locator: &str) -> Option<OpenError> {
        self.failures
            .iter()
            .find(|(pattern, _)| locator.contains(pattern.as_str()))
            .map(|(_, error)| error.clone())
    }
}

/// Simulated media engine
pub struct SimEngine {
    window_id: String,
    behavior: Arc<Mutex<SimBehavior>>,
    events: mpsc::UnboundedSender<EngineEvent>,
    calls: Mutex<Vec<EngineCall>>,
    /// Open request ids with their locators, in call order
    requests: Mutex<Vec<(u64, String)>>,
    /// Bumped by every call that invalidates running playback
    epoch: Arc<AtomicU64>,
    position_ms: Arc<AtomicI64>,
}

impl SimEngine {
    fn new(
        window_id: &str,
        behavior: Arc<Mutex<SimBehavior>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            window_id: window_id.to_string(),
            behavior,
            events: tx,
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            epoch: Arc::new(AtomicU64::new(0)),
            position_ms: Arc::new(AtomicI64::new(0)),
        });
        (engine, rx)
    }

    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    /// Deliver an engine event to the controller
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Report completion of the latest open request for `locator`
    pub fn complete_open(&self, locator: &str, error: Option<OpenError>) {
        let request = self
            .open_requests(locator)
            .last()
            .copied()
            .unwrap_or_default();
        self.complete_request(request, locator, error);
    }

    /// Report completion of a specific open request
    pub fn complete_request(&self, request: u64, locator: &str, error: Option<OpenError>) {
        self.emit(EngineEvent::OpenCompleted {
            request,
            locator: locator.to_string(),
            error,
        });
    }

    /// Request ids of every open of `locator`, in call order
    pub fn open_requests(&self, locator: &str) -> Vec<u64> {
        self.requests
            .lock()
            .iter()
            .filter(|(_, l)| l == locator)
            .map(|(request, _)| *request)
            .collect()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    /// Locators passed to `open`, in order
    pub fn opens(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                EngineCall::Open(locator) => Some(locator.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_open(&self) -> Option<String> {
        self.opens().pop()
    }

    pub fn count(&self, call: &EngineCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// Most recent volume applied
    pub fn volume(&self) -> Option<f32> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            EngineCall::SetVolume(v) => Some(*v),
            _ => None,
        })
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }

    fn invalidate_playback(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn start_playback_timer(&self) {
        let epoch = self.invalidate_playback();
        let Some(length) = self.behavior.lock().media_length else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let length_ms = length.as_millis() as i64;
        let step_ms = POSITION_INTERVAL.as_millis() as i64;
        let current_epoch = self.epoch.clone();
        let position = self.position_ms.clone();
        let events = self.events.clone();
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(POSITION_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if current_epoch.load(Ordering::SeqCst) != epoch {
                    return;
                }
                let now = (position.fetch_add(step_ms, Ordering::SeqCst) + step_ms).min(length_ms);
                let _ = events.send(EngineEvent::PositionChanged {
                    ticks: ms_to_ticks(now),
                });
                if now >= length_ms {
                    let _ = events.send(EngineEvent::PlaybackEnded);
                    return;
                }
            }
        });
    }
}

impl MediaEngine for SimEngine {
    fn open(&self, request: u64, locator: &str, _headers: &Headers) -> Result<()> {
        self.record(EngineCall::Open(locator.to_string()));
        self.requests.lock().push((request, locator.to_string()));
        self.invalidate_playback();
        self.position_ms.store(0, Ordering::SeqCst);

        let behavior = self.behavior.lock().clone();
        if !behavior.auto {
            return Ok(());
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Ok(());
        };

        let error = behavior.failure_for(locator);
        let events = self.events.clone();
        let locator = locator.to_string();
        handle.spawn(async move {
            tokio::time::sleep(behavior.open_delay).await;
            let _ = events.send(EngineEvent::OpenCompleted {
                request,
                locator,
                error,
            });
        });
        Ok(())
    }

    fn play(&self) {
        self.record(EngineCall::Play);
        self.start_playback_timer();
    }

    fn pause(&self) {
        self.record(EngineCall::Pause);
        self.invalidate_playback();
    }

    fn stop(&self) {
        self.record(EngineCall::Stop);
        self.invalidate_playback();
    }

    fn seek(&self, position_ms: i64) {
        self.record(EngineCall::Seek(position_ms));
        self.position_ms.store(position_ms, Ordering::SeqCst);
    }

    fn set_speed(&self, speed: f64) {
        self.record(EngineCall::SetSpeed(speed));
    }

    fn set_volume(&self, volume: f32) {
        self.record(EngineCall::SetVolume(volume));
    }

    fn detach(&self) {
        self.record(EngineCall::Detach);
        self.invalidate_playback();
    }
}

/// Factory handing out [`SimEngine`]s and keeping them reachable by window id
pub struct SimEngineFactory {
    behavior: Arc<Mutex<SimBehavior>>,
    engines: Mutex<HashMap<String, Arc<SimEngine>>>,
}

impl SimEngineFactory {
    pub fn new(behavior: SimBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Engine created for `window_id`
    pub fn engine(&self, window_id: &str) -> Option<Arc<SimEngine>> {
        self.engines.lock().get(window_id).cloned()
    }

    /// Change behavior for subsequent opens
    pub fn update(&self, f: impl FnOnce(&mut SimBehavior)) {
        f(&mut self.behavior.lock());
    }
}

impl EngineFactory for SimEngineFactory {
    fn create(
        &self,
        window_id: &str,
    ) -> (Arc<dyn MediaEngine>, mpsc::UnboundedReceiver<EngineEvent>) {
        let (engine, rx) = SimEngine::new(window_id, self.behavior.clone());
        self.engines
            .lock()
            .insert(window_id.to_string(), engine.clone());
        (engine, rx)
    }
}

/// Resolver for `https://pages.example.com/<name>` locators
///
/// Resolves `https://pages.example.com/clip` to
/// `https://media.example.com/clip.mp4` after `delay`, honoring
/// cancellation unless told to ignore it.
pub struct SimResolver {
    delay: Duration,
    ignore_cancellation: bool,
    failing: Mutex<HashSet<String>>,
    high_quality: Mutex<HashSet<String>>,
    tokens: Mutex<Vec<CancellationToken>>,
    calls: AtomicUsize,
    cancelled: AtomicUsize,
    completed: AtomicUsize,
}

/// Locators under this prefix are page references
pub const PAGE_PREFIX: &str = "https://pages.example.com/";

impl SimResolver {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ignore_cancellation: false,
            failing: Mutex::new(HashSet::new()),
            high_quality: Mutex::new(HashSet::new()),
            tokens: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Keep running to completion even after cancellation
    pub fn ignoring_cancellation(mut self) -> Self {
        self.ignore_cancellation = true;
        self
    }

    pub fn fail(&self, page: impl Into<String>) {
        self.failing.lock().insert(page.into());
    }

    pub fn mark_high_quality(&self, locator: impl Into<String>) {
        self.high_quality.lock().insert(locator.into());
    }

    /// Direct locator a page resolves to
    pub fn direct_for(page: &str) -> String {
        let name = page.strip_prefix(PAGE_PREFIX).unwrap_or(page);
        format!("https://media.example.com/{}.mp4", name)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Resolutions that returned because of cancellation
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Cancellation tokens received, in call order
    pub fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens.lock().clone()
    }
}

#[async_trait]
impl LocatorResolver for SimResolver {
    fn needs_resolution(&self, locator: &str) -> bool {
        locator.starts_with(PAGE_PREFIX)
    }

    fn quality_hint(&self, locator: &str) -> QualityHint {
        if self.high_quality.lock().contains(locator) {
            QualityHint::High
        } else {
            QualityHint::Standard
        }
    }

    fn request_headers(&self, _locator: &str, original_page: Option<&str>) -> Headers {
        let mut headers = Headers::new();
        if let Some(page) = original_page {
            headers.insert("Referer".to_string(), page.to_string());
        }
        headers
    }

    async fn resolve_direct_locator(
        &self,
        page_locator: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().push(cancel.clone());

        if self.ignore_cancellation {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                    return Err(Error::Cancelled(page_locator.to_string()));
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        if self.failing.lock().contains(page_locator) {
            return Err(Error::Resolution(format!("no media found on {}", page_locator)));
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(Self::direct_for(page_locator))
    }
}

/// In-memory content cache
///
/// Downloads take `download_delay` and then register a complete entry under
/// `root`; nothing is written to disk.
pub struct MemoryCache {
    root: PathBuf,
    download_delay: Duration,
    entries: Mutex<HashMap<String, CachedMedia>>,
    last_headers: Mutex<Option<Headers>>,
    started: AtomicUsize,
    completed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl MemoryCache {
    pub fn new(root: impl Into<PathBuf>, download_delay: Duration) -> Self {
        Self {
            root: root.into(),
            download_delay,
            entries: Mutex::new(HashMap::new()),
            last_headers: Mutex::new(None),
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, locator: impl Into<String>, media: CachedMedia) {
        self.entries.lock().insert(locator.into(), media);
    }

    /// Cache path a locator downloads to
    pub fn path_for(&self, locator: &str) -> PathBuf {
        let name: String = locator
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .collect();
        self.root.join(name)
    }

    pub fn downloads_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn downloads_completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn downloads_cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn last_headers(&self) -> Option<Headers> {
        self.last_headers.lock().clone()
    }
}

#[async_trait]
impl ContentCache for MemoryCache {
    fn cached(&self, locator: &str) -> Option<CachedMedia> {
        self.entries.lock().get(locator).cloned()
    }

    async fn download(
        &self,
        locator: &str,
        headers: &Headers,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        self.started.fetch_add(1, Ordering::SeqCst);
        *self.last_headers.lock() = Some(headers.clone());

        tokio::select! {
            _ = cancel.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                return Err(Error::Cancelled(locator.to_string()));
            }
            _ = tokio::time::sleep(self.download_delay) => {}
        }

        let path = self.path_for(locator);
        self.insert(
            locator,
            CachedMedia {
                path: path.clone(),
                partial: false,
            },
        );
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(path)
    }
}
