//! Queue items, validation and selection bookkeeping
//!
//! Everything here is plain data owned by a single controller actor; no
//! locking is needed.

use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Remote schemes accepted as well-formed
const REMOTE_SCHEMES: &[&str] = &["http", "https", "rtsp", "rtmp", "mms"];

/// One entry of a window's content queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// What is handed to the engine; replaced by the direct locator once a
    /// page reference has been resolved
    pub locator: String,
    #[serde(default)]
    pub is_remote: bool,
    /// Page the direct locator was resolved from
    #[serde(default)]
    pub original_page_locator: Option<String>,
    #[serde(default)]
    pub display_title: Option<String>,
    #[serde(default = "unit")]
    pub opacity: f32,
    #[serde(default = "unit")]
    pub volume: f32,
}

fn unit() -> f32 {
    1.0
}

impl QueueItem {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            is_remote: false,
            original_page_locator: None,
            display_title: None,
            opacity: 1.0,
            volume: 1.0,
        }
        .normalized()
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self {
            is_remote: false,
            ..Self::new(path)
        }
    }

    pub fn remote(locator: impl Into<String>) -> Self {
        Self {
            is_remote: true,
            ..Self::new(locator)
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.display_title = Some(title.into());
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Infer `is_remote` from a scheme and clamp opacity/volume into 0..=1
    pub fn normalized(mut self) -> Self {
        if self.locator.contains("://") {
            self.is_remote = true;
        }
        self.opacity = clamp_unit(self.opacity);
        self.volume = clamp_unit(self.volume);
        self
    }

    /// Stable identity used for failure counts, history and resume positions
    pub fn key(&self) -> &str {
        self.original_page_locator
            .as_deref()
            .unwrap_or(&self.locator)
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// Check an item before any engine call
///
/// Remote items need a known scheme and a host; local items need an
/// absolute path to an existing file.
pub fn validate(item: &QueueItem) -> Result<()> {
    if item.locator.trim().is_empty() {
        return Err(Error::Validation("empty locator".to_string()));
    }

    if item.is_remote {
        validate_remote(&item.locator)
    } else {
        let path = Path::new(&item.locator);
        if !path.is_absolute() {
            return Err(Error::Validation(format!(
                "local path is not absolute: {}",
                item.locator
            )));
        }
        if !path.is_file() {
            return Err(Error::Validation(format!(
                "local file does not exist: {}",
                item.locator
            )));
        }
        Ok(())
    }
}

fn validate_remote(locator: &str) -> Result<()> {
    let (scheme, rest) = locator
        .split_once("://")
        .ok_or_else(|| Error::Validation(format!("missing scheme: {}", locator)))?;

    let scheme = scheme.to_ascii_lowercase();
    if !REMOTE_SCHEMES.contains(&scheme.as_str()) {
        return Err(Error::Validation(format!("unsupported scheme: {}", scheme)));
    }

    let authority = rest
        .split(|c: char| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(Error::Validation(format!("missing host: {}", locator)));
    }

    Ok(())
}

/// Per-item and session-wide failure counts
#[derive(Debug, Clone)]
pub struct FailureCounters {
    per_item: HashMap<String, u32>,
    consecutive: u32,
    skip_threshold: u32,
    halt_threshold: u32,
}

impl FailureCounters {
    pub fn new(skip_threshold: u32, halt_threshold: u32) -> Self {
        Self {
            per_item: HashMap::new(),
            consecutive: 0,
            skip_threshold: skip_threshold.max(1),
            halt_threshold: halt_threshold.max(1),
        }
    }

    pub fn item_failures(&self, key: &str) -> u32 {
        self.per_item.get(key).copied().unwrap_or(0)
    }

    /// Item has reached the skip threshold and will not be loaded again
    pub fn is_exhausted(&self, key: &str) -> bool {
        self.item_failures(key) >= self.skip_threshold
    }

    /// Count one transient failure; returns the new count
    pub fn record_item_failure(&mut self, key: &str) -> u32 {
        let count = self.per_item.entry(key.to_string()).or_insert(0);
        *count = (*count + 1).min(self.skip_threshold);
        *count
    }

    /// Force the item straight to the skip threshold
    pub fn mark_exhausted(&mut self, key: &str) {
        self.per_item.insert(key.to_string(), self.skip_threshold);
    }

    pub fn clear_item(&mut self, key: &str) {
        self.per_item.remove(key);
    }

    /// Count one session failure; returns true once the halt threshold is reached
    pub fn record_session_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive >= self.halt_threshold
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn reset_session(&mut self) {
        self.consecutive = 0;
    }

    pub fn reset_all(&mut self) {
        self.per_item.clear();
        self.consecutive = 0;
    }
}

/// Shuffle fairness: keys picked since the last history reset
#[derive(Debug, Clone, Default)]
pub struct PlayedHistory {
    played: HashSet<String>,
}

impl PlayedHistory {
    pub fn from_keys(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            played: keys.into_iter().collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.played.contains(key)
    }

    pub fn len(&self) -> usize {
        self.played.len()
    }

    pub fn is_empty(&self) -> bool {
        self.played.is_empty()
    }

    pub fn clear(&mut self) {
        self.played.clear();
    }

    /// Pick a random index not in `tried` and not yet played, and record it
    ///
    /// When every untried index has already been played the history is
    /// cleared first; the returned flag reports that reset. Returns `None`
    /// once every index has been tried.
    pub fn pick<R: Rng + ?Sized>(
        &mut self,
        queue: &[QueueItem],
        tried: &HashSet<usize>,
        rng: &mut R,
    ) -> Option<(usize, bool)> {
        let untried: Vec<usize> = (0..queue.len()).filter(|i| !tried.contains(i)).collect();
        if untried.is_empty() {
            return None;
        }

        let mut candidates: Vec<usize> = untried
            .iter()
            .copied()
            .filter(|&i| !self.played.contains(queue[i].key()))
            .collect();

        let mut reset = false;
        if candidates.is_empty() {
            self.played.clear();
            reset = true;
            candidates = untried;
        }

        let index = candidates[rng.gen_range(0..candidates.len())];
        self.played.insert(queue[index].key().to_string());
        Some((index, reset))
    }
}

/// Next index in sequential order with wraparound
///
/// `None` means "before first", so the first call yields 0.
pub fn next_sequential(current: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(match current {
        Some(i) => (i + 1) % len,
        None => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn items(n: usize) -> Vec<QueueItem> {
        (0..n)
            .map(|i| QueueItem::remote(format!("https://cdn.example.com/{}.mp4", i)))
            .collect()
    }

    #[test]
    fn test_remote_validation() {
        assert!(validate(&QueueItem::new("https://cdn.example.com/a.mp4")).is_ok());
        assert!(validate(&QueueItem::new("rtsp://user@camera:554/stream")).is_ok());
        assert!(validate(&QueueItem::new("https:///nohost.mp4")).is_err());
        assert!(validate(&QueueItem::new("ftp://example.com/a.mp4")).is_err());
        assert!(validate(&QueueItem::remote("not a url")).is_err());
    }

    #[test]
    fn test_local_validation() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();
        assert!(validate(&QueueItem::local(path)).is_ok());
        assert!(validate(&QueueItem::local("relative/clip.mp4")).is_err());
        assert!(validate(&QueueItem::local("/definitely/missing/clip.mp4")).is_err());
    }

    #[test]
    fn test_normalized_infers_remote_and_clamps() {
        let item = QueueItem {
            volume: 3.0,
            opacity: f32::NAN,
            ..QueueItem::local("https://cdn.example.com/a.mp4")
        }
        .normalized();
        assert!(item.is_remote);
        assert_eq!(item.volume, 1.0);
        assert_eq!(item.opacity, 1.0);
    }

    #[test]
    fn test_key_prefers_original_page() {
        let page = "https://pages.example.com/clip";
        let mut item = QueueItem::remote(page);
        assert_eq!(item.key(), page);
        item.original_page_locator = Some(page.to_string());
        item.locator = "https://cdn.example.com/direct.mp4".to_string();
        assert_eq!(item.key(), page);
    }

    #[test]
    fn test_failure_counters() {
        let mut counters = FailureCounters::new(3, 2);
        assert_eq!(counters.record_item_failure("a"), 1);
        assert_eq!(counters.record_item_failure("a"), 2);
        assert!(!counters.is_exhausted("a"));
        assert_eq!(counters.record_item_failure("a"), 3);
        assert_eq!(counters.record_item_failure("a"), 3);
        assert!(counters.is_exhausted("a"));

        counters.mark_exhausted("b");
        assert!(counters.is_exhausted("b"));
        counters.clear_item("b");
        assert!(!counters.is_exhausted("b"));

        assert!(!counters.record_session_failure());
        assert!(counters.record_session_failure());
        counters.reset_all();
        assert_eq!(counters.consecutive(), 0);
        assert!(!counters.is_exhausted("a"));
    }

    #[test]
    fn test_next_sequential_wraps() {
        assert_eq!(next_sequential(None, 3), Some(0));
        assert_eq!(next_sequential(Some(1), 3), Some(2));
        assert_eq!(next_sequential(Some(2), 3), Some(0));
        assert_eq!(next_sequential(None, 0), None);
    }

    #[test]
    fn test_shuffle_covers_queue_before_repeating() {
        let queue = items(7);
        let mut history = PlayedHistory::default();
        let mut rng = StdRng::seed_from_u64(17);
        let tried = HashSet::new();

        let mut draws = Vec::new();
        let mut resets = 0;
        for _ in 0..queue.len() * 2 {
            let (index, reset) = history.pick(&queue, &tried, &mut rng).unwrap();
            if reset {
                resets += 1;
            }
            draws.push(index);
        }

        for round in draws.chunks(queue.len()) {
            let unique: HashSet<_> = round.iter().collect();
            assert_eq!(unique.len(), queue.len());
        }
        assert_eq!(resets, 1);
    }

    #[test]
    fn test_shuffle_respects_tried_set() {
        let queue = items(3);
        let mut history = PlayedHistory::default();
        let mut rng = StdRng::seed_from_u64(3);
        let tried: HashSet<usize> = [0, 2].into_iter().collect();

        assert_eq!(history.pick(&queue, &tried, &mut rng), Some((1, false)));
        // Only untried index is already played: history resets
        assert_eq!(history.pick(&queue, &tried, &mut rng), Some((1, true)));

        let all: HashSet<usize> = (0..3).collect();
        assert_eq!(history.pick(&queue, &all, &mut rng), None);
    }
}
