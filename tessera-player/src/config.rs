//! tessera-player configuration
//!
//! Every behavior switch the controllers and coordinator consult lives here
//! and is passed in at construction; nothing reads process-wide settings.
//! All fields have defaults, so an empty TOML file is a valid configuration.

use crate::error::{Error, Result};
use crate::failure::ClassifierConfig;
use crate::queue::QueueItem;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete player configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub sync: SyncConfig,
    pub classifier: ClassifierConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(rename = "windows")]
    pub windows: Vec<WindowConfig>,
    #[serde(rename = "groups")]
    pub groups: Vec<GroupConfig>,
}

/// Per-controller playback behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Pick items uniformly at random from the not-yet-played set
    pub shuffle: bool,
    /// Save positions on switch/dispose and resume from them on open
    pub remember_position: bool,
    /// Per-item failures before the item is skipped without loading
    pub skip_threshold: u32,
    /// Session-wide consecutive failures before the controller halts
    pub halt_threshold: u32,
    /// Ceiling for self-triggered retries without a successful open
    pub max_recursion_depth: u32,
    /// Delay before retrying after an ordinary failure
    pub retry_delay_ms: u64,
    /// Delay before retrying after a resource-exhaustion failure
    pub exhaustion_retry_delay_ms: u64,
    /// How many upcoming items the prefetcher considers
    pub prefetch_lookahead: usize,
    /// A partial cache file is ignored when the saved position is at least this far in
    pub stale_partial_resume_ms: i64,
    /// Optional RNG seed for deterministic shuffle
    pub shuffle_seed: Option<u64>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            shuffle: false,
            remember_position: false,
            skip_threshold: 3,
            halt_threshold: 10,
            max_recursion_depth: 50,
            retry_delay_ms: 500,
            exhaustion_retry_delay_ms: 3000,
            prefetch_lookahead: 3,
            stale_partial_resume_ms: 5000,
            shuffle_seed: None,
        }
    }
}

impl PlaybackConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn exhaustion_retry_delay(&self) -> Duration {
        Duration::from_millis(self.exhaustion_retry_delay_ms)
    }
}

/// Coordinator scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fixed tick interval of the coordinator loop
    pub tick_interval_ms: u64,
    /// Minimum spacing between stall summaries for one group
    pub stall_log_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            stall_log_interval_ms: 5000,
        }
    }
}

impl SyncConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn stall_log_interval(&self) -> Duration {
        Duration::from_millis(self.stall_log_interval_ms)
    }
}

/// HTTP control surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5750)),
        }
    }
}

/// Persistence location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to `<data_dir>/tessera.db`
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| tessera_common::config::default_data_dir().join("tessera.db"))
    }
}

/// One output window and its initial queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    pub id: String,
    /// Sync group this window belongs to
    #[serde(default)]
    pub group: Option<String>,
    /// Initial window volume (0.0-1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub queue: Vec<QueueItem>,
}

fn default_volume() -> f32 {
    1.0
}

/// A named sync group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    /// Members share one clock gated on everyone being ready
    #[serde(default)]
    pub shared_clock: bool,
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let config: Config = tessera_common::config::load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = tessera_common::config::parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-references and thresholds
    pub fn validate(&self) -> Result<()> {
        if self.playback.skip_threshold == 0 {
            return Err(Error::Config("playback.skip_threshold must be at least 1".to_string()));
        }
        if self.playback.halt_threshold == 0 {
            return Err(Error::Config("playback.halt_threshold must be at least 1".to_string()));
        }

        let mut window_ids = HashSet::new();
        for window in &self.windows {
            if window.id.is_empty() {
                return Err(Error::Config("window id must not be empty".to_string()));
            }
            if !window_ids.insert(window.id.as_str()) {
                return Err(Error::Config(format!("duplicate window id: {}", window.id)));
            }
        }

        let mut group_names = HashSet::new();
        for group in &self.groups {
            if !group_names.insert(group.name.as_str()) {
                return Err(Error::Config(format!("duplicate group name: {}", group.name)));
            }
        }

        for window in &self.windows {
            if let Some(group) = &window.group {
                if !group_names.contains(group.as_str()) {
                    return Err(Error::Config(format!(
                        "window {} references unknown group {}",
                        window.id, group
                    )));
                }
            }
        }

        Ok(())
    }

    /// Group configuration by name
    pub fn group(&self, name: &str) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.playback.skip_threshold, 3);
        assert_eq!(config.playback.halt_threshold, 10);
        assert_eq!(config.playback.max_recursion_depth, 50);
        assert_eq!(config.playback.prefetch_lookahead, 3);
        assert_eq!(config.sync.tick_interval(), Duration::from_millis(100));
        assert!(config.windows.is_empty());
    }

    #[test]
    fn test_windows_and_groups_parse() {
        let config = Config::from_toml(
            r#"
            [playback]
            shuffle = true
            retry_delay_ms = 50

            [[groups]]
            name = "wall"
            shared_clock = true

            [[windows]]
            id = "left"
            group = "wall"
            queue = [
                { locator = "https://cdn.example.com/a.mp4", display_title = "A" },
                { locator = "/media/b.mp4", volume = 0.5 },
            ]

            [[windows]]
            id = "right"
            group = "wall"
            volume = 0.25
            "#,
        )
        .unwrap();

        assert!(config.playback.shuffle);
        assert_eq!(config.playback.retry_delay(), Duration::from_millis(50));
        assert_eq!(config.windows.len(), 2);
        assert_eq!(config.windows[0].queue.len(), 2);
        assert_eq!(config.windows[0].queue[1].volume, 0.5);
        assert_eq!(config.windows[1].volume, 0.25);
        assert!(config.group("wall").unwrap().shared_clock);
    }

    #[test]
    fn test_unknown_group_rejected() {
        let result = Config::from_toml(
            r#"
            [[windows]]
            id = "left"
            group = "missing"
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_window_rejected() {
        let result = Config::from_toml(
            r#"
            [[windows]]
            id = "a"
            [[windows]]
            id = "a"
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let result = Config::from_toml("[playback]\nskip_threshold = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_demo_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/config.toml");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.windows.len(), 3);
        assert!(config.group("wall").unwrap().shared_clock);
        assert!(config.playback.remember_position);
    }
}
