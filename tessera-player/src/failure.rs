//! Engine-open failure classification
//!
//! Error codes are specific to one media engine, so the classification is
//! configurable policy: case-insensitive substrings matched against the
//! reported code and message. Unrecoverable patterns win over exhaustion
//! patterns; anything unmatched is transient.

use crate::media::OpenError;
use serde::{Deserialize, Serialize};
use tessera_common::FailureKind;

/// Substring patterns for classifying engine failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub unrecoverable_patterns: Vec<String>,
    pub exhaustion_patterns: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let owned =
            |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self {
            unrecoverable_patterns: owned(&[
                "0xc00d5212",
                "codec not found",
                "unsupported codec",
                "no suitable decoder",
                "0x80070002",
                "file not found",
                "no such file",
                "404 not found",
                "http 404",
                "410 gone",
                "0xc00d36c4",
                "0x80190194",
            ]),
            exhaustion_patterns: owned(&[
                "0x8007000e",
                "out of memory",
                "insufficient system resources",
                "0x800705aa",
                "too many open files",
            ]),
        }
    }
}

/// Classifies [`OpenError`]s into failure kinds
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    unrecoverable: Vec<String>,
    exhaustion: Vec<String>,
}

impl FailureClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let lower = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect()
        };
        Self {
            unrecoverable: lower(&config.unrecoverable_patterns),
            exhaustion: lower(&config.exhaustion_patterns),
        }
    }

    pub fn classify(&self, error: &OpenError) -> FailureKind {
        let haystack = match &error.code {
            Some(code) => format!("{} {}", code, error.message).to_lowercase(),
            None => error.message.to_lowercase(),
        };

        if self.unrecoverable.iter().any(|p| haystack.contains(p.as_str())) {
            FailureKind::Unrecoverable
        } else if self.exhaustion.iter().any(|p| haystack.contains(p.as_str())) {
            FailureKind::ResourceExhaustion
        } else {
            FailureKind::Transient
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}
