//! Timeline configuration.
//!
//! Defaults match what the history pane has always used; a RON file can
//! override any subset of fields:
//!
//! ```ron
//! (
//!     draft_prefix: "drafts.",
//!     resolve_slack_ms: 3600000,
//!     merge_window_ms: 300000,
//! )
//! ```

use serde::{Deserialize, Serialize};

/// Tunables for a [`Timeline`](crate::Timeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Draft document id = prefix + published id.
    pub draft_prefix: String,
    /// How far past a chunk's end timestamp a time reference may point before
    /// the search gives up. Transactions are not guaranteed to arrive in
    /// timestamp order.
    pub resolve_slack_ms: u64,
    /// Max gap between two edits grouped into the same chunk.
    pub merge_window_ms: u64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            draft_prefix: "drafts.".to_string(),
            resolve_slack_ms: 60 * 60 * 1000,
            merge_window_ms: 5 * 60 * 1000,
        }
    }
}

impl TimelineConfig {
    /// Parse a config from RON text. Missing fields keep their defaults.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn with_draft_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.draft_prefix = prefix.into();
        self
    }

    pub fn with_resolve_slack_ms(mut self, slack: u64) -> Self {
        self.resolve_slack_ms = slack;
        self
    }

    pub fn with_merge_window_ms(mut self, window: u64) -> Self {
        self.merge_window_ms = window;
        self
    }

    /// Draft id for a published document id.
    pub fn draft_id(&self, published_id: &str) -> String {
        format!("{}{published_id}", self.draft_prefix)
    }
}

/// Errors that can occur when loading a config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TimelineConfig::default();
        assert_eq!(config.draft_id("doc"), "drafts.doc");
        assert_eq!(config.resolve_slack_ms, 3_600_000);
        assert_eq!(config.merge_window_ms, 300_000);
    }

    #[test]
    fn test_partial_ron() {
        let config = TimelineConfig::from_ron("(merge_window_ms: 1000)").unwrap();
        assert_eq!(config.merge_window_ms, 1000);
        assert_eq!(config.draft_prefix, "drafts.");
    }

    #[test]
    fn test_bad_ron() {
        assert!(matches!(TimelineConfig::from_ron("(merge_window_ms: )"), Err(ConfigError::Ron(_))));
    }

    #[test]
    fn test_builder() {
        let config = TimelineConfig::default()
            .with_draft_prefix("wip.")
            .with_resolve_slack_ms(0)
            .with_merge_window_ms(10);
        assert_eq!(config.draft_id("a"), "wip.a");
        assert_eq!(config.resolve_slack_ms, 0);
        assert_eq!(config.merge_window_ms, 10);
    }
}
