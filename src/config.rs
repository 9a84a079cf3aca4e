//! Tunables for the integration driver and the batch jobs.

use serde::{Deserialize, Serialize};

/// Settings for [`Engine`](crate::Engine).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Prepended to every minted action id.
    pub action_id_prefix: String,
    /// Characters of the content hash kept in an action id.
    pub hash_prefix_len: usize,
    /// Documents fetched per store scan while reading inputs.
    pub read_page_size: usize,
    /// Attempts before an integration gives up on conflicts.
    pub max_commit_attempts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action_id_prefix: "a".to_string(),
            hash_prefix_len: 12,
            read_page_size: 256,
            max_commit_attempts: 5,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.action_id_prefix = prefix.into();
        self
    }

    pub fn with_hash_prefix_len(mut self, len: usize) -> Self {
        self.hash_prefix_len = len;
        self
    }

    pub fn with_read_page_size(mut self, size: usize) -> Self {
        self.read_page_size = size.max(1);
        self
    }

    pub fn with_max_commit_attempts(mut self, attempts: usize) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }
}

/// Settings for the consistency and backfill jobs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchConfig {
    /// Keys processed per page.
    pub page_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

impl BatchConfig {
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }
}
