//! Store configuration types
//!
//! This module defines the few knobs the tag database exposes. Everything has
//! a sensible default so `TagbaseConfig::new()` is enough for most callers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`crate::Tagbase`] instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagbaseConfig {
    /// Longest legal tag, type or member name
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,

    /// Create the `System` type and the `_status` tag on startup
    #[serde(default = "default_true")]
    pub system_tags: bool,

    /// Maximum pending notifications per session (oldest dropped on overflow)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Default timeout for event waits in milliseconds
    #[serde(default = "default_wait_ms")]
    pub default_wait_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_name_length() -> usize {
    32
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_wait_ms() -> u64 {
    1000
}

impl Default for TagbaseConfig {
    fn default() -> Self {
        Self {
            max_name_length: default_max_name_length(),
            system_tags: default_true(),
            queue_capacity: default_queue_capacity(),
            default_wait_ms: default_wait_ms(),
        }
    }
}

impl TagbaseConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the maximum identifier length
    pub fn with_max_name_length(mut self, length: usize) -> Self {
        self.max_name_length = length;
        self
    }

    /// Builder method: enable or disable the system type and status tag
    pub fn with_system_tags(mut self, enabled: bool) -> Self {
        self.system_tags = enabled;
        self
    }

    /// Builder method: set the per-session notification queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Builder method: set the default wait timeout
    pub fn with_default_wait_ms(mut self, millis: u64) -> Self {
        self.default_wait_ms = millis;
        self
    }

    /// Default wait timeout as a `Duration`
    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }

    /// Check an identifier against the naming rules
    ///
    /// Names start with an ASCII letter or `_` and continue with ASCII
    /// alphanumerics or `_`.
    pub fn is_valid_name(&self, name: &str) -> bool {
        if name.is_empty() || name.len() > self.max_name_length {
            return false;
        }
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}
