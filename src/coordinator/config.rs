//! Coordinator Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the coordination loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Interval between queue polls (ms)
    pub tick_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { tick_ms: 1000 }
    }
}

impl CoordinatorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}
