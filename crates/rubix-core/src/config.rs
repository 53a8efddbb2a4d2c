//! Engine configuration
//!
//! Defaults are tuned for the in-memory backend; `from_env` lets deployments
//! raise the scan page size when the store is remote.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Tunables shared by every engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Records fetched per index scan round trip
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,
}

fn default_scan_page_size() -> usize {
    512
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_page_size: default_scan_page_size(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(page_size) = env::var("RUBIX_SCAN_PAGE_SIZE") {
            match page_size.parse::<usize>() {
                Ok(size) if size > 0 => config.scan_page_size = size,
                _ => warn!("Invalid RUBIX_SCAN_PAGE_SIZE value: {}", page_size),
            }
        }

        config
    }

    /// Override the scan page size
    pub fn with_scan_page_size(mut self, scan_page_size: usize) -> Self {
        self.scan_page_size = scan_page_size.max(1);
        self
    }
}
