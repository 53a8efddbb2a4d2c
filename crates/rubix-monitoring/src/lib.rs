//! Monitoring module for the Rubix graph store.
//!
//! Only structured logging lives here; engines emit `tracing` events and
//! this crate decides how they are rendered.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

pub mod logging;

pub use logging::{init_logging, init_test_logging};

/// Configuration for initializing logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Log level filter (e.g., "info,rubix_core=debug"); `RUST_LOG` wins when set
    pub log_filter: String,
    /// Emit JSON lines instead of pretty output
    pub enable_json_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "rubix".to_string(),
            log_filter: "info".to_string(),
            enable_json_logging: false,
        }
    }
}

impl MonitoringConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(filter) = env::var("RUST_LOG") {
            config.log_filter = filter;
        }

        if let Ok(name) = env::var("RUBIX_SERVICE_NAME") {
            config.service_name = name;
        }

        if let Ok(json) = env::var("RUBIX_LOG_JSON") {
            match json.to_lowercase().as_str() {
                "1" | "true" => config.enable_json_logging = true,
                "0" | "false" => config.enable_json_logging = false,
                _ => warn!("Invalid RUBIX_LOG_JSON value: {}", json),
            }
        }

        config
    }
}
