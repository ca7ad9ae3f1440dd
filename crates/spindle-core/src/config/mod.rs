//! Client configuration
//!
//! ```yaml
//! backend_address: 127.0.0.1:7878
//! directory_tag_name: directory
//! poll_interval_ms: 16
//! notification_queue_capacity: 0
//! auto_refresh_tags: true
//! ```
//!
//! Every field is optional; missing ones take their defaults.

mod io;
mod paths;

pub use paths::{config_dir, default_config_path};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::DIRECTORY_TAG_NAME;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of the backend
    pub backend_address: String,
    /// Tag name whose values are projected into the directory tree
    pub directory_tag_name: String,
    /// Event loop tick while no notification arrives
    pub poll_interval_ms: u64,
    /// Inbound notification queue bound; 0 for unbounded, overflow is dropped
    pub notification_queue_capacity: usize,
    /// Refetch tag sections on `TagListChanged`
    pub auto_refresh_tags: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_address: "127.0.0.1:7878".to_string(),
            directory_tag_name: DIRECTORY_TAG_NAME.to_string(),
            poll_interval_ms: 16,
            notification_queue_capacity: 0,
            auto_refresh_tags: true,
        }
    }
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
