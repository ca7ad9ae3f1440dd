//! Reading and writing `client.yaml`

use anyhow::{Context, Result};
use std::path::Path;

use super::ClientConfig;
use crate::types::DIRECTORY_TAG_NAME;

impl ClientConfig {
    /// Parse a config file, failing on any read or parse error
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read client config {:?}", path))?;
        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid client config {:?}", path))?;
        Ok(config.sanitized())
    }

    /// Config at `path`, or the defaults when it is missing or unusable
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            log::info!("No client config at {:?}, using defaults", path);
            return Self::default();
        }
        match Self::read(path) {
            Ok(config) => {
                log::info!("Loaded client config from {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Write as YAML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }
        let yaml = serde_yaml::to_string(self).context("Failed to serialize client config")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write client config {:?}", path))?;
        log::info!("Saved client config to {:?}", path);
        Ok(())
    }

    /// Blank strings fall back to their defaults
    fn sanitized(mut self) -> Self {
        self.backend_address = self.backend_address.trim().to_string();
        if self.backend_address.is_empty() {
            self.backend_address = Self::default().backend_address;
        }
        if self.directory_tag_name.trim().is_empty() {
            log::warn!("Empty directory_tag_name, using {:?}", DIRECTORY_TAG_NAME);
            self.directory_tag_name = DIRECTORY_TAG_NAME.to_string();
        }
        self
    }
}
