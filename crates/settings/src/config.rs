use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::endpoints::{endpoint_path, ENDPOINTS};
use crate::error::{Result, SettingsError};

pub const DEFAULT_CONFIG_FILE: &str = "config/api_config.json";

/// Where the analysis API listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
    /// Request timeout in seconds
    pub timeout: u64,
    pub protocol: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            timeout: 10,
            protocol: "http".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
}

impl Settings {
    /// Read settings from `path`. A missing or unreadable file yields the
    /// defaults and a warning.
    pub async fn load(path: &Path) -> Self {
        if !path.exists() {
            warn!(path = %path.display(), "Settings file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => {
                    debug!(path = %path.display(), "Settings loaded");
                    settings
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse settings, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read settings file, using defaults");
                Self::default()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await.map_err(write_err)?;
        debug!(path = %path.display(), "Settings saved");

        Ok(())
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.api.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.api.port = port;
        self
    }

    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.api.protocol, self.api.host, self.api.port
        )
    }

    pub fn endpoint_url(&self, name: &str) -> Result<String> {
        let path = endpoint_path(name)
            .ok_or_else(|| SettingsError::UnknownEndpoint(name.to_string()))?;
        Ok(format!("{}{}", self.base_url(), path))
    }

    /// Every registered endpoint with its full URL.
    pub fn endpoint_urls(&self) -> Vec<(&'static str, String)> {
        let base = self.base_url();
        ENDPOINTS
            .iter()
            .map(|(name, path)| (*name, format!("{}{}", base, path)))
            .collect()
    }
}
