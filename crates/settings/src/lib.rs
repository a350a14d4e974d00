//! Connection settings for the deployed analysis API.

pub mod config;
pub mod endpoints;
pub mod error;

pub use config::{ApiSettings, Settings, DEFAULT_CONFIG_FILE};
pub use endpoints::{endpoint_path, ENDPOINTS};
pub use error::{Result, SettingsError};
