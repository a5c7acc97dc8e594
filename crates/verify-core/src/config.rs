//! Client configuration
//!
//! Loaded from TOML; every section is optional. Environment variables
//! override the service endpoints and can supply an initial credential.
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:8100"
//! timeout_secs = 60
//!
//! [converter]
//! base_url = "http://localhost:8101"
//!
//! [render]
//! scale = 1.5
//!
//! [crop]
//! min_percent = 10.0
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use verify_client::ClientOptions;

use crate::crop::MIN_PERCENT;
use crate::document::DEFAULT_RENDER_SCALE;
use crate::error::ConfigError;

pub const ENV_BACKEND_URL: &str = "VERIFY_BACKEND_URL";
pub const ENV_CONVERTER_URL: &str = "VERIFY_CONVERTER_URL";
pub const ENV_TOKEN: &str = "VERIFY_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub crop: CropConfig,
    /// Initial credential; only ever set from the environment
    #[serde(skip)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:8100".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default = "default_converter_url")]
    pub base_url: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            base_url: default_converter_url(),
        }
    }
}

fn default_converter_url() -> String {
    "http://localhost:8101".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_scale")]
    pub scale: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scale: default_scale(),
        }
    }
}

fn default_scale() -> f64 {
    DEFAULT_RENDER_SCALE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropConfig {
    #[serde(default = "default_min_percent")]
    pub min_percent: f64,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            min_percent: default_min_percent(),
        }
    }
}

fn default_min_percent() -> f64 {
    MIN_PERCENT
}

impl ClientConfig {
    /// Load and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// File if given, defaults otherwise, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in
    /// production). Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_BACKEND_URL) {
            tracing::debug!("Backend URL from {}: {}", ENV_BACKEND_URL, url);
            self.backend.base_url = url;
        }
        if let Some(url) = get(ENV_CONVERTER_URL) {
            tracing::debug!("Converter URL from {}: {}", ENV_CONVERTER_URL, url);
            self.converter.base_url = url;
        }
        if let Some(token) = get(ENV_TOKEN) {
            self.token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.base_url is empty".to_string()));
        }
        if self.converter.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "converter.base_url is empty".to_string(),
            ));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "backend.timeout_secs must be positive".to_string(),
            ));
        }
        if !(self.render.scale.is_finite() && self.render.scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "render.scale must be positive, got {}",
                self.render.scale
            )));
        }
        if !(self.crop.min_percent > 0.0 && self.crop.min_percent <= 100.0) {
            return Err(ConfigError::Invalid(format!(
                "crop.min_percent must be in (0, 100], got {}",
                self.crop.min_percent
            )));
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.backend.base_url.clone(),
            converter_url: self.converter.base_url.clone(),
            timeout: Duration::from_secs(self.backend.timeout_secs),
        }
    }
}
