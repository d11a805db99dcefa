//! Application Configuration
//!
//! Loaded from an optional TOML file merged with `VAULTWATCH_`-prefixed
//! environment variables (nested keys split on `__`).

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::catalog::TemplateConfig;
use crate::types::Result;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Extra geometry-catalog templates merged over the built-ins
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
}

/// Listen address configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Observed storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Identifier of the observed storage
    #[serde(default)]
    pub id: Option<String>,
    /// Request a whole-storage snapshot at session start
    #[serde(default = "default_true")]
    pub request_on_start: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            id: None,
            request_on_start: true,
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then the TOML file (when given),
    /// then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("VAULTWATCH_").split("__"));
        Ok(figment.extract::<AppConfig>()?)
    }
}
