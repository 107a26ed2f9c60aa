use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{InboxError, Result};
use crate::locale::LocaleKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub fetch_retries: u32,
    pub retry_base_delay_ms: u64,
    pub locale: LocaleKind,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            poll_interval_secs: 30,
            request_timeout_secs: 10,
            fetch_retries: 3,
            retry_base_delay_ms: 500,
            locale: LocaleKind::default(),
        }
    }
}

impl AppConfig {
    // TOML is the config format; an older JSON file is still read once and converted.
    fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("wa-inbox.toml"))
    }

    fn legacy_json_path() -> Option<PathBuf> {
        let proj = directories::ProjectDirs::from("com", "example", "WaInbox")?;
        Some(proj.config_dir().join("config.json"))
    }

    /// Load from the user config directory, falling back to defaults when no
    /// usable file exists.
    pub fn load() -> Self {
        Self::load_with(
            Self::toml_path().as_deref(),
            Self::legacy_json_path().as_deref(),
        )
    }

    /// Same as `load`, with the two candidate locations given explicitly.
    /// A usable legacy JSON file is rewritten as TOML at `toml`.
    pub fn load_with(toml: Option<&Path>, legacy: Option<&Path>) -> Self {
        if let Some(path) = toml {
            match Self::load_from(path) {
                Ok(Some(config)) => return config,
                Ok(None) => {}
                Err(e) => log::warn!("ignoring {}: {e}", path.display()),
            }
        }

        if let Some(legacy) = legacy {
            match Self::load_legacy_from(legacy) {
                Ok(Some(config)) => {
                    if let Some(path) = toml {
                        match config.save_to(path) {
                            Ok(()) => log::info!(
                                "migrated {} to {}",
                                legacy.display(),
                                path.display()
                            ),
                            Err(e) => log::warn!("could not migrate {}: {e}", legacy.display()),
                        }
                    }
                    return config;
                }
                Ok(None) => {}
                Err(e) => log::warn!("ignoring {}: {e}", legacy.display()),
            }
        }

        log::info!("no usable config file found, using defaults");
        Self::default()
    }

    /// Read an old-style JSON config file. `Ok(None)` when the file does not exist.
    pub fn load_legacy_from(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(InboxError::Config(e.to_string())),
        };
        let config: AppConfig =
            serde_json::from_slice(&bytes).map_err(|e| InboxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(Some(config))
    }

    /// Read a TOML config file. `Ok(None)` when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(InboxError::Config(e.to_string())),
        };
        let config: AppConfig =
            toml::from_str(&text).map_err(|e| InboxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(Some(config))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| InboxError::Config(e.to_string()))?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| InboxError::Config(e.to_string()))?;
        fs::write(path, toml).map_err(|e| InboxError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        crate::utils::base_url(&self.base_url)?;
        if self.poll_interval_secs == 0 {
            return Err(InboxError::Config(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(InboxError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
