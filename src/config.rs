// SPDX-License-Identifier: MPL-2.0

//! Daemon configuration.
//!
//! Stored as pretty-printed JSON at
//! `~/.config/ha-camera-widget/config.json`. A missing file yields the
//! defaults; a file that exists but cannot be parsed is an error, since
//! silently falling back would point the widgets at the wrong server.
//!
//! `HA_CAMERA_WIDGET_URL` and `HA_CAMERA_WIDGET_TOKEN` override the stored
//! server URL and access token.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WidgetError};
use crate::widget::frame::ImageBounds;

/// Directory name used under the platform config/data/cache dirs.
pub const APP_DIR: &str = "ha-camera-widget";

pub const URL_ENV: &str = "HA_CAMERA_WIDGET_URL";
pub const TOKEN_ENV: &str = "HA_CAMERA_WIDGET_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Home Assistant server
    pub server_url: String,
    /// Long-lived access token for the REST API
    pub access_token: String,
    /// Timeout for entity queries and image downloads
    pub request_timeout_secs: u64,
    /// Largest image width bound into a widget
    pub max_image_width: u32,
    /// Largest image height bound into a widget
    pub max_image_height: u32,
    /// How often NetworkManager is polled for connectivity
    pub connectivity_poll_secs: u64,
    /// Widget configuration store, defaults to the data dir
    pub store_path: Option<PathBuf>,
    /// Where rendered widget surfaces are written, defaults to the cache dir
    pub surface_dir: Option<PathBuf>,
    /// Log at debug level
    pub debug_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: String::from("http://homeassistant.local:8123"),
            access_token: String::new(),
            request_timeout_secs: 5,
            max_image_width: 1024,
            max_image_height: 600,
            connectivity_poll_secs: 5,
            store_path: None,
            surface_dir: None,
            debug_logging: false,
        }
    }
}

impl Config {
    /// Default location of the config file.
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        path.push(APP_DIR);
        path.push("config.json");
        path
    }

    /// Load the config from the default location and apply env overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load the config file at `path`, returning defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| WidgetError::ConfigParse {
                path: path.to_path_buf(),
                details: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(WidgetError::io(path, e)),
        }
    }

    /// Save the config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WidgetError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| WidgetError::Serialization {
            context: "config",
            details: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| WidgetError::io(path, e))
    }

    /// Apply environment overrides. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_blank(URL_ENV) {
            self.server_url = url.trim().to_string();
        }
        if let Some(token) = non_blank(TOKEN_ENV) {
            self.access_token = token.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(WidgetError::InvalidConfig {
                details: format!("server_url must be http(s), got {:?}", self.server_url),
            });
        }
        if self.max_image_width == 0 || self.max_image_height == 0 {
            return Err(WidgetError::InvalidConfig {
                details: String::from("image bounds must be non-zero"),
            });
        }
        if self.request_timeout_secs == 0 || self.connectivity_poll_secs == 0 {
            return Err(WidgetError::InvalidConfig {
                details: String::from("timeouts and poll intervals must be non-zero"),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connectivity_poll_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity_poll_secs)
    }

    pub fn image_bounds(&self) -> ImageBounds {
        ImageBounds {
            max_width: self.max_image_width,
            max_height: self.max_image_height,
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
            path.push(APP_DIR);
            path.push("widgets.json");
            path
        })
    }

    pub fn surface_dir(&self) -> PathBuf {
        self.surface_dir.clone().unwrap_or_else(|| {
            let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
            path.push(APP_DIR);
            path.push("surfaces");
            path
        })
    }
}
