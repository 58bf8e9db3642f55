// SPDX-License-Identifier: MPL-2.0

//! Persistent Widget Configuration Store
//!
//! Maps each host-assigned widget instance id to the camera entity it shows.
//! This is the only durable state of the daemon; everything rendered is
//! recomputed from it on each refresh.
//!
//! # Store Location
//!
//! `~/.local/share/ha-camera-widget/widgets.json` unless overridden in the
//! config. The file is a single JSON object:
//!
//! ```text
//! { "7": "camera.front", "12": "camera.garage" }
//! ```
//!
//! # Thread Safety
//!
//! All operations take the same mutex, so each one is atomic with respect to
//! the others. Mutations are applied to a copy of the map, written out
//! (temp file + rename) while the lock is held, and only become visible once
//! the write succeeded. A failed write leaves the store unchanged.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WidgetError};

/// Widget instance id, assigned by the host when the widget is placed.
pub type WidgetId = u32;

/// Configuration of one placed camera widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub widget_id: WidgetId,
    /// Entity supplying the picture (e.g. "camera.front")
    pub entity_id: String,
}

impl WidgetConfig {
    pub fn new(widget_id: WidgetId, entity_id: impl Into<String>) -> Self {
        Self {
            widget_id,
            entity_id: entity_id.into(),
        }
    }
}

/// Storage for widget configurations.
///
/// Implementations must tolerate concurrent calls from independent refreshes.
pub trait WidgetStore: Send + Sync {
    fn get(&self, widget_id: WidgetId) -> Option<WidgetConfig>;

    /// All configurations, ordered by widget id.
    fn get_all(&self) -> Vec<WidgetConfig>;

    /// Insert or overwrite the configuration for `config.widget_id`.
    fn add(&self, config: WidgetConfig) -> Result<()>;

    /// Remove every listed id. Absent ids are ignored.
    fn delete_all(&self, widget_ids: &[WidgetId]) -> Result<()>;
}

/// JSON-file backed [`WidgetStore`].
pub struct JsonWidgetStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<WidgetId, String>>,
}

impl JsonWidgetStore {
    /// Open the store at `path`.
    ///
    /// A missing file is an empty store. A file that cannot be parsed is an
    /// error rather than an empty store, so configured widgets aren't lost.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| WidgetError::Serialization {
                context: "widget store",
                details: format!("{}: {}", path.display(), e),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(WidgetError::io(&path, e)),
        };
        log::info!("Loaded {} widget configuration(s) from {:?}", entries.len(), path);
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, entries: &BTreeMap<WidgetId, String>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WidgetError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(entries).map_err(|e| WidgetError::Serialization {
            context: "widget store",
            details: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| WidgetError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| WidgetError::io(path, e))
    }
}

impl WidgetStore for JsonWidgetStore {
    fn get(&self, widget_id: WidgetId) -> Option<WidgetConfig> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&widget_id)
            .map(|entity_id| WidgetConfig::new(widget_id, entity_id.clone()))
    }

    fn get_all(&self) -> Vec<WidgetConfig> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|(id, entity_id)| WidgetConfig::new(*id, entity_id.clone()))
            .collect()
    }

    fn add(&self, config: WidgetConfig) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = entries.clone();
        updated.insert(config.widget_id, config.entity_id);
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn delete_all(&self, widget_ids: &[WidgetId]) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = entries.clone();
        for id in widget_ids {
            updated.remove(id);
        }
        if updated.len() == entries.len() {
            return Ok(());
        }
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }
}
