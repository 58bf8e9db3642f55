// SPDX-License-Identifier: MPL-2.0

//! File-based widget surface.
//!
//! Each widget gets a JSON state file that the host shell reads to draw it,
//! plus a PNG of the last bound camera frame. Both are written to a temp
//! file and renamed into place, so the host never reads a partial file:
//!
//! ```text
//! ~/.cache/ha-camera-widget/surfaces/widget-7.json
//! ~/.cache/ha-camera-widget/surfaces/widget-7.png
//! ```
//!
//! The state file lists which regions are visible, what the image region
//! shows and, per trigger region, the event line the host should send back
//! on stdin when the user activates it.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::event::WidgetEvent;
use super::frame::CameraFrame;
use super::render::{Region, RenderTarget};
use super::store::WidgetId;
use crate::error::{Result, WidgetError};

/// What the image region currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// Nothing bound yet
    Empty,
    /// The application icon
    DefaultIcon,
    /// A decoded camera frame
    Frame { path: PathBuf, width: u32, height: u32 },
}

/// Serialized state of one widget surface.
#[derive(Debug, Clone, Serialize)]
pub struct SurfaceState {
    pub widget_id: WidgetId,
    pub image_visible: bool,
    pub placeholder_visible: bool,
    pub error_visible: bool,
    pub image: ImageSource,
    /// Event to emit per activatable region
    pub triggers: BTreeMap<String, WidgetEvent>,
    /// RFC 3339 time of the last commit
    pub updated_at: String,
}

impl SurfaceState {
    fn new(widget_id: WidgetId) -> Self {
        Self {
            widget_id,
            image_visible: false,
            placeholder_visible: true,
            error_visible: false,
            image: ImageSource::Empty,
            triggers: BTreeMap::new(),
            updated_at: String::new(),
        }
    }
}

/// [`RenderTarget`] writing widget surfaces to a directory.
pub struct FileSurface {
    dir: PathBuf,
    widgets: HashMap<WidgetId, SurfaceState>,
}

impl FileSurface {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| WidgetError::io(&dir, e))?;
        Ok(Self {
            dir,
            widgets: HashMap::new(),
        })
    }

    pub fn state_path(&self, widget_id: WidgetId) -> PathBuf {
        self.dir.join(format!("widget-{}.json", widget_id))
    }

    pub fn image_path(&self, widget_id: WidgetId) -> PathBuf {
        self.dir.join(format!("widget-{}.png", widget_id))
    }

    fn state(&mut self, widget_id: WidgetId) -> &mut SurfaceState {
        self.widgets
            .entry(widget_id)
            .or_insert_with(|| SurfaceState::new(widget_id))
    }
}

fn region_key(region: Region) -> String {
    match region {
        Region::Image => String::from("image"),
        Region::Placeholder => String::from("placeholder"),
        Region::Error => String::from("error"),
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WidgetError::io(path, e)),
    }
}

impl RenderTarget for FileSurface {
    fn set_visibility(&mut self, widget_id: WidgetId, region: Region, visible: bool) -> Result<()> {
        let state = self.state(widget_id);
        match region {
            Region::Image => state.image_visible = visible,
            Region::Placeholder => state.placeholder_visible = visible,
            Region::Error => state.error_visible = visible,
        }
        Ok(())
    }

    fn show_default_icon(&mut self, widget_id: WidgetId) -> Result<()> {
        self.state(widget_id).image = ImageSource::DefaultIcon;
        Ok(())
    }

    fn bind_image(&mut self, widget_id: WidgetId, frame: &CameraFrame) -> Result<()> {
        let path = self.image_path(widget_id);
        let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(|| {
            WidgetError::Serialization {
                context: "camera frame",
                details: format!(
                    "{}x{} frame with {} bytes of pixel data",
                    frame.width,
                    frame.height,
                    frame.data.len()
                ),
            }
        })?;
        let tmp = path.with_extension("png.tmp");
        img.save_with_format(&tmp, image::ImageFormat::Png)
            .map_err(|e| WidgetError::Serialization {
                context: "camera frame",
                details: e.to_string(),
            })?;
        fs::rename(&tmp, &path).map_err(|e| WidgetError::io(&path, e))?;

        self.state(widget_id).image = ImageSource::Frame {
            path,
            width: frame.width,
            height: frame.height,
        };
        Ok(())
    }

    fn bind_trigger(&mut self, widget_id: WidgetId, region: Region, event: WidgetEvent) -> Result<()> {
        self.state(widget_id).triggers.insert(region_key(region), event);
        Ok(())
    }

    fn commit(&mut self, widget_id: WidgetId) -> Result<()> {
        let path = self.state_path(widget_id);
        let state = self.state(widget_id);
        state.updated_at = chrono::Utc::now().to_rfc3339();

        let json = serde_json::to_string_pretty(state).map_err(|e| WidgetError::Serialization {
            context: "widget surface",
            details: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| WidgetError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| WidgetError::io(&path, e))
    }

    fn release(&mut self, widget_id: WidgetId) -> Result<()> {
        self.widgets.remove(&widget_id);
        remove_if_present(&self.state_path(widget_id))?;
        remove_if_present(&self.image_path(widget_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn read_state(surface: &FileSurface, widget_id: WidgetId) -> Value {
        let content = fs::read_to_string(surface.state_path(widget_id)).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[test]
    fn test_commit_writes_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = FileSurface::new(dir.path().join("surfaces")).unwrap();

        surface.set_visibility(3, Region::Image, false).unwrap();
        surface.set_visibility(3, Region::Placeholder, true).unwrap();
        surface.set_visibility(3, Region::Error, true).unwrap();
        surface.show_default_icon(3).unwrap();
        surface
            .bind_trigger(3, Region::Placeholder, WidgetEvent::RefreshRequested { widget_id: 3 })
            .unwrap();
        surface.commit(3).unwrap();

        let state = read_state(&surface, 3);
        assert_eq!(state["image_visible"], false);
        assert_eq!(state["placeholder_visible"], true);
        assert_eq!(state["error_visible"], true);
        assert_eq!(state["image"]["kind"], "default_icon");
        assert_eq!(state["triggers"]["placeholder"]["event"], "refresh_requested");
        assert_eq!(state["triggers"]["placeholder"]["widget_id"], 3);
        assert!(chrono::DateTime::parse_from_rfc3339(state["updated_at"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_bound_frame_is_saved_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = FileSurface::new(dir.path()).unwrap();
        let frame = CameraFrame {
            data: vec![255, 0, 0, 255, 0, 255, 0, 255],
            width: 2,
            height: 1,
        };

        surface.set_visibility(8, Region::Image, true).unwrap();
        surface.bind_image(8, &frame).unwrap();
        surface.commit(8).unwrap();

        assert!(!surface.image_path(8).with_extension("png.tmp").exists());
        let png = image::open(surface.image_path(8)).unwrap().to_rgba8();
        assert_eq!(png.dimensions(), (2, 1));
        assert_eq!(png.get_pixel(1, 0).0, [0, 255, 0, 255]);

        let state = read_state(&surface, 8);
        assert_eq!(state["image"]["kind"], "frame");
        assert_eq!(state["image"]["width"], 2);
    }

    #[test]
    fn test_mismatched_frame_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = FileSurface::new(dir.path()).unwrap();
        let frame = CameraFrame {
            data: vec![0; 3],
            width: 4,
            height: 4,
        };
        assert!(surface.bind_image(1, &frame).is_err());
        assert!(!surface.image_path(1).exists());
    }

    #[test]
    fn test_release_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = FileSurface::new(dir.path()).unwrap();
        let frame = CameraFrame {
            data: vec![0; 4],
            width: 1,
            height: 1,
        };
        surface.bind_image(5, &frame).unwrap();
        surface.commit(5).unwrap();

        surface.release(5).unwrap();
        assert!(!surface.state_path(5).exists());
        assert!(!surface.image_path(5).exists());
        // releasing again is fine
        surface.release(5).unwrap();
    }
}
