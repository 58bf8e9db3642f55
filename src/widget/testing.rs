// SPDX-License-Identifier: MPL-2.0

//! Test doubles for the controller's collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::entity::EntityResolver;
use super::event::WidgetEvent;
use super::frame::{CameraFrame, ImageFetcher};
use super::render::{Region, RenderTarget};
use super::store::WidgetId;
use crate::error::{ResolveError, Result, WidgetError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Visibility(Region, bool),
    DefaultIcon,
    Image(CameraFrame),
    Trigger(Region, WidgetEvent),
    Commit,
    Release,
}

/// Records every surface call per widget.
#[derive(Debug, Clone, Default)]
pub struct RecordingTarget {
    calls: Arc<Mutex<Vec<(WidgetId, SurfaceCall)>>>,
}

impl RecordingTarget {
    pub fn calls(&self, widget_id: WidgetId) -> Vec<SurfaceCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == widget_id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().unwrap().is_empty()
    }

    /// Last visibility set for `region`, if any.
    pub fn visibility(&self, widget_id: WidgetId, region: Region) -> Option<bool> {
        self.calls(widget_id).iter().rev().find_map(|call| match call {
            SurfaceCall::Visibility(r, visible) if *r == region => Some(*visible),
            _ => None,
        })
    }

    pub fn bound_images(&self, widget_id: WidgetId) -> Vec<CameraFrame> {
        self.calls(widget_id)
            .into_iter()
            .filter_map(|call| match call {
                SurfaceCall::Image(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    fn push(&self, widget_id: WidgetId, call: SurfaceCall) -> Result<()> {
        self.calls.lock().unwrap().push((widget_id, call));
        Ok(())
    }
}

impl RenderTarget for RecordingTarget {
    fn set_visibility(&mut self, widget_id: WidgetId, region: Region, visible: bool) -> Result<()> {
        self.push(widget_id, SurfaceCall::Visibility(region, visible))
    }

    fn show_default_icon(&mut self, widget_id: WidgetId) -> Result<()> {
        self.push(widget_id, SurfaceCall::DefaultIcon)
    }

    fn bind_image(&mut self, widget_id: WidgetId, frame: &CameraFrame) -> Result<()> {
        self.push(widget_id, SurfaceCall::Image(frame.clone()))
    }

    fn bind_trigger(&mut self, widget_id: WidgetId, region: Region, event: WidgetEvent) -> Result<()> {
        self.push(widget_id, SurfaceCall::Trigger(region, event))
    }

    fn commit(&mut self, widget_id: WidgetId) -> Result<()> {
        self.push(widget_id, SurfaceCall::Commit)
    }

    fn release(&mut self, widget_id: WidgetId) -> Result<()> {
        self.push(widget_id, SurfaceCall::Release)
    }
}

/// Resolver answering from a fixed table; unknown entities are not found.
#[derive(Debug, Default)]
pub struct ScriptedResolver {
    answers: HashMap<String, std::result::Result<String, ResolveError>>,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    pub fn with(mut self, entity_id: &str, answer: std::result::Result<&str, ResolveError>) -> Self {
        self.answers
            .insert(entity_id.to_string(), answer.map(str::to_string));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityResolver for ScriptedResolver {
    async fn resolve_picture_url(&self, entity_id: &str) -> std::result::Result<String, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .get(entity_id)
            .cloned()
            .unwrap_or_else(|| {
                Err(ResolveError::EntityNotFound {
                    entity_id: entity_id.to_string(),
                })
            })
    }
}

/// Fetcher returning a 1x1 frame whose red channel tags the URL, with
/// optional per-URL delays. URLs listed as failing return an error.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.push(url.to_string());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn frame_for(url: &str) -> CameraFrame {
        let tag = url.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
        CameraFrame {
            data: vec![tag, 0, 0, 255],
            width: 1,
            height: 1,
        }
    }
}

#[async_trait]
impl ImageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<CameraFrame> {
        self.fetched.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.iter().any(|u| u == url) {
            return Err(WidgetError::ImageFetch {
                url: url.to_string(),
                details: String::from("connection reset"),
            });
        }
        Ok(Self::frame_for(url))
    }
}
