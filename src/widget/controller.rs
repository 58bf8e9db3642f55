// SPDX-License-Identifier: MPL-2.0

//! # Camera Widget Update Controller
//!
//! Decides what each camera widget shows and performs the side effects that
//! takes: entity resolution, image fetch and surface updates.
//!
//! ## Refresh Flow
//!
//! 1. Skip when there is no network connection (retried on the next event)
//! 2. Skip when the widget has no configuration yet
//! 3. Resolve the entity's picture path; any failure becomes the error state
//! 4. Queue the render plan for the widget surface
//! 5. For images, fetch and decode in the background and bind when ready
//!
//! ## State
//!
//! The controller keeps nothing durable. Widget configurations live in the
//! store and render states are recomputed on every refresh. The only shared
//! runtime state is the generation table, which discards results of
//! superseded refreshes.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::task::JoinHandle;

use super::connectivity::ConnectivityGate;
use super::entity::{EntityResolver, UrlRepository, display_url};
use super::frame::ImageFetcher;
use super::render::{Generations, RenderPlan, RenderState, SurfaceHandle};
use super::store::{WidgetConfig, WidgetId, WidgetStore};
use crate::error::{Result, WidgetError};

/// Result of one refresh request.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// No active network connection
    Offline,
    /// The widget has no configuration
    Unconfigured,
    /// A render plan was queued. `image_task` is the background fetch for
    /// image states; nothing needs to wait for it.
    Rendered {
        state: RenderState,
        image_task: Option<JoinHandle<()>>,
    },
}

impl RefreshOutcome {
    pub fn state(&self) -> Option<&RenderState> {
        match self {
            Self::Rendered { state, .. } => Some(state),
            _ => None,
        }
    }
}

/// Orchestrates store, gate, resolver and surface. Cheap to clone; every
/// event handler gets its own copy.
#[derive(Clone)]
pub struct UpdateController {
    store: Arc<dyn WidgetStore>,
    gate: Arc<dyn ConnectivityGate>,
    resolver: Arc<dyn EntityResolver>,
    urls: Arc<dyn UrlRepository>,
    fetcher: Arc<dyn ImageFetcher>,
    surface: SurfaceHandle,
    generations: Arc<Generations>,
}

impl UpdateController {
    pub fn new(
        store: Arc<dyn WidgetStore>,
        gate: Arc<dyn ConnectivityGate>,
        resolver: Arc<dyn EntityResolver>,
        urls: Arc<dyn UrlRepository>,
        fetcher: Arc<dyn ImageFetcher>,
        surface: SurfaceHandle,
        generations: Arc<Generations>,
    ) -> Self {
        Self {
            store,
            gate,
            resolver,
            urls,
            fetcher,
            surface,
            generations,
        }
    }

    pub fn surface(&self) -> &SurfaceHandle {
        &self.surface
    }

    /// Persist the configuration of a newly placed widget and refresh it.
    ///
    /// A missing or blank entity id leaves the store untouched and returns
    /// [`WidgetError::IncompleteConfig`].
    pub async fn handle_configuration_saved(
        &self,
        widget_id: WidgetId,
        entity_id: Option<&str>,
    ) -> Result<RefreshOutcome> {
        let Some(entity_id) = entity_id.map(str::trim).filter(|e| !e.is_empty()) else {
            log::error!("Did not receive complete configuration data for widget {}", widget_id);
            return Err(WidgetError::IncompleteConfig { widget_id });
        };

        log::info!("Saving camera config for widget {}: entity id {}", widget_id, entity_id);
        self.store.add(WidgetConfig::new(widget_id, entity_id))?;

        Ok(self.refresh_widget(widget_id).await)
    }

    /// Recompute and render what `widget_id` shows. Never fails: resolution
    /// errors become [`RenderState::Error`], image fetch errors are logged.
    pub async fn refresh_widget(&self, widget_id: WidgetId) -> RefreshOutcome {
        if !self.gate.is_active() {
            log::debug!("Skipping update of widget {} since network connection is not active", widget_id);
            return RefreshOutcome::Offline;
        }

        let Some(config) = self.store.get(widget_id) else {
            log::debug!("Widget {} is not configured yet", widget_id);
            return RefreshOutcome::Unconfigured;
        };

        let generation = self.generations.begin(widget_id);
        let state = self.resolve(&config).await;

        if let Err(e) = self
            .surface
            .render(widget_id, generation, RenderPlan::for_state(state.clone()))
            .await
        {
            log::error!("Unable to render widget {}: {}", widget_id, e);
            return RefreshOutcome::Rendered {
                state,
                image_task: None,
            };
        }

        let image_task = match &state {
            RenderState::Image(url) => Some(self.spawn_image_fetch(widget_id, generation, url.clone())),
            RenderState::Placeholder | RenderState::Error => None,
        };

        RefreshOutcome::Rendered { state, image_task }
    }

    /// Refresh each widget as its own task; one failing refresh doesn't stop
    /// the others. Outcomes of tasks that panicked are left out.
    pub async fn refresh_all(&self, widget_ids: &[WidgetId]) -> Vec<(WidgetId, RefreshOutcome)> {
        if widget_ids.is_empty() {
            return Vec::new();
        }
        log::debug!("Updating widgets {:?}", widget_ids);

        let tasks = widget_ids.iter().map(|&widget_id| {
            let controller = self.clone();
            tokio::spawn(async move { (widget_id, controller.refresh_widget(widget_id).await) })
        });

        join_all(tasks)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    log::error!("Widget refresh task failed: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Refresh every configured widget.
    pub async fn refresh_configured(&self) -> Vec<(WidgetId, RefreshOutcome)> {
        let widget_ids: Vec<WidgetId> = self.store.get_all().iter().map(|c| c.widget_id).collect();
        log::info!("Updating all {} configured widget(s)", widget_ids.len());
        self.refresh_all(&widget_ids).await
    }

    /// Remove the configurations of deleted widgets. Absent ids are ignored.
    ///
    /// In-flight refreshes of these widgets are discarded and their surfaces
    /// released. The host has already removed the widgets, so that happens
    /// even when the store cannot be updated; the store error is returned
    /// afterwards.
    pub async fn delete_widgets(&self, widget_ids: &[WidgetId]) -> Result<()> {
        let stored = self.store.delete_all(widget_ids);
        self.generations.retire(widget_ids);
        for &widget_id in widget_ids {
            self.surface.release(widget_id).await?;
        }
        stored?;
        log::info!("Deleted widget configuration(s) {:?}", widget_ids);
        Ok(())
    }

    async fn resolve(&self, config: &WidgetConfig) -> RenderState {
        match self.resolver.resolve_picture_url(&config.entity_id).await {
            Ok(path) if path.is_empty() => RenderState::Placeholder,
            Ok(path) => RenderState::Image(display_url(&self.urls.base_url(), &path)),
            Err(e) => {
                log::error!(
                    "Failed to fetch entity {} for widget {}: {}",
                    config.entity_id,
                    config.widget_id,
                    e
                );
                RenderState::Error
            }
        }
    }

    /// Fetch the image off the surface queue and post it back when ready.
    ///
    /// On failure the image region stays visible without an image.
    fn spawn_image_fetch(&self, widget_id: WidgetId, generation: u64, url: String) -> JoinHandle<()> {
        let fetcher = Arc::clone(&self.fetcher);
        let surface = self.surface.clone();
        tokio::spawn(async move {
            log::debug!("Fetching camera image for widget {}", widget_id);
            match fetcher.fetch(&url).await {
                Ok(frame) => {
                    if let Err(e) = surface.bind_image(widget_id, generation, frame).await {
                        log::error!("Unable to bind image for widget {}: {}", widget_id, e);
                    }
                    log::debug!("Fetch and load complete for widget {}", widget_id);
                }
                Err(e) => log::error!("Unable to fetch image for widget {}: {}", widget_id, e),
            }
        })
    }
}
