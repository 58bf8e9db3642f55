// SPDX-License-Identifier: MPL-2.0

//! Widget events and their dispatch.
//!
//! Events arrive from the host as newline-delimited JSON tagged by `event`:
//!
//! ```text
//! {"event": "configuration_saved", "widget_id": 7, "entity_id": "camera.front"}
//! {"event": "refresh_requested", "widget_id": 7}
//! {"event": "update_requested", "widget_ids": [7, 8]}
//! {"event": "connectivity_restored"}
//! {"event": "widgets_removed", "widget_ids": [7]}
//! ```
//!
//! Each event becomes its own task and carries everything the task needs,
//! so concurrent events for different widgets never share state.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::controller::UpdateController;
use super::store::WidgetId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WidgetEvent {
    /// The user finished configuring a newly placed widget.
    ConfigurationSaved {
        widget_id: WidgetId,
        #[serde(default)]
        entity_id: Option<String>,
    },
    /// A refresh trigger on the widget was activated.
    RefreshRequested { widget_id: WidgetId },
    /// The host asks for an update of specific widgets.
    UpdateRequested { widget_ids: Vec<WidgetId> },
    /// Network or screen came back; refresh everything configured.
    #[serde(alias = "screen_on")]
    ConnectivityRestored,
    /// Widgets were removed from the host surface.
    WidgetsRemoved { widget_ids: Vec<WidgetId> },
}

impl WidgetEvent {
    /// Parse one line of host input.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::ConfigurationSaved { .. } => "configuration_saved",
            Self::RefreshRequested { .. } => "refresh_requested",
            Self::UpdateRequested { .. } => "update_requested",
            Self::ConnectivityRestored => "connectivity_restored",
            Self::WidgetsRemoved { .. } => "widgets_removed",
        }
    }
}

/// Runs every incoming event as an independent task.
#[derive(Clone)]
pub struct EventDispatcher {
    controller: UpdateController,
}

impl EventDispatcher {
    pub fn new(controller: UpdateController) -> Self {
        Self { controller }
    }

    /// Spawn the work for one event.
    pub fn dispatch(&self, event: WidgetEvent) -> JoinHandle<()> {
        let controller = self.controller.clone();
        tokio::spawn(async move { handle(controller, event).await })
    }

    /// Dispatch events until every sender is dropped.
    pub async fn run(&self, mut events: mpsc::Receiver<WidgetEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        log::info!("Event queue closed");
    }
}

async fn handle(controller: UpdateController, event: WidgetEvent) {
    log::debug!("Event received: {} {:?}", event.action(), event);

    match event {
        WidgetEvent::ConfigurationSaved {
            widget_id,
            entity_id,
        } => {
            if let Err(e) = controller
                .handle_configuration_saved(widget_id, entity_id.as_deref())
                .await
            {
                log::error!("Dropping configuration for widget {}: {}", widget_id, e);
            }
        }
        WidgetEvent::RefreshRequested { widget_id } => {
            let outcome = controller.refresh_widget(widget_id).await;
            log::debug!("Widget {} refreshed: {:?}", widget_id, outcome.state());
        }
        WidgetEvent::UpdateRequested { widget_ids } => {
            controller.refresh_all(&widget_ids).await;
        }
        WidgetEvent::ConnectivityRestored => {
            controller.refresh_configured().await;
        }
        WidgetEvent::WidgetsRemoved { widget_ids } => {
            if let Err(e) = controller.delete_widgets(&widget_ids).await {
                log::error!("Failed to delete widgets {:?}: {}", widget_ids, e);
            }
        }
    }
}
