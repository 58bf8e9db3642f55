// SPDX-License-Identifier: MPL-2.0

//! Home Assistant Camera Widget - Daemon Entry Point
//!
//! Keeps camera widgets in sync with Home Assistant camera entities.
//!
//! # Host Protocol
//!
//! The host that places the widgets talks to the daemon over stdio:
//! - **stdin**: newline-delimited JSON events (see `widget::event`)
//! - **surfaces**: per-widget state and image files the host draws from
//!   (see `widget::surface`)
//!
//! # Architecture
//!
//! - One thread owns the widget surfaces; all surface updates go through it
//! - Every incoming event is handled by its own task
//! - A background thread watches NetworkManager and reports reconnects

mod config;
mod error;
mod widget;

use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use config::Config;
use widget::{
    EventDispatcher, FileSurface, Generations, HomeAssistantClient, HttpImageFetcher, JsonWidgetStore,
    NetworkManagerWatcher, SharedGate, StaticUrl, UpdateController, WidgetEvent, spawn_surface_queue,
};

/// Pending events before the stdin reader waits.
const EVENT_QUEUE_DEPTH: usize = 32;

fn init_logging(debug: bool) -> Result<(), Box<dyn std::error::Error>> {
    // Append to ~/.cache/ha-camera-widget/camera-widget.log
    use std::fs::OpenOptions;

    let mut path = dirs::cache_dir().unwrap_or_else(|| std::path::PathBuf::from("/tmp"));
    path.push(config::APP_DIR);
    std::fs::create_dir_all(&path)?;
    path.push("camera-widget.log");

    let log_file = OpenOptions::new().create(true).append(true).open(&path)?;

    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();
    Ok(())
}

/// Forward host events from stdin until it closes.
async fn read_host_events(events: mpsc::Sender<WidgetEvent>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match WidgetEvent::parse(&line) {
                Ok(event) => {
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                Err(e) => log::warn!("Ignoring malformed event {:?}: {}", line, e),
            },
            Ok(None) => {
                log::info!("Host input closed");
                return;
            }
            Err(e) => {
                log::error!("Failed to read host input: {}", e);
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = Config::config_path();
    if !config_path.exists() {
        // Leave an editable copy of the defaults behind
        Config::default().save_to(&config_path)?;
    }
    let config = Config::load()?;

    init_logging(config.debug_logging)?;
    log::info!("Starting Home Assistant camera widget daemon for {}", config.server_url);

    let store = Arc::new(JsonWidgetStore::open(config.store_path())?);
    let urls = Arc::new(StaticUrl(config.server_url.clone()));
    let resolver = HomeAssistantClient::new(urls.clone(), config.access_token.clone(), config.request_timeout())?;
    let fetcher = HttpImageFetcher::new(config.image_bounds(), config.request_timeout())?;

    let generations = Arc::new(Generations::default());
    let (surface, _surface_worker) = spawn_surface_queue(FileSurface::new(config.surface_dir())?, generations.clone());

    let gate = SharedGate::new(true);
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    NetworkManagerWatcher::new(gate.clone(), events_tx.clone(), config.connectivity_poll_interval()).spawn();

    let controller = UpdateController::new(
        store,
        Arc::new(gate),
        Arc::new(resolver),
        urls,
        Arc::new(fetcher),
        surface,
        generations,
    );
    let dispatcher = EventDispatcher::new(controller);

    // Widgets placed before a restart show their camera right away
    dispatcher.dispatch(WidgetEvent::ConnectivityRestored);

    tokio::spawn(read_host_events(events_tx));

    tokio::select! {
        _ = dispatcher.run(events_rx) => {}
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted, shutting down"),
    }

    // The surface thread exits once the last handle is gone
    drop(dispatcher);
    log::info!("Camera widget daemon stopped");
    Ok(())
}
