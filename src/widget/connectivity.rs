// SPDX-License-Identifier: MPL-2.0

//! Network connectivity gate via NetworkManager.
//!
//! The controller asks the gate before every refresh, so the check itself
//! has to be a cheap read. A background thread polls NetworkManager's `State`
//! property over the system bus and keeps a shared flag up to date; on an
//! offline → online transition it emits `ConnectivityRestored` so every
//! configured widget is refreshed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use super::event::WidgetEvent;

/// Lowest NetworkManager state that counts as connected (`NM_STATE_CONNECTED_LOCAL`).
const NM_STATE_CONNECTED_LOCAL: u32 = 50;

pub trait ConnectivityGate: Send + Sync {
    /// Whether a usable network path exists right now. Must not block.
    fn is_active(&self) -> bool;
}

/// Connectivity flag shared between the watcher and the controller.
#[derive(Debug, Clone)]
pub struct SharedGate {
    active: Arc<AtomicBool>,
}

impl SharedGate {
    pub fn new(active: bool) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(active)),
        }
    }

    /// Set the flag, returning the previous value.
    pub fn set(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::SeqCst)
    }
}

impl ConnectivityGate for SharedGate {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Map a NetworkManager `State` value to "has a usable network path".
pub fn nm_state_is_connected(state: u32) -> bool {
    state >= NM_STATE_CONNECTED_LOCAL
}

/// Polls NetworkManager and feeds a [`SharedGate`].
pub struct NetworkManagerWatcher {
    gate: SharedGate,
    events: mpsc::Sender<WidgetEvent>,
    poll_interval: Duration,
}

impl NetworkManagerWatcher {
    pub fn new(gate: SharedGate, events: mpsc::Sender<WidgetEvent>, poll_interval: Duration) -> Self {
        Self {
            gate,
            events,
            poll_interval,
        }
    }

    /// Spawn the polling thread.
    ///
    /// If the system bus or NetworkManager is unavailable the gate is left
    /// open and the thread exits, so widgets still refresh on request.
    pub fn spawn(self) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            if let Err(e) = self.watch() {
                log::warn!("Connectivity monitoring unavailable, assuming online: {}", e);
                self.gate.set(true);
            }
        })
    }

    fn watch(&self) -> zbus::Result<()> {
        let connection = zbus::blocking::Connection::system()?;
        let proxy = zbus::blocking::Proxy::new(
            &connection,
            "org.freedesktop.NetworkManager",
            "/org/freedesktop/NetworkManager",
            "org.freedesktop.NetworkManager",
        )?;

        log::info!("Starting connectivity monitor via NetworkManager");

        loop {
            let state: u32 = proxy.get_property("State")?;
            let active = nm_state_is_connected(state);
            if self.record(active) {
                log::info!("Network connection restored (NetworkManager state {})", state);
                if self.events.blocking_send(WidgetEvent::ConnectivityRestored).is_err() {
                    log::debug!("Event queue closed, stopping connectivity monitor");
                    return Ok(());
                }
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Store the new state; true when it is an offline → online transition.
    fn record(&self, active: bool) -> bool {
        let was_active = self.gate.set(active);
        if was_active && !active {
            log::info!("Network connection lost");
        }
        active && !was_active
    }
}
