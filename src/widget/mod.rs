// SPDX-License-Identifier: MPL-2.0

//! Camera widget module organization

pub mod connectivity;
pub mod controller;
pub mod entity;
pub mod event;
pub mod frame;
pub mod render;
pub mod store;
pub mod surface;

#[cfg(test)]
mod testing;

pub use connectivity::{NetworkManagerWatcher, SharedGate};
pub use controller::UpdateController;
pub use entity::{HomeAssistantClient, StaticUrl};
pub use event::{EventDispatcher, WidgetEvent};
pub use frame::HttpImageFetcher;
pub use render::{Generations, spawn_surface_queue};
pub use store::JsonWidgetStore;
pub use surface::FileSurface;
