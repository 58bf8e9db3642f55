// SPDX-License-Identifier: MPL-2.0

//! Render decisions and the surface dispatch queue.
//!
//! What a widget shows is decided here from its [`RenderState`]. Applying
//! that decision to the host surface happens on one thread that owns the
//! [`RenderTarget`], so surface mutations from concurrent refreshes are
//! serialised. Every mutation carries the generation of the refresh that
//! produced it; anything older than the widget's current generation is
//! dropped, so a slow fetch can never overwrite a newer refresh.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tokio::sync::{mpsc, oneshot};

use super::event::WidgetEvent;
use super::frame::CameraFrame;
use super::store::WidgetId;
use crate::error::{Result, WidgetError};

/// Pending surface operations before senders start waiting.
const QUEUE_DEPTH: usize = 64;

/// What a widget should display, recomputed on every refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    /// Absolute URL of the image to fetch and show
    Image(String),
    /// No resolvable picture; show the default icon
    Placeholder,
    /// Resolution failed; default icon plus the error indicator
    Error,
}

/// Independently visible regions of a camera widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Image,
    Placeholder,
    Error,
}

/// Visibility of each region for one render state.
///
/// Exactly one of image and placeholder is visible; the error indicator is
/// toggled on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPlan {
    pub state: RenderState,
    pub image_visible: bool,
    pub placeholder_visible: bool,
    pub error_visible: bool,
}

impl RenderPlan {
    pub fn for_state(state: RenderState) -> Self {
        let (image_visible, placeholder_visible, error_visible) = match state {
            RenderState::Image(_) => (true, false, false),
            RenderState::Placeholder => (false, true, false),
            RenderState::Error => (false, true, true),
        };
        Self {
            state,
            image_visible,
            placeholder_visible,
            error_visible,
        }
    }

    /// Regions that re-issue a refresh when activated.
    pub fn trigger_regions(&self) -> [Region; 2] {
        [Region::Image, Region::Placeholder]
    }
}

/// Host-owned visual surface of the camera widgets.
///
/// Only ever called from the surface queue thread, so implementations may
/// block on file IO and encoding.
pub trait RenderTarget: Send {
    fn set_visibility(&mut self, widget_id: WidgetId, region: Region, visible: bool) -> Result<()>;

    /// Put the default camera icon into the image region.
    fn show_default_icon(&mut self, widget_id: WidgetId) -> Result<()>;

    fn bind_image(&mut self, widget_id: WidgetId, frame: &CameraFrame) -> Result<()>;

    /// Make `region` emit `event` when the user activates it.
    fn bind_trigger(&mut self, widget_id: WidgetId, region: Region, event: WidgetEvent) -> Result<()>;

    /// Push the pending changes of one widget to the host.
    fn commit(&mut self, widget_id: WidgetId) -> Result<()>;

    /// The widget was removed; drop whatever the host keeps for it.
    fn release(&mut self, _widget_id: WidgetId) -> Result<()> {
        Ok(())
    }
}

/// Current refresh generation of every widget.
///
/// Generations come from one counter shared by all widgets and are never
/// reused, even after a widget is deleted.
#[derive(Debug, Default)]
pub struct Generations {
    next: AtomicU64,
    current: Mutex<HashMap<WidgetId, u64>>,
}

impl Generations {
    /// Start a new refresh of `widget_id`, superseding any in flight.
    pub fn begin(&self, widget_id: WidgetId) -> u64 {
        let generation = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.insert(widget_id, generation);
        generation
    }

    pub fn is_current(&self, widget_id: WidgetId, generation: u64) -> bool {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.get(&widget_id) == Some(&generation)
    }

    /// Forget the listed widgets; all their in-flight work becomes stale.
    pub fn retire(&self, widget_ids: &[WidgetId]) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        for id in widget_ids {
            current.remove(id);
        }
    }
}

#[derive(Debug)]
enum SurfaceOp {
    Render {
        widget_id: WidgetId,
        generation: u64,
        plan: RenderPlan,
    },
    BindImage {
        widget_id: WidgetId,
        generation: u64,
        frame: CameraFrame,
    },
    Release {
        widget_id: WidgetId,
    },
    Flush(oneshot::Sender<()>),
}

/// Sending side of the surface queue.
#[derive(Debug, Clone)]
pub struct SurfaceHandle {
    tx: mpsc::Sender<SurfaceOp>,
}

impl SurfaceHandle {
    pub async fn render(&self, widget_id: WidgetId, generation: u64, plan: RenderPlan) -> Result<()> {
        self.send(SurfaceOp::Render {
            widget_id,
            generation,
            plan,
        })
        .await
    }

    pub async fn bind_image(&self, widget_id: WidgetId, generation: u64, frame: CameraFrame) -> Result<()> {
        self.send(SurfaceOp::BindImage {
            widget_id,
            generation,
            frame,
        })
        .await
    }

    pub async fn release(&self, widget_id: WidgetId) -> Result<()> {
        self.send(SurfaceOp::Release { widget_id }).await
    }

    /// Wait until every operation queued before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(SurfaceOp::Flush(ack)).await?;
        done.await.map_err(|_| WidgetError::SurfaceClosed)
    }

    async fn send(&self, op: SurfaceOp) -> Result<()> {
        self.tx.send(op).await.map_err(|_| WidgetError::SurfaceClosed)
    }
}

/// Start the thread owning `target`. It runs until every handle is dropped.
///
/// Targets write files and encode images, so the queue runs on its own
/// thread instead of a runtime worker.
pub fn spawn_surface_queue<T>(target: T, generations: Arc<Generations>) -> (SurfaceHandle, thread::JoinHandle<()>)
where
    T: RenderTarget + 'static,
{
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let worker = thread::spawn(move || run_queue(target, generations, rx));
    (SurfaceHandle { tx }, worker)
}

fn run_queue<T: RenderTarget>(mut target: T, generations: Arc<Generations>, mut rx: mpsc::Receiver<SurfaceOp>) {
    while let Some(op) = rx.blocking_recv() {
        let result = match op {
            SurfaceOp::Render {
                widget_id,
                generation,
                plan,
            } => {
                if !generations.is_current(widget_id, generation) {
                    log::debug!("Discarding stale render of widget {} (generation {})", widget_id, generation);
                    continue;
                }
                apply_plan(&mut target, widget_id, &plan)
            }
            SurfaceOp::BindImage {
                widget_id,
                generation,
                frame,
            } => {
                if !generations.is_current(widget_id, generation) {
                    log::debug!("Discarding stale image for widget {} (generation {})", widget_id, generation);
                    continue;
                }
                target
                    .bind_image(widget_id, &frame)
                    .and_then(|()| target.commit(widget_id))
            }
            SurfaceOp::Release { widget_id } => target.release(widget_id),
            SurfaceOp::Flush(ack) => {
                let _ = ack.send(());
                Ok(())
            }
        };
        if let Err(e) = result {
            log::error!("Failed to update widget surface: {}", e);
        }
    }
    log::debug!("Surface queue closed");
}

fn apply_plan<T: RenderTarget>(target: &mut T, widget_id: WidgetId, plan: &RenderPlan) -> Result<()> {
    log::debug!("Rendering widget {} as {:?}", widget_id, plan.state);
    target.set_visibility(widget_id, Region::Image, plan.image_visible)?;
    target.set_visibility(widget_id, Region::Placeholder, plan.placeholder_visible)?;
    target.set_visibility(widget_id, Region::Error, plan.error_visible)?;
    if !plan.image_visible {
        target.show_default_icon(widget_id)?;
    }
    for region in plan.trigger_regions() {
        target.bind_trigger(widget_id, region, WidgetEvent::RefreshRequested { widget_id })?;
    }
    target.commit(widget_id)
}
