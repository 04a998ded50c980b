#![cfg_attr(docsrs, feature(doc_cfg))]

//! Off-screen compositor hand-off for embedding Blitz in a host application.
//!
//! The host registers a window, attaches a [`CompositorBridge`] to it and then consumes
//! finished frames on its own schedule while the bridge paints on the compositor thread:
//!
//! - [`WindowRegistry`] / [`WindowBinding`]: window identity, observers and compositor
//!   ownership on the host's control thread
//! - [`CompositorBridge`]: render state machine and the lock-guarded latest published frame
//! - [`strategy::select`]: picks how frames are shared based on context capabilities
//! - [`RenderScheduler`]: the single cancelable pending repaint
//!
//! [`HeadlessContext`] and [`TokioCompositorThread`] provide a complete pipeline without a GPU.

mod compositor;
mod compositor_thread;
mod config;
mod error;
mod headless;
mod registry;
mod scheduler;
mod snapshot;
pub mod strategy;
mod window;

#[cfg(test)]
mod test_support;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use compositor::{BridgeState, CompositorBridge, PlatformImage, RenderOutcome};
pub use compositor_thread::TokioCompositorThread;
pub use config::{CompositorConfig, DEFAULT_PAINT_INTERVAL};
pub use error::{EmbedError, Result};
pub use headless::{HeadlessCompositor, HeadlessContext, HeadlessTracker};
pub use registry::{WindowId, WindowRegistry};
pub use scheduler::{CancelableTask, RenderScheduler};
pub use window::{ObserverToken, WindowBinding, WindowObserver};

pub use blitz_embed_traits as traits;
pub use blitz_metrics::{FrameStats, FrameTimings};

/// Lock `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
