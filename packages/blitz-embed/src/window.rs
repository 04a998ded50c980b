//! Per-window binding between the host and a compositor bridge.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use blitz_embed_traits::{PixelFormat, SurfaceSize};
use smallvec::SmallVec;

use crate::compositor::{BridgeState, CompositorBridge, PlatformImage};
use crate::error::{EmbedError, Result};
use crate::registry::{WindowId, WindowRegistry};

/// Notified about compositor lifecycle changes of a window.
pub trait WindowObserver {
    fn compositor_attached(&self, window: WindowId);

    fn compositor_detached(&self, _window: WindowId) {}
}

/// Returned by [`WindowBinding::add_observer`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

/// One embedded browsing surface as seen from the host's control thread.
///
/// Owns the attached [`CompositorBridge`] and forwards host requests to it. Observers are held
/// weakly and must unsubscribe before the binding is dropped; dropping a binding that still has
/// live observers is a programming error and panics.
pub struct WindowBinding {
    id: WindowId,
    registry: Weak<WindowRegistry>,
    observers: RefCell<SmallVec<[(ObserverToken, Weak<dyn WindowObserver>); 4]>>,
    next_token: Cell<u64>,
    compositor: RefCell<Option<Arc<CompositorBridge>>>,
}

impl WindowBinding {
    pub(crate) fn new(id: WindowId, registry: Weak<WindowRegistry>) -> Self {
        Self {
            id,
            registry,
            observers: RefCell::new(SmallVec::new()),
            next_token: Cell::new(0),
            compositor: RefCell::new(None),
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn add_observer<O: WindowObserver + 'static>(&self, observer: &Rc<O>) -> ObserverToken {
        let token = ObserverToken(self.next_token.get());
        self.next_token.set(token.0 + 1);
        let weak = Rc::downgrade(observer);
        let weak: Weak<dyn WindowObserver> = weak;
        self.observers.borrow_mut().push((token, weak));
        token
    }

    /// Returns false if `token` was already removed.
    pub fn remove_observer(&self, token: ObserverToken) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(t, _)| *t != token);
        observers.len() != before
    }

    /// Number of subscribed observers that are still alive.
    pub fn observer_count(&self) -> usize {
        self.observers
            .borrow()
            .iter()
            .filter(|(_, observer)| observer.strong_count() > 0)
            .count()
    }

    fn notify(&self, f: impl Fn(&dyn WindowObserver)) {
        // Collected first so observers may subscribe or unsubscribe from the callback.
        let live: SmallVec<[Rc<dyn WindowObserver>; 4]> = self
            .observers
            .borrow()
            .iter()
            .filter_map(|(_, observer)| observer.upgrade())
            .collect();
        for observer in live {
            f(observer.as_ref());
        }
    }

    /// Take ownership of `bridge` and announce it to observers in subscription order.
    pub fn attach_compositor(&self, bridge: Arc<CompositorBridge>) -> Result<()> {
        if bridge.window_id() != self.id {
            tracing::error!(window = %self.id, bridge = %bridge.window_id(), "compositor for another window");
            return Err(EmbedError::WindowMismatch {
                expected: self.id,
                found: bridge.window_id(),
            });
        }
        if self.compositor().is_some() || !bridge.mark_attached() {
            tracing::error!(window = %self.id, "compositor attached twice");
            debug_assert!(false, "compositor attached twice to window {}", self.id);
            return Err(EmbedError::AlreadyAttached(self.id));
        }
        *self.compositor.borrow_mut() = Some(bridge);
        tracing::info!(window = %self.id, "compositor attached");
        self.notify(|observer| observer.compositor_attached(self.id));
        Ok(())
    }

    /// The attached bridge. A bridge that was torn down behind our back is detached here.
    pub fn compositor(&self) -> Option<Arc<CompositorBridge>> {
        let bridge = self.compositor.borrow().clone()?;
        if bridge.state() == BridgeState::TornDown {
            self.detach_compositor();
            return None;
        }
        Some(bridge)
    }

    /// Tear down and release the attached bridge, notifying observers.
    pub fn detach_compositor(&self) -> Option<Arc<CompositorBridge>> {
        let bridge = self.compositor.borrow_mut().take()?;
        bridge.teardown();
        bridge.mark_detached();
        tracing::info!(window = %self.id, "compositor detached");
        self.notify(|observer| observer.compositor_detached(self.id));
        Some(bridge)
    }

    /// Returns false when no compositor is attached or it declined to schedule.
    pub fn schedule_repaint(&self) -> bool {
        self.compositor().is_some_and(|bridge| bridge.invalidate())
    }

    pub fn suspend(&self) {
        if let Some(bridge) = self.compositor() {
            bridge.suspend();
        }
    }

    pub fn resume(&self) -> bool {
        self.compositor().is_some_and(|bridge| bridge.resume())
    }

    pub fn set_surface_size(&self, width: i32, height: i32) -> bool {
        self.compositor()
            .is_some_and(|bridge| bridge.set_surface_size(width, height))
    }

    /// Draw the current content synchronously into `buffer` (`height * stride` bytes).
    ///
    /// `depth` selects the pixel format: 32 is RGBA8888, 24 is RGBX8888 and 16 is RGB565. Any
    /// other depth fails before the buffer is touched.
    pub fn render_snapshot(
        &self,
        buffer: &mut [u8],
        width: i32,
        height: i32,
        stride: usize,
        depth: u32,
    ) -> Result<()> {
        let Some(format) = PixelFormat::from_depth(depth) else {
            tracing::error!(window = %self.id, depth, "unsupported snapshot depth");
            return Err(EmbedError::UnsupportedFormat(depth));
        };
        let bridge = self.compositor().ok_or(EmbedError::NoCompositor(self.id))?;
        bridge.render_snapshot(buffer, SurfaceSize::new(width, height), stride, format)
    }

    pub fn fetch_platform_image(&self) -> Option<PlatformImage> {
        self.compositor.borrow().as_ref()?.fetch_platform_image()
    }
}

impl Drop for WindowBinding {
    fn drop(&mut self) {
        let live = self.observer_count();
        if live > 0 && !std::thread::panicking() {
            panic!("window {} destroyed with {live} live observer(s)", self.id);
        }
        self.detach_compositor();
        if let Some(registry) = self.registry.upgrade() {
            if let Err(err) = registry.unregister(self.id) {
                tracing::error!(window = %self.id, error = %err, "failed to unregister window");
            }
        }
        tracing::debug!(window = %self.id, "window destroyed");
    }
}
