//! CPU-only graphics backend.
//!
//! [`HeadlessContext`] behaves like an off-screen GL context with a two-buffer screen: the
//! layer compositor paints into the back buffer, publishing swaps it to the front and hands out
//! its handle. Buffers live in plain `Vec<u8>`s. Used by hosts without a GPU and by the tests.

use std::num::NonZeroU64;
use std::sync::{Arc, Mutex};

use blitz_embed_traits::geometry::has_area;
use blitz_embed_traits::{
    ContextCaps, DrawTarget, GpuFence, GraphicsContext, ImageHandle, LayerCompositor,
    PixelFormat, RenderParams, SharedSurface, SurfaceSize, SurfaceStrategy,
};
use rustc_hash::FxHashMap;

use crate::lock;

const FORMAT: PixelFormat = PixelFormat::R8G8B8A8;

#[derive(Default)]
struct TrackerState {
    live: FxHashMap<ImageHandle, SurfaceSize>,
    resizes: usize,
    publishes: usize,
    paints: usize,
    native_size: Option<SurfaceSize>,
    last_params: Option<RenderParams>,
    paused: bool,
}

/// Shared view into what a headless context and compositor have been asked to do.
///
/// Tracks every live buffer handle with the size it was allocated at, so a consumer can check
/// that a handle it was given still names a buffer of the size it was told.
#[derive(Clone, Default)]
pub struct HeadlessTracker(Arc<Mutex<TrackerState>>);

impl HeadlessTracker {
    pub fn size_of(&self, handle: ImageHandle) -> Option<SurfaceSize> {
        lock(&self.0).live.get(&handle).copied()
    }

    pub fn live_buffers(&self) -> usize {
        lock(&self.0).live.len()
    }

    pub fn resize_count(&self) -> usize {
        lock(&self.0).resizes
    }

    pub fn publish_count(&self) -> usize {
        lock(&self.0).publishes
    }

    pub fn paint_count(&self) -> usize {
        lock(&self.0).paints
    }

    /// Last size propagated to the native surface.
    pub fn native_size(&self) -> Option<SurfaceSize> {
        lock(&self.0).native_size
    }

    pub fn last_params(&self) -> Option<RenderParams> {
        lock(&self.0).last_params
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.0).paused
    }
}

struct CpuBuffer {
    handle: ImageHandle,
    size: SurfaceSize,
    pixels: Vec<u8>,
}

impl CpuBuffer {
    fn stride(&self) -> usize {
        self.size.width.max(0) as usize * FORMAT.bytes_per_pixel()
    }
}

pub struct HeadlessContext {
    caps: ContextCaps,
    offscreen: bool,
    current: bool,
    strategy: Option<SurfaceStrategy>,
    fence: Option<Arc<dyn GpuFence>>,
    back: CpuBuffer,
    front: Option<CpuBuffer>,
    next_handle: NonZeroU64,
    tracker: HeadlessTracker,
}

impl HeadlessContext {
    /// An off-screen context that can export its buffers directly.
    pub fn new(size: SurfaceSize) -> Self {
        let tracker = HeadlessTracker::default();
        let mut next_handle = NonZeroU64::MIN;
        let back = allocate_buffer(&tracker, &mut next_handle, size);
        Self {
            caps: ContextCaps::IMAGE_EXPORT | ContextCaps::PREMULTIPLIED_ALPHA,
            offscreen: true,
            current: false,
            strategy: None,
            fence: None,
            back,
            front: None,
            next_handle,
            tracker,
        }
    }

    /// A context standing in for a window surface. Nothing it renders can be shared.
    pub fn onscreen(size: SurfaceSize) -> Self {
        Self {
            offscreen: false,
            ..Self::new(size)
        }
    }

    pub fn with_capabilities(mut self, caps: ContextCaps) -> Self {
        self.caps = caps;
        self
    }

    /// Attach `fence` to every published frame.
    pub fn with_fence(mut self, fence: Arc<dyn GpuFence>) -> Self {
        self.fence = Some(fence);
        self
    }

    pub fn tracker(&self) -> HeadlessTracker {
        self.tracker.clone()
    }

    /// The strategy the bridge configured, if any.
    pub fn strategy(&self) -> Option<SurfaceStrategy> {
        self.strategy
    }

    /// Pixels of the current front buffer.
    pub fn front_pixels(&self) -> Option<&[u8]> {
        self.front.as_ref().map(|buffer| buffer.pixels.as_slice())
    }

    fn allocate(&mut self, size: SurfaceSize) -> CpuBuffer {
        allocate_buffer(&self.tracker, &mut self.next_handle, size)
    }

    fn release(&self, buffer: CpuBuffer) {
        lock(&self.tracker.0).live.remove(&buffer.handle);
    }
}

fn allocate_buffer(tracker: &HeadlessTracker, next: &mut NonZeroU64, size: SurfaceSize) -> CpuBuffer {
    let handle = ImageHandle::from(*next);
    *next = next.saturating_add(1);
    let len = if has_area(size) {
        size.width as usize * size.height as usize * FORMAT.bytes_per_pixel()
    } else {
        0
    };
    lock(&tracker.0).live.insert(handle, size);
    CpuBuffer {
        handle,
        size,
        pixels: vec![0; len],
    }
}

impl GraphicsContext for HeadlessContext {
    fn is_offscreen(&self) -> bool {
        self.offscreen
    }

    fn offscreen_size(&self) -> SurfaceSize {
        self.back.size
    }

    fn resize_offscreen(&mut self, size: SurfaceSize) -> bool {
        if !has_area(size) {
            return false;
        }
        let fresh = self.allocate(size);
        let old = std::mem::replace(&mut self.back, fresh);
        self.release(old);
        lock(&self.tracker.0).resizes += 1;
        true
    }

    fn make_current(&mut self) -> bool {
        self.current = true;
        true
    }

    fn is_current(&self) -> bool {
        self.current
    }

    fn capabilities(&self) -> ContextCaps {
        self.caps
    }

    fn configure_sharing(&mut self, strategy: SurfaceStrategy) {
        self.strategy = Some(strategy);
    }

    fn publish_frame(&mut self) -> Option<SharedSurface> {
        if !has_area(self.back.size) {
            return None;
        }
        // Recycle the old front buffer as the next back buffer when the size still matches.
        let next_back = match self.front.take() {
            Some(front) if front.size == self.back.size => front,
            Some(front) => {
                self.release(front);
                self.allocate(self.back.size)
            }
            None => self.allocate(self.back.size),
        };
        let front = std::mem::replace(&mut self.back, next_back);
        let surface = SharedSurface {
            handle: front.handle,
            size: front.size,
            fence: self.fence.clone(),
        };
        self.front = Some(front);
        lock(&self.tracker.0).publishes += 1;
        Some(surface)
    }

    fn default_target(&mut self) -> Option<DrawTarget<'_>> {
        let stride = self.back.stride();
        let size = self.back.size;
        DrawTarget::new(&mut self.back.pixels, size, stride, FORMAT)
    }

    fn resize_native_surface(&mut self, size: SurfaceSize) {
        lock(&self.tracker.0).native_size = Some(size);
    }
}

/// Paints every frame a single clear colour.
pub struct HeadlessCompositor {
    clear: [u8; 4],
    tracker: Option<HeadlessTracker>,
}

impl Default for HeadlessCompositor {
    fn default() -> Self {
        Self::new([0xff, 0xff, 0xff, 0xff])
    }
}

impl HeadlessCompositor {
    pub fn new(clear: [u8; 4]) -> Self {
        Self { clear, tracker: None }
    }

    /// Report paints and pause state to `tracker`.
    pub fn observed_by(mut self, tracker: HeadlessTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    fn record(&self, params: &RenderParams) {
        if let Some(tracker) = &self.tracker {
            let mut state = lock(&tracker.0);
            state.paints += 1;
            state.last_params = Some(*params);
        }
    }
}

impl LayerCompositor for HeadlessCompositor {
    fn composite(&mut self, context: &mut dyn GraphicsContext, params: &RenderParams) -> bool {
        if !context.is_current() {
            return false;
        }
        if let Some(mut target) = context.default_target() {
            target.fill(self.clear);
        }
        self.record(params);
        true
    }

    fn composite_to_target(&mut self, target: &mut DrawTarget<'_>, params: &RenderParams) -> bool {
        target.fill(self.clear);
        self.record(params);
        true
    }

    fn pause(&mut self) {
        if let Some(tracker) = &self.tracker {
            lock(&tracker.0).paused = true;
        }
    }

    fn resume(&mut self, _size: SurfaceSize) -> bool {
        if let Some(tracker) = &self.tracker {
            lock(&tracker.0).paused = false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishing_swaps_and_recycles_buffers() {
        let mut context = HeadlessContext::new(SurfaceSize::new(4, 4));
        let tracker = context.tracker();
        let first = context.publish_frame().unwrap();
        let second = context.publish_frame().unwrap();
        assert_ne!(first.handle, second.handle);
        // Old front became the back buffer; nothing was freed or leaked.
        assert_eq!(tracker.live_buffers(), 2);
        assert_eq!(tracker.size_of(first.handle), Some(SurfaceSize::new(4, 4)));
    }

    #[test]
    fn resize_frees_the_old_back_buffer_but_keeps_the_front() {
        let mut context = HeadlessContext::new(SurfaceSize::new(4, 4));
        let tracker = context.tracker();
        let front = context.publish_frame().unwrap();
        assert!(context.resize_offscreen(SurfaceSize::new(8, 2)));
        assert_eq!(tracker.size_of(front.handle), Some(SurfaceSize::new(4, 4)));

        let next = context.publish_frame().unwrap();
        assert_eq!(next.size, SurfaceSize::new(8, 2));
        assert_eq!(tracker.size_of(front.handle), None);
        assert_eq!(tracker.live_buffers(), 2);
    }

    #[test]
    fn empty_context_has_nothing_to_publish() {
        let mut context = HeadlessContext::new(SurfaceSize::zero());
        assert!(context.publish_frame().is_none());
        assert!(!context.resize_offscreen(SurfaceSize::new(0, 10)));
        assert!(context.default_target().is_none());
    }

    #[test]
    fn compositor_paints_the_back_buffer() {
        let mut context = HeadlessContext::new(SurfaceSize::new(2, 1));
        let mut compositor = HeadlessCompositor::new([9, 8, 7, 6]);
        let params = RenderParams::new(SurfaceSize::new(2, 1), Default::default());

        assert!(!compositor.composite(&mut context, &params));
        context.make_current();
        assert!(compositor.composite(&mut context, &params));
        context.publish_frame().unwrap();
        assert_eq!(context.front_pixels(), Some(&[9, 8, 7, 6, 9, 8, 7, 6][..]));
    }
}
