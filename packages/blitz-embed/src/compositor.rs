//! The compositor bridge: render state machine, off-screen target and the published-frame slot.
//!
//! Three execution contexts touch a bridge:
//!
//! - the control context (the host's UI thread) resizes, suspends, resumes and invalidates
//! - the compositor thread runs the scheduled render task, which paints and then publishes
//! - consumer threads fetch the most recently published frame
//!
//! Painting state (graphics context, layer compositor, rotation) lives behind one mutex and the
//! state shared with consumers (surface size, render target, latest frame) behind another. Code
//! that needs both always takes the pipeline lock first.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use blitz_embed_traits::geometry::has_area;
use blitz_embed_traits::{
    CompositorThread, GpuFence, GraphicsContext, ImageHandle, LayerCompositor, RenderParams,
    ScreenRotation, SurfaceSize, SurfaceStrategy,
};
use blitz_metrics::{FrameMetrics, FrameStats, Phase};

use crate::config::CompositorConfig;
use crate::error::{EmbedError, Result};
use crate::scheduler::RenderScheduler;
use crate::{WindowId, lock, strategy};

/// Lifecycle of a [`CompositorBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeState {
    Uninitialized,
    OffscreenPrepared,
    Rendering,
    Suspended,
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderTarget {
    /// No layer transaction has happened yet.
    Unallocated,
    /// Rendering goes straight to the context's own surface; nothing is shared.
    Passthrough,
    Offscreen(SurfaceStrategy),
    /// The bridge was torn down.
    Invalid,
}

/// What a single render pass achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A new frame of this size became fetchable.
    Published(SurfaceSize),
    /// Painted into a pass-through target. Nothing to hand to consumers.
    Composited,
    /// Nothing was painted (suspended, torn down, or the compositor had nothing to draw).
    Skipped,
}

/// A published frame handed to a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformImage {
    pub handle: ImageHandle,
    pub size: SurfaceSize,
    pub strategy: SurfaceStrategy,
}

struct LatestFrame {
    handle: ImageHandle,
    size: SurfaceSize,
    fence: Option<Arc<dyn GpuFence>>,
}

struct Pipeline {
    context: Box<dyn GraphicsContext>,
    compositor: Box<dyn LayerCompositor>,
    rotation: ScreenRotation,
}

struct SharedState {
    state: BridgeState,
    target: RenderTarget,
    surface_size: SurfaceSize,
    latest: Option<LatestFrame>,
}

/// Connects one window's layer compositor to an off-screen render target and hands finished
/// frames to consumer threads.
///
/// A bridge only knows its window by id; the owning [`WindowBinding`](crate::WindowBinding)
/// holds the strong reference.
pub struct CompositorBridge {
    window_id: WindowId,
    config: CompositorConfig,
    weak_self: Weak<CompositorBridge>,
    attached: AtomicBool,
    scheduler: RenderScheduler,
    warmup_remaining: AtomicU32,
    metrics: FrameMetrics,
    pipeline: Mutex<Pipeline>,
    shared: Mutex<SharedState>,
}

impl CompositorBridge {
    pub fn new(
        window_id: WindowId,
        context: Box<dyn GraphicsContext>,
        compositor: Box<dyn LayerCompositor>,
        thread: Arc<dyn CompositorThread>,
        config: CompositorConfig,
        initial_size: SurfaceSize,
    ) -> Arc<Self> {
        tracing::debug!(
            window = %window_id,
            width = initial_size.width,
            height = initial_size.height,
            external_render_loop = config.use_external_render_loop,
            "creating compositor bridge"
        );
        Arc::new_cyclic(|weak_self| Self {
            window_id,
            scheduler: RenderScheduler::new(thread, config.paint_interval),
            config,
            weak_self: weak_self.clone(),
            attached: AtomicBool::new(false),
            warmup_remaining: AtomicU32::new(0),
            metrics: FrameMetrics::new(),
            pipeline: Mutex::new(Pipeline {
                context,
                compositor,
                rotation: ScreenRotation::default(),
            }),
            shared: Mutex::new(SharedState {
                state: BridgeState::Uninitialized,
                target: RenderTarget::Unallocated,
                surface_size: initial_size,
                latest: None,
            }),
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window_id
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn state(&self) -> BridgeState {
        lock(&self.shared).state
    }

    pub fn surface_size(&self) -> SurfaceSize {
        lock(&self.shared).surface_size
    }

    /// The sharing strategy, once an off-screen target has been prepared.
    pub fn strategy(&self) -> Option<SurfaceStrategy> {
        match lock(&self.shared).target {
            RenderTarget::Offscreen(strategy) => Some(strategy),
            _ => None,
        }
    }

    pub fn rotation(&self) -> ScreenRotation {
        lock(&self.pipeline).rotation
    }

    /// Whether a repaint is scheduled and has not started yet.
    pub fn has_pending_render(&self) -> bool {
        self.scheduler.has_pending()
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.metrics.snapshot()
    }

    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }

    pub(crate) fn mark_attached(&self) -> bool {
        self.attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_detached(&self) {
        self.attached.store(false, Ordering::Release);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Set up the render target as soon as the layer tree connects.
    ///
    /// Picks the sharing strategy for the current context and configures it. Rendering does
    /// this lazily if it has not happened yet. Returns the strategy when the target is
    /// off-screen.
    pub fn allocate_layer_transaction(&self) -> Option<SurfaceStrategy> {
        let mut pipeline = lock(&self.pipeline);
        match self.ensure_prepared(&mut pipeline) {
            RenderTarget::Offscreen(strategy) => Some(strategy),
            _ => None,
        }
    }

    fn ensure_prepared(&self, pipeline: &mut Pipeline) -> RenderTarget {
        let mut shared = lock(&self.shared);
        if shared.target != RenderTarget::Unallocated {
            return shared.target;
        }

        let target = if self.config.use_external_render_loop {
            tracing::info!(window = %self.window_id, "host drives rendering; off-screen setup skipped");
            RenderTarget::Passthrough
        } else if pipeline.context.is_offscreen() {
            let strategy = strategy::select(pipeline.context.capabilities());
            pipeline.context.configure_sharing(strategy);
            self.warmup_remaining
                .store(self.config.warmup_frames, Ordering::Release);
            if shared.state == BridgeState::Uninitialized {
                shared.state = BridgeState::OffscreenPrepared;
            }
            tracing::info!(
                window = %self.window_id,
                strategy = strategy.name(),
                flags = ?strategy.flags(),
                "off-screen target prepared"
            );
            RenderTarget::Offscreen(strategy)
        } else {
            tracing::info!(
                window = %self.window_id,
                "context is not off-screen capable, rendering pass-through"
            );
            RenderTarget::Passthrough
        };
        shared.target = target;
        target
    }

    /// Request a repaint after the paint interval, replacing any pending one.
    ///
    /// Resizes the off-screen buffer first if the surface size changed. Returns false when the
    /// host drives rendering itself, or the bridge is suspended or torn down.
    pub fn invalidate(&self) -> bool {
        if self.config.use_external_render_loop {
            return false;
        }

        let mut pipeline = lock(&self.pipeline);
        let shared = lock(&self.shared);
        if matches!(shared.state, BridgeState::Suspended | BridgeState::TornDown) {
            tracing::debug!(window = %self.window_id, state = ?shared.state, "invalidate ignored");
            return false;
        }

        self.scheduler.cancel();
        self.reconcile_size(pipeline.context.as_mut(), shared.surface_size);

        let weak = self.weak_self.clone();
        self.scheduler.schedule(move |id| {
            if let Some(bridge) = weak.upgrade() {
                bridge.run_render_task(id);
            }
        });
        true
    }

    fn reconcile_size(&self, context: &mut dyn GraphicsContext, size: SurfaceSize) -> bool {
        if !context.is_offscreen() || !has_area(size) || context.offscreen_size() == size {
            return false;
        }
        let _resize = self.metrics.start_phase(Phase::Resize);
        if context.resize_offscreen(size) {
            tracing::debug!(
                window = %self.window_id,
                width = size.width,
                height = size.height,
                "off-screen buffer resized"
            );
            true
        } else {
            tracing::warn!(
                window = %self.window_id,
                width = size.width,
                height = size.height,
                "failed to resize off-screen buffer"
            );
            false
        }
    }

    fn run_render_task(&self, id: u64) {
        self.scheduler.complete(id);
        let _ = self.render_and_record();
    }

    fn take_warmup_frame(&self) -> bool {
        self.warmup_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Composite and publish one frame on the calling thread.
    ///
    /// Meant for hosts that supply their own render loop; scheduled repaints go through the
    /// same path.
    pub fn render_now(&self) -> Result<RenderOutcome> {
        self.render_and_record()
    }

    fn render_and_record(&self) -> Result<RenderOutcome> {
        let result = self.render_frame();
        match &result {
            Ok(RenderOutcome::Published(size)) => {
                self.metrics.frame_published();
                tracing::trace!(
                    window = %self.window_id,
                    width = size.width,
                    height = size.height,
                    "frame published"
                );
                if self.take_warmup_frame() {
                    tracing::debug!(window = %self.window_id, "scheduling warm-up repaint");
                    self.invalidate();
                }
            }
            Ok(_) => {}
            Err(err @ EmbedError::PublishFailure(_)) => {
                self.metrics.publish_failed();
                tracing::error!(window = %self.window_id, error = %err, "keeping previous frame");
            }
            Err(err) => {
                tracing::warn!(window = %self.window_id, error = %err, "render pass failed");
            }
        }
        result
    }

    fn render_frame(&self) -> Result<RenderOutcome> {
        let mut pipeline = lock(&self.pipeline);
        let surface_size = {
            let shared = lock(&self.shared);
            if matches!(shared.state, BridgeState::Suspended | BridgeState::TornDown) {
                return Ok(RenderOutcome::Skipped);
            }
            shared.surface_size
        };

        let target = self.ensure_prepared(&mut pipeline);
        let Pipeline {
            context,
            compositor,
            rotation,
        } = &mut *pipeline;
        if !context.make_current() {
            return Err(EmbedError::ContextLost);
        }

        let size = match target {
            RenderTarget::Offscreen(_) => context.offscreen_size(),
            _ => surface_size,
        };
        let params = RenderParams::new(size, *rotation);
        let paint = self.metrics.start_phase(Phase::Paint);
        let drawn = compositor.composite(context.as_mut(), &params);
        paint.end();
        if !drawn {
            return Ok(RenderOutcome::Skipped);
        }

        match target {
            RenderTarget::Offscreen(_) => {
                let _publish = self.metrics.start_phase(Phase::Publish);
                let mut shared = lock(&self.shared);
                if shared.state == BridgeState::TornDown {
                    return Ok(RenderOutcome::Skipped);
                }
                if !has_area(size) {
                    return Err(EmbedError::PublishFailure(format!(
                        "empty off-screen surface {}x{}",
                        size.width, size.height
                    )));
                }
                let Some(surface) = context.publish_frame() else {
                    return Err(EmbedError::PublishFailure(
                        "context had no back buffer to swap".into(),
                    ));
                };
                let published = surface.size;
                shared.latest = Some(LatestFrame {
                    handle: surface.handle,
                    size: surface.size,
                    fence: surface.fence,
                });
                if shared.state == BridgeState::OffscreenPrepared {
                    shared.state = BridgeState::Rendering;
                }
                Ok(RenderOutcome::Published(published))
            }
            RenderTarget::Passthrough => {
                let mut shared = lock(&self.shared);
                if shared.state == BridgeState::Uninitialized {
                    shared.state = BridgeState::Rendering;
                }
                Ok(RenderOutcome::Composited)
            }
            RenderTarget::Unallocated | RenderTarget::Invalid => Ok(RenderOutcome::Skipped),
        }
    }

    /// Record a new surface size. No-op unless both dimensions are positive and the size
    /// differs from the current one.
    ///
    /// The off-screen buffer follows on the next invalidation; native surfaces are resized on
    /// the compositor thread.
    pub fn set_surface_size(&self, width: i32, height: i32) -> bool {
        let size = SurfaceSize::new(width, height);
        if !has_area(size) {
            return false;
        }
        {
            let mut shared = lock(&self.shared);
            if shared.state == BridgeState::TornDown || shared.surface_size == size {
                return false;
            }
            shared.surface_size = size;
        }
        tracing::debug!(window = %self.window_id, width, height, "surface size changed");

        let weak = self.weak_self.clone();
        self.scheduler.post(Box::new(move || {
            if let Some(bridge) = weak.upgrade() {
                lock(&bridge.pipeline).context.resize_native_surface(size);
            }
        }));
        true
    }

    /// Returns true if the rotation changed. A change requests a repaint.
    pub fn set_screen_rotation(&self, rotation: ScreenRotation) -> bool {
        {
            let mut pipeline = lock(&self.pipeline);
            if pipeline.rotation == rotation {
                return false;
            }
            pipeline.rotation = rotation;
        }
        tracing::debug!(window = %self.window_id, degrees = rotation.degrees(), "screen rotated");
        self.invalidate();
        true
    }

    /// Cancel pending work and ask the render loop to pause.
    pub fn suspend(&self) {
        {
            let mut shared = lock(&self.shared);
            if matches!(shared.state, BridgeState::Suspended | BridgeState::TornDown) {
                return;
            }
            shared.state = BridgeState::Suspended;
        }
        self.scheduler.cancel();

        let weak = self.weak_self.clone();
        self.scheduler.post(Box::new(move || {
            if let Some(bridge) = weak.upgrade() {
                lock(&bridge.pipeline).compositor.pause();
            }
        }));
        tracing::info!(window = %self.window_id, "rendering suspended");
    }

    /// Reinstate rendering and request one repaint.
    ///
    /// Does nothing (and returns false) while the surface size is degenerate, so a view that
    /// was never laid out stays paused.
    pub fn resume(&self) -> bool {
        let size = {
            let mut shared = lock(&self.shared);
            if shared.state == BridgeState::TornDown || !has_area(shared.surface_size) {
                return false;
            }
            if shared.state == BridgeState::Suspended {
                shared.state = match shared.target {
                    RenderTarget::Offscreen(_) if shared.latest.is_some() => BridgeState::Rendering,
                    RenderTarget::Offscreen(_) => BridgeState::OffscreenPrepared,
                    RenderTarget::Passthrough => BridgeState::Rendering,
                    RenderTarget::Unallocated | RenderTarget::Invalid => {
                        BridgeState::Uninitialized
                    }
                };
            }
            shared.surface_size
        };

        let weak = self.weak_self.clone();
        self.scheduler.post(Box::new(move || {
            if let Some(bridge) = weak.upgrade() {
                if !lock(&bridge.pipeline).compositor.resume(size) {
                    tracing::warn!(window = %bridge.window_id, "layer compositor failed to resume");
                }
            }
        }));
        tracing::info!(
            window = %self.window_id,
            width = size.width,
            height = size.height,
            "rendering resumed"
        );
        self.invalidate();
        true
    }

    /// Run `f` with the most recently published frame while the frame lock is held, so the
    /// frame cannot be replaced or torn down underneath it.
    ///
    /// Waits on the producer's GPU fence first.
    pub fn with_platform_image<R>(&self, f: impl FnOnce(&PlatformImage) -> R) -> Result<R> {
        let shared = lock(&self.shared);
        let strategy = match shared.target {
            RenderTarget::Offscreen(strategy) => strategy,
            RenderTarget::Unallocated => {
                return Err(EmbedError::SurfaceUnavailable {
                    reason: "off-screen target not prepared",
                });
            }
            RenderTarget::Passthrough => {
                return Err(EmbedError::SurfaceUnavailable {
                    reason: "context is not off-screen capable",
                });
            }
            RenderTarget::Invalid => {
                return Err(EmbedError::SurfaceUnavailable {
                    reason: "compositor torn down",
                });
            }
        };
        let Some(latest) = shared.latest.as_ref() else {
            tracing::trace!(window = %self.window_id, "fetch before first publication");
            return Err(EmbedError::SurfaceUnavailable {
                reason: "nothing published yet",
            });
        };

        if let Some(fence) = &latest.fence {
            let wait = self.metrics.start_phase(Phase::FenceWait);
            let signalled = fence.wait(self.config.fence_timeout);
            wait.end();
            if !signalled {
                tracing::warn!(
                    window = %self.window_id,
                    handle = %latest.handle,
                    "GPU fence wait failed"
                );
                return Err(EmbedError::FenceTimeout);
            }
        }

        Ok(f(&PlatformImage {
            handle: latest.handle,
            size: latest.size,
            strategy,
        }))
    }

    pub fn try_fetch_platform_image(&self) -> Result<PlatformImage> {
        self.with_platform_image(|image| *image)
    }

    /// The most recently published frame, or `None` if there is nothing to share.
    pub fn fetch_platform_image(&self) -> Option<PlatformImage> {
        self.try_fetch_platform_image().ok()
    }

    /// Cancel pending work, invalidate the render target and drop the published frame.
    ///
    /// The owning [`WindowBinding`](crate::WindowBinding) and its observers only learn of this
    /// the next time the binding forwards a call; use
    /// [`WindowBinding::detach_compositor`](crate::WindowBinding::detach_compositor) to notify
    /// them right away.
    pub fn teardown(&self) {
        self.scheduler.cancel();
        {
            let mut shared = lock(&self.shared);
            if shared.state == BridgeState::TornDown {
                return;
            }
            shared.state = BridgeState::TornDown;
            shared.target = RenderTarget::Invalid;
            shared.latest = None;
        }
        let stats = self.metrics.snapshot();
        tracing::info!(
            window = %self.window_id,
            frames = stats.frames_published,
            failures = stats.publish_failures,
            "compositor torn down"
        );
    }

    pub(crate) fn with_pipeline<R>(
        &self,
        f: impl FnOnce(&mut dyn LayerCompositor, ScreenRotation) -> R,
    ) -> R {
        let mut pipeline = lock(&self.pipeline);
        let rotation = pipeline.rotation;
        f(pipeline.compositor.as_mut(), rotation)
    }
}

impl Drop for CompositorBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessCompositor, HeadlessContext, HeadlessTracker};
    use crate::test_support::{FailingFence, FlakyContext, ManualCompositorThread};
    use blitz_embed_traits::ContextCaps;

    struct Harness {
        bridge: Arc<CompositorBridge>,
        thread: Arc<ManualCompositorThread>,
        tracker: HeadlessTracker,
    }

    fn harness(
        context: impl GraphicsContext + 'static,
        tracker: HeadlessTracker,
        config: CompositorConfig,
        size: SurfaceSize,
    ) -> Harness {
        let thread = Arc::new(ManualCompositorThread::new());
        let bridge = CompositorBridge::new(
            WindowId::new(7),
            Box::new(context),
            Box::new(HeadlessCompositor::default().observed_by(tracker.clone())),
            thread.clone(),
            config,
            size,
        );
        Harness {
            bridge,
            thread,
            tracker,
        }
    }

    fn offscreen(context_size: SurfaceSize, config: CompositorConfig, size: SurfaceSize) -> Harness {
        let context = HeadlessContext::new(context_size);
        let tracker = context.tracker();
        harness(context, tracker, config, size)
    }

    fn square(side: i32) -> Harness {
        let size = SurfaceSize::new(side, side);
        offscreen(size, CompositorConfig::default(), size)
    }

    #[test]
    fn fetch_is_empty_before_anything_is_published() {
        let h = offscreen(SurfaceSize::zero(), CompositorConfig::default(), SurfaceSize::zero());
        assert!(h.bridge.fetch_platform_image().is_none());
        assert_eq!(h.bridge.state(), BridgeState::Uninitialized);
    }

    #[test]
    fn invalidate_after_resize_publishes_the_new_size() {
        let h = offscreen(SurfaceSize::zero(), CompositorConfig::default(), SurfaceSize::zero());

        assert!(h.bridge.set_surface_size(800, 600));
        assert!(h.bridge.invalidate());
        h.thread.run_until_idle();

        let image = h.bridge.fetch_platform_image().unwrap();
        assert_eq!(image.size, SurfaceSize::new(800, 600));
        assert_eq!(h.tracker.size_of(image.handle), Some(image.size));
        assert!(image.strategy.is_direct());
        assert_eq!(h.bridge.state(), BridgeState::Rendering);
        assert_eq!(h.tracker.native_size(), Some(SurfaceSize::new(800, 600)));
    }

    #[test]
    fn unchanged_size_never_resizes_or_schedules() {
        let h = offscreen(SurfaceSize::zero(), CompositorConfig::default(), SurfaceSize::zero());

        assert!(h.bridge.set_surface_size(800, 600));
        assert!(!h.bridge.has_pending_render());
        assert!(!h.bridge.set_surface_size(800, 600));
        assert!(!h.bridge.set_surface_size(0, 600));
        assert!(!h.bridge.set_surface_size(800, -1));

        h.bridge.invalidate();
        h.thread.run_until_idle();
        assert_eq!(h.tracker.resize_count(), 1);

        assert!(!h.bridge.set_surface_size(800, 600));
        assert!(!h.bridge.has_pending_render());
        h.bridge.invalidate();
        h.thread.run_until_idle();
        assert_eq!(h.tracker.resize_count(), 1);
    }

    #[test]
    fn cold_start_paints_two_extra_frames_then_stops() {
        let h = square(320);

        assert!(h.bridge.invalidate());
        h.thread.run_until_idle();
        assert_eq!(h.tracker.publish_count(), 3);
        assert!(!h.bridge.has_pending_render());

        h.bridge.invalidate();
        h.thread.run_until_idle();
        assert_eq!(h.tracker.publish_count(), 4);
        assert_eq!(h.bridge.frame_stats().frames_published, 4);
    }

    #[test]
    fn warmup_count_is_configurable() {
        let size = SurfaceSize::new(64, 64);
        let h = offscreen(size, CompositorConfig::default().with_warmup_frames(0), size);
        h.bridge.invalidate();
        h.thread.run_until_idle();
        assert_eq!(h.tracker.publish_count(), 1);
    }

    #[test]
    fn immediate_publication_arms_warmup_repaints() {
        let h = square(32);
        assert!(h.bridge.allocate_layer_transaction().is_some());

        assert_eq!(
            h.bridge.render_now(),
            Ok(RenderOutcome::Published(SurfaceSize::new(32, 32)))
        );
        assert!(h.bridge.has_pending_render());
        h.thread.run_until_idle();
        assert_eq!(h.tracker.publish_count(), 3);
        assert!(!h.bridge.has_pending_render());

        // A later demand repaint publishes exactly once.
        h.bridge.invalidate();
        h.thread.run_until_idle();
        assert_eq!(h.tracker.publish_count(), 4);
    }

    #[test]
    fn failed_publication_keeps_previous_frame() {
        let size = SurfaceSize::new(100, 100);
        let context = FlakyContext::new(size);
        let fail = context.fail_switch();
        let tracker = context.tracker();
        let h = harness(
            context,
            tracker,
            CompositorConfig::default().with_warmup_frames(0),
            size,
        );

        h.bridge.invalidate();
        h.thread.run_until_idle();
        let first = h.bridge.fetch_platform_image().unwrap();

        fail.store(true, Ordering::SeqCst);
        h.bridge.invalidate();
        h.thread.run_until_idle();
        assert_eq!(h.bridge.fetch_platform_image(), Some(first));
        assert_eq!(h.bridge.frame_stats().publish_failures, 1);
        assert_eq!(h.bridge.frame_stats().frames_published, 1);
    }

    #[test]
    fn empty_offscreen_surface_is_a_publish_failure() {
        let h = offscreen(SurfaceSize::zero(), CompositorConfig::default(), SurfaceSize::zero());
        assert!(matches!(
            h.bridge.render_now(),
            Err(EmbedError::PublishFailure(_))
        ));
        assert_eq!(h.tracker.publish_count(), 0);
        assert!(h.bridge.fetch_platform_image().is_none());
    }

    #[test]
    fn suspend_cancels_and_resume_requires_a_size() {
        let h = offscreen(SurfaceSize::zero(), CompositorConfig::default(), SurfaceSize::zero());

        h.bridge.suspend();
        assert!(!h.bridge.resume());
        assert!(!h.bridge.has_pending_render());
        assert_eq!(h.bridge.state(), BridgeState::Suspended);
        assert!(!h.bridge.invalidate());
        h.thread.run_until_idle();
        assert!(h.tracker.is_paused());

        h.bridge.set_surface_size(640, 480);
        assert!(h.bridge.resume());
        assert!(h.bridge.has_pending_render());
        h.thread.run_until_idle();
        assert!(!h.tracker.is_paused());
        assert_eq!(h.bridge.state(), BridgeState::Rendering);
    }

    #[test]
    fn suspend_drops_a_pending_repaint() {
        let h = square(32);
        h.bridge.invalidate();
        h.bridge.suspend();
        assert!(!h.bridge.has_pending_render());
        h.thread.run_until_idle();
        assert_eq!(h.tracker.publish_count(), 0);
    }

    #[test]
    fn external_render_loop_never_schedules() {
        let size = SurfaceSize::new(32, 32);
        let h = offscreen(
            size,
            CompositorConfig::default().with_external_render_loop(true),
            size,
        );
        assert!(!h.bridge.invalidate());
        assert_eq!(h.thread.pending(), 0);
        assert_eq!(h.bridge.render_now(), Ok(RenderOutcome::Composited));
        assert_eq!(h.tracker.paint_count(), 1);
        assert_eq!(h.bridge.strategy(), None);
        assert!(matches!(
            h.bridge.try_fetch_platform_image(),
            Err(EmbedError::SurfaceUnavailable { .. })
        ));
    }

    #[test]
    fn onscreen_context_degrades_to_passthrough() {
        let size = SurfaceSize::new(32, 32);
        let context = HeadlessContext::onscreen(size);
        let tracker = context.tracker();
        let h = harness(context, tracker, CompositorConfig::default(), size);

        assert_eq!(h.bridge.allocate_layer_transaction(), None);
        h.bridge.invalidate();
        h.thread.run_until_idle();
        assert_eq!(h.bridge.state(), BridgeState::Rendering);
        assert_eq!(h.tracker.paint_count(), 1);
        assert!(h.bridge.fetch_platform_image().is_none());
    }

    #[test]
    fn texture_copy_frames_carry_their_strategy() {
        let size = SurfaceSize::new(16, 16);
        let context = HeadlessContext::new(size).with_capabilities(ContextCaps::ORIGIN_BOTTOM_LEFT);
        let tracker = context.tracker();
        let h = harness(context, tracker, CompositorConfig::default(), size);

        let strategy = h.bridge.allocate_layer_transaction().unwrap();
        assert!(!strategy.is_direct());
        assert_eq!(h.bridge.state(), BridgeState::OffscreenPrepared);
        h.bridge.render_now().unwrap();
        assert_eq!(h.bridge.fetch_platform_image().unwrap().strategy, strategy);
    }

    #[test]
    fn strategy_is_chosen_once() {
        let h = square(16);
        let first = h.bridge.allocate_layer_transaction();
        assert!(first.is_some());
        h.bridge.render_now().unwrap();
        assert_eq!(h.bridge.allocate_layer_transaction(), first);
        assert_eq!(h.bridge.strategy(), first);
    }

    #[test]
    fn fence_timeout_withholds_the_frame() {
        let size = SurfaceSize::new(16, 16);
        let context = HeadlessContext::new(size).with_fence(Arc::new(FailingFence));
        let tracker = context.tracker();
        let h = harness(context, tracker, CompositorConfig::default(), size);

        h.bridge.render_now().unwrap();
        assert_eq!(
            h.bridge.try_fetch_platform_image(),
            Err(EmbedError::FenceTimeout)
        );
    }

    #[test]
    fn rotation_reaches_the_compositor_and_requests_a_repaint() {
        let size = SurfaceSize::new(200, 100);
        let h = offscreen(size, CompositorConfig::default().with_warmup_frames(0), size);

        assert!(h.bridge.set_screen_rotation(ScreenRotation::Rotation180));
        assert!(!h.bridge.set_screen_rotation(ScreenRotation::Rotation180));
        assert!(h.bridge.has_pending_render());
        h.thread.run_until_idle();

        let params = h.tracker.last_params().unwrap();
        assert_eq!(params.rotation, ScreenRotation::Rotation180);
        assert_eq!(
            params.transform,
            ScreenRotation::Rotation180.world_transform(size)
        );
    }

    #[test]
    fn teardown_clears_the_frame_and_stops_scheduling() {
        let h = square(16);
        h.bridge.render_now().unwrap();
        assert!(h.bridge.fetch_platform_image().is_some());
        h.bridge.invalidate();

        h.bridge.teardown();
        assert!(!h.bridge.has_pending_render());
        assert_eq!(h.bridge.state(), BridgeState::TornDown);
        assert!(h.bridge.fetch_platform_image().is_none());
        assert!(!h.bridge.invalidate());
        assert!(!h.bridge.resume());
        assert!(!h.bridge.set_surface_size(32, 32));
        assert_eq!(h.bridge.render_now(), Ok(RenderOutcome::Skipped));
        h.thread.run_until_idle();
        assert_eq!(h.tracker.publish_count(), 1);
    }

    #[test]
    fn repaints_outliving_the_bridge_are_harmless() {
        let Harness { bridge, thread, tracker } = square(16);
        bridge.invalidate();
        drop(bridge);
        thread.run_until_idle();
        assert_eq!(tracker.publish_count(), 0);
    }

    #[test]
    fn concurrent_fetch_never_sees_a_torn_frame() {
        let Harness {
            bridge,
            thread: compositor_thread,
            tracker,
        } = offscreen(SurfaceSize::zero(), CompositorConfig::default(), SurfaceSize::zero());
        let sizes = [SurfaceSize::new(8, 6), SurfaceSize::new(10, 7)];
        let done = Arc::new(AtomicBool::new(false));

        let producer = {
            let bridge = bridge.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                for i in 0..400 {
                    let size = sizes[i % 2];
                    bridge.set_surface_size(size.width, size.height);
                    bridge.invalidate();
                    compositor_thread.run_until_idle();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let bridge = bridge.clone();
                let tracker = tracker.clone();
                let done = done.clone();
                std::thread::spawn(move || {
                    while !done.load(Ordering::SeqCst) {
                        let _ = bridge.with_platform_image(|image| {
                            assert!(sizes.contains(&image.size), "unexpected {:?}", image.size);
                            assert_eq!(tracker.size_of(image.handle), Some(image.size));
                        });
                    }
                })
            })
            .collect();

        producer.join().unwrap();
        for consumer in consumers {
            consumer.join().unwrap();
        }
        assert_eq!(bridge.fetch_platform_image().unwrap().size, sizes[1]);
        assert!(bridge.frame_stats().frames_published >= 400);
    }
}
