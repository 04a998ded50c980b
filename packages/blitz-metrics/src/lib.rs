//! Shared metric types for Blitz compositor instrumentation.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Compositing the layer tree into the back buffer.
    Paint,
    /// Swapping the back buffer to the front under the frame lock.
    Publish,
    /// Waiting on the producer's GPU fence before handing a frame to a consumer.
    FenceWait,
    /// Reallocating the off-screen buffer.
    Resize,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Paint => "paint",
            Phase::Publish => "publish",
            Phase::FenceWait => "fence",
            Phase::Resize => "resize",
        }
    }
}

/// Accumulated time spent per phase, in milliseconds.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct FrameTimings {
    pub paint_ms: f32,
    pub publish_ms: f32,
    pub fence_wait_ms: f32,
    pub resize_ms: f32,
}

impl FrameTimings {
    pub fn slowest_phase(&self) -> (&'static str, f32) {
        let mut pairs = [
            (Phase::Paint.name(), self.paint_ms),
            (Phase::Publish.name(), self.publish_ms),
            (Phase::FenceWait.name(), self.fence_wait_ms),
            (Phase::Resize.name(), self.resize_ms),
        ];
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs[0]
    }

    pub fn add(&mut self, phase: Phase, dur: Duration) {
        let ms = dur.as_secs_f32() * 1000.0;
        match phase {
            Phase::Paint => self.paint_ms += ms,
            Phase::Publish => self.publish_ms += ms,
            Phase::FenceWait => self.fence_wait_ms += ms,
            Phase::Resize => self.resize_ms += ms,
        }
    }

    pub fn total_ms(&self) -> f32 {
        self.paint_ms + self.publish_ms + self.fence_wait_ms + self.resize_ms
    }
}

/// Point-in-time copy of a [`FrameMetrics`].
#[derive(Default, Debug, Clone, PartialEq)]
pub struct FrameStats {
    pub timings: FrameTimings,
    pub frames_published: u64,
    pub publish_failures: u64,
}

/// Timing and counters for one compositor.
///
/// Phases are recorded from several threads (the compositor thread paints and publishes,
/// consumers wait on fences), so everything here is internally synchronised.
#[derive(Debug, Default)]
pub struct FrameMetrics {
    timings: Mutex<FrameTimings>,
    frames_published: AtomicU64,
    publish_failures: AtomicU64,
    frozen: AtomicBool,
}

impl FrameMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_phase(&self, phase: Phase) -> PhaseGuard<'_> {
        PhaseGuard {
            metrics: self,
            phase,
            start: Some(Instant::now()),
        }
    }

    pub fn record(&self, phase: Phase, dur: Duration) {
        if self.frozen.load(Ordering::SeqCst) {
            return;
        }
        self.timings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(phase, dur);
    }

    pub fn frame_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FrameStats {
        FrameStats {
            timings: self
                .timings
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }

    /// Stop accumulating phase timings. Counters keep counting.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    pub fn unfreeze_and_reset(&self) {
        self.frozen.store(false, Ordering::SeqCst);
        *self.timings.lock().unwrap_or_else(PoisonError::into_inner) = FrameTimings::default();
    }
}

/// Records the time between its creation and [`end`](Self::end) (or drop).
pub struct PhaseGuard<'a> {
    metrics: &'a FrameMetrics,
    phase: Phase,
    start: Option<Instant>,
}

impl PhaseGuard<'_> {
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(st) = self.start.take() {
            self.metrics.record(self.phase, st.elapsed());
        }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
