//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use blitz_embed_traits::{
    CompositorThread, ContextCaps, DrawTarget, GpuFence, GraphicsContext, SharedSurface,
    SurfaceSize, SurfaceStrategy, Task,
};

use crate::headless::{HeadlessContext, HeadlessTracker};
use crate::lock;

/// A compositor thread that only runs tasks when pumped. Delays are ignored; tasks run in
/// posting order.
#[derive(Default)]
pub struct ManualCompositorThread {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualCompositorThread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued tasks, including ones posted while pumping, until the queue is empty.
    /// Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let Some(task) = lock(&self.queue).pop_front() else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl CompositorThread for ManualCompositorThread {
    fn post_task(&self, task: Task) {
        lock(&self.queue).push_back(task);
    }

    fn post_delayed_task(&self, _delay: Duration, task: Task) {
        lock(&self.queue).push_back(task);
    }
}

/// Headless context whose publications can be made to fail on demand.
pub struct FlakyContext {
    inner: HeadlessContext,
    fail: Arc<AtomicBool>,
}

impl FlakyContext {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            inner: HeadlessContext::new(size),
            fail: Arc::default(),
        }
    }

    pub fn fail_switch(&self) -> Arc<AtomicBool> {
        self.fail.clone()
    }

    pub fn tracker(&self) -> HeadlessTracker {
        self.inner.tracker()
    }
}

impl GraphicsContext for FlakyContext {
    fn is_offscreen(&self) -> bool {
        self.inner.is_offscreen()
    }

    fn offscreen_size(&self) -> SurfaceSize {
        self.inner.offscreen_size()
    }

    fn resize_offscreen(&mut self, size: SurfaceSize) -> bool {
        self.inner.resize_offscreen(size)
    }

    fn make_current(&mut self) -> bool {
        self.inner.make_current()
    }

    fn is_current(&self) -> bool {
        self.inner.is_current()
    }

    fn capabilities(&self) -> ContextCaps {
        self.inner.capabilities()
    }

    fn configure_sharing(&mut self, strategy: SurfaceStrategy) {
        self.inner.configure_sharing(strategy)
    }

    fn publish_frame(&mut self) -> Option<SharedSurface> {
        if self.fail.load(Ordering::SeqCst) {
            return None;
        }
        self.inner.publish_frame()
    }

    fn default_target(&mut self) -> Option<DrawTarget<'_>> {
        self.inner.default_target()
    }
}

/// A fence that never signals.
pub struct FailingFence;

impl GpuFence for FailingFence {
    fn wait(&self, _timeout: Duration) -> bool {
        false
    }
}
