//! Delayed, cancelable repaint tasks on the compositor thread.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blitz_embed_traits::{CompositorThread, Task};

use crate::lock;

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const CANCELLED: u8 = 2;

/// Shared run/cancel state of one posted task.
///
/// Exactly one of [`cancel`](Self::cancel) and [`try_start`](Self::try_start) wins. Cancelling
/// after the task started has no effect on it.
#[derive(Debug, Clone, Default)]
pub struct CancelableTask {
    state: Arc<AtomicU8>,
}

impl CancelableTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the task had not started and now never will.
    pub fn cancel(&self) -> bool {
        self.transition(CANCELLED)
    }

    /// Returns true if the task may run.
    pub fn try_start(&self) -> bool {
        self.transition(STARTED)
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug)]
struct PendingRenderTask {
    id: u64,
    token: CancelableTask,
}

/// Owns the (at most one) pending repaint of a compositor.
pub struct RenderScheduler {
    thread: Arc<dyn CompositorThread>,
    interval: Duration,
    pending: Mutex<Option<PendingRenderTask>>,
    next_id: AtomicU64,
}

impl RenderScheduler {
    pub fn new(thread: Arc<dyn CompositorThread>, interval: Duration) -> Self {
        Self {
            thread,
            interval,
            pending: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Replace the pending repaint with `render`, run after the paint interval.
    ///
    /// Cancel-then-schedule happens under one lock, so concurrent callers cannot leave two
    /// repaints in flight. `render` receives the id it was scheduled under.
    pub fn schedule(&self, render: impl FnOnce(u64) + Send + 'static) -> u64 {
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.take() {
            previous.token.cancel();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancelableTask::new();
        let run_token = token.clone();
        self.thread.post_delayed_task(
            self.interval,
            Box::new(move || {
                if run_token.try_start() {
                    render(id);
                }
            }),
        );
        *pending = Some(PendingRenderTask { id, token });
        tracing::trace!(id, delay_ms = self.interval.as_millis() as u64, "repaint scheduled");
        id
    }

    /// Cancel the pending repaint, if any. Returns true if one was stopped before it started.
    pub fn cancel(&self) -> bool {
        lock(&self.pending)
            .take()
            .is_some_and(|pending| pending.token.cancel())
    }

    /// Forget the pending slot once repaint `id` has started running.
    pub fn complete(&self, id: u64) {
        let mut pending = lock(&self.pending);
        if pending.as_ref().is_some_and(|p| p.id == id) {
            *pending = None;
        }
    }

    /// Whether a repaint is scheduled and has not started yet.
    pub fn has_pending(&self) -> bool {
        lock(&self.pending)
            .as_ref()
            .is_some_and(|p| p.token.is_pending())
    }

    /// Post fire-and-forget work to the compositor thread.
    pub fn post(&self, task: Task) {
        self.thread.post_task(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ManualCompositorThread;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn cancel_only_stops_tasks_that_have_not_started() {
        let task = CancelableTask::new();
        assert!(task.try_start());
        assert!(!task.cancel());

        let task = CancelableTask::new();
        assert!(task.cancel());
        assert!(!task.try_start());
    }

    #[test]
    fn rescheduling_replaces_the_pending_task() {
        let thread = Arc::new(ManualCompositorThread::new());
        let scheduler = RenderScheduler::new(thread.clone(), Duration::from_millis(16));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let runs = runs.clone();
            scheduler.schedule(move |_| {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(scheduler.has_pending());
        assert_eq!(thread.run_until_idle(), 3);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_task_is_no_longer_pending() {
        let thread = Arc::new(ManualCompositorThread::new());
        let scheduler = RenderScheduler::new(thread.clone(), Duration::ZERO);
        scheduler.schedule(|_| panic!("cancelled repaint ran"));
        assert!(scheduler.cancel());
        assert!(!scheduler.has_pending());
        assert!(!scheduler.cancel());
        thread.run_until_idle();
    }

    #[test]
    fn complete_ignores_stale_ids() {
        let thread = Arc::new(ManualCompositorThread::new());
        let scheduler = RenderScheduler::new(thread, Duration::ZERO);
        let first = scheduler.schedule(|_| {});
        let second = scheduler.schedule(|_| {});
        scheduler.complete(first);
        assert!(scheduler.has_pending());
        scheduler.complete(second);
        assert!(!scheduler.has_pending());
    }
}
