use std::time::Duration;

/// A unit of work for the compositor thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Task queue of the compositor execution context.
///
/// Tasks posted from any thread run on the compositor thread in the order they become due.
/// Implementations do not need to support cancellation; cancelable work is layered on top by
/// the render scheduler.
pub trait CompositorThread: Send + Sync {
    /// Run `task` as soon as possible.
    fn post_task(&self, task: Task);

    /// Run `task` once `delay` has elapsed.
    fn post_delayed_task(&self, delay: Duration, task: Task);
}
