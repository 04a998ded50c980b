use std::thread::JoinHandle;
use std::time::Duration;

use blitz_embed_traits::{CompositorThread, Task};
use tokio::sync::mpsc;

enum CompositorMessage {
    Run(Task),
    RunAfter(Duration, Task),
    Shutdown,
}

/// A dedicated "Compositor" OS thread driving a single-threaded tokio runtime.
///
/// Immediate tasks run in posting order; delayed tasks are spawned onto the runtime and run once
/// their timer fires. Dropping the handle stops the thread and discards delayed tasks that have
/// not fired yet.
pub struct TokioCompositorThread {
    sender: mpsc::UnboundedSender<CompositorMessage>,
    thread: Option<JoinHandle<()>>,
}

impl TokioCompositorThread {
    pub fn spawn() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("Compositor".into())
            .spawn(move || runtime.block_on(Self::task_runner(receiver)))?;
        tracing::debug!("compositor thread started");
        Ok(Self {
            sender,
            thread: Some(thread),
        })
    }

    async fn task_runner(mut receiver: mpsc::UnboundedReceiver<CompositorMessage>) {
        while let Some(message) = receiver.recv().await {
            match message {
                CompositorMessage::Run(task) => task(),
                CompositorMessage::RunAfter(delay, task) => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        task();
                    });
                }
                CompositorMessage::Shutdown => break,
            }
        }
        tracing::debug!("compositor thread stopped");
    }

    fn send(&self, message: CompositorMessage) {
        if self.sender.send(message).is_err() {
            tracing::warn!("compositor thread is gone, dropping task");
        }
    }
}

impl CompositorThread for TokioCompositorThread {
    fn post_task(&self, task: Task) {
        self.send(CompositorMessage::Run(task));
    }

    fn post_delayed_task(&self, delay: Duration, task: Task) {
        if delay.is_zero() {
            self.send(CompositorMessage::Run(task));
        } else {
            self.send(CompositorMessage::RunAfter(delay, task));
        }
    }
}

impl Drop for TokioCompositorThread {
    fn drop(&mut self) {
        let _ = self.sender.send(CompositorMessage::Shutdown);
        let Some(thread) = self.thread.take() else {
            return;
        };
        // The last reference can be released by a task running on the thread itself.
        if thread.thread().id() == std::thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            tracing::error!("compositor thread panicked");
        }
    }
}
