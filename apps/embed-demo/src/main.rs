//! Drives the whole embedding pipeline headlessly: a host thread resizes and repaints a window
//! while a consumer thread picks up frames on its own cadence.

use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use blitz_embed::traits::{ScreenRotation, SurfaceSize};
use blitz_embed::{
    CompositorBridge, CompositorConfig, HeadlessCompositor, HeadlessContext,
    TokioCompositorThread, WindowId, WindowObserver, WindowRegistry,
};
use tracing_subscriber::EnvFilter;

struct LoggingObserver;

impl WindowObserver for LoggingObserver {
    fn compositor_attached(&self, window: WindowId) {
        tracing::info!(%window, "observer: compositor attached");
    }

    fn compositor_detached(&self, window: WindowId) {
        tracing::info!(%window, "observer: compositor detached");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,blitz_embed=debug")),
        )
        .with_thread_names(true)
        .init();

    let registry = WindowRegistry::init();
    let window = registry.register_window(WindowId::new(7))?;
    let observer = Rc::new(LoggingObserver);
    let token = window.add_observer(&observer);

    let compositor_thread = Arc::new(TokioCompositorThread::spawn()?);
    let bridge = CompositorBridge::new(
        window.id(),
        Box::new(HeadlessContext::new(SurfaceSize::zero())),
        Box::new(HeadlessCompositor::new([0x20, 0x60, 0xc0, 0xff])),
        compositor_thread.clone(),
        CompositorConfig::from_env(),
        SurfaceSize::zero(),
    );
    window.attach_compositor(bridge.clone())?;
    if let Some(strategy) = bridge.allocate_layer_transaction() {
        tracing::info!(strategy = strategy.name(), "sharing frames");
    }

    let running = Arc::new(AtomicBool::new(true));
    let consumer = {
        let bridge = bridge.clone();
        let running = running.clone();
        thread::Builder::new()
            .name("consumer".into())
            .spawn(move || {
                let mut last = None;
                while running.load(Ordering::Acquire) {
                    match bridge.try_fetch_platform_image() {
                        Ok(image) if last != Some(image.handle) => {
                            tracing::info!(
                                handle = %image.handle,
                                width = image.size.width,
                                height = image.size.height,
                                "consumed frame"
                            );
                            last = Some(image.handle);
                        }
                        Ok(_) => {}
                        Err(err) => tracing::debug!(error = %err, "no frame yet"),
                    }
                    thread::sleep(Duration::from_millis(10));
                }
            })?
    };

    window.set_surface_size(800, 600);
    window.schedule_repaint();
    thread::sleep(Duration::from_millis(150));

    window.set_surface_size(1024, 768);
    bridge.set_screen_rotation(ScreenRotation::Rotation90);
    thread::sleep(Duration::from_millis(150));

    window.suspend();
    thread::sleep(Duration::from_millis(50));
    window.resume();
    thread::sleep(Duration::from_millis(100));

    let (width, height, stride) = (64, 48, 64 * 2);
    let mut snapshot = vec![0u8; height as usize * stride];
    window.render_snapshot(&mut snapshot, width, height, stride, 16)?;
    tracing::info!(width, height, depth = 16, "snapshot rendered");

    running.store(false, Ordering::Release);
    if consumer.join().is_err() {
        tracing::error!("consumer thread panicked");
    }

    let stats = bridge.frame_stats();
    let (phase, ms) = stats.timings.slowest_phase();
    tracing::info!(
        frames = stats.frames_published,
        failures = stats.publish_failures,
        slowest_phase = phase,
        slowest_ms = ms,
        "done"
    );

    window.detach_compositor();
    window.remove_observer(token);
    drop(window);
    registry.shutdown();
    Ok(())
}
