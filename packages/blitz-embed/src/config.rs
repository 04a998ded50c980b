use std::time::Duration;

/// Nominal refresh interval used to pace repaints.
pub const DEFAULT_PAINT_INTERVAL: Duration = Duration::from_micros(1_000_000 / 60);

/// Settings read once when a [`CompositorBridge`](crate::CompositorBridge) is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositorConfig {
    /// The host drives composition itself (via
    /// [`render_now`](crate::CompositorBridge::render_now)); the bridge never schedules repaints
    /// and renders straight into the host's target.
    pub use_external_render_loop: bool,
    /// Delay between an invalidation and the repaint it schedules.
    pub paint_interval: Duration,
    /// Extra repaints scheduled after the first publications following off-screen setup. The
    /// first swaps of a multi-buffered surface leave no finished picture in the front buffer.
    pub warmup_frames: u32,
    /// Longest a consumer waits on the producer's GPU fence before giving up on a frame.
    pub fence_timeout: Duration,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            use_external_render_loop: false,
            paint_interval: DEFAULT_PAINT_INTERVAL,
            warmup_frames: 2,
            fence_timeout: Duration::from_millis(100),
        }
    }
}

impl CompositorConfig {
    /// Defaults overridden by `BLITZ_EMBED_EXTERNAL_RENDER_LOOP`, `BLITZ_EMBED_WARMUP_FRAMES`
    /// and `BLITZ_EMBED_PAINT_INTERVAL_MS`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = lookup("BLITZ_EMBED_EXTERNAL_RENDER_LOOP") {
            config.use_external_render_loop = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(frames) = lookup("BLITZ_EMBED_WARMUP_FRAMES").and_then(|v| v.trim().parse().ok())
        {
            config.warmup_frames = frames;
        }
        if let Some(ms) = lookup("BLITZ_EMBED_PAINT_INTERVAL_MS").and_then(|v| v.trim().parse().ok())
        {
            config.paint_interval = Duration::from_millis(ms);
        }
        config
    }

    pub fn with_external_render_loop(mut self, external: bool) -> Self {
        self.use_external_render_loop = external;
        self
    }

    pub fn with_warmup_frames(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }

    pub fn with_paint_interval(mut self, interval: Duration) -> Self {
        self.paint_interval = interval;
        self
    }
}
