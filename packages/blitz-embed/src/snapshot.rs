use blitz_embed_traits::{DrawTarget, PixelFormat, RenderParams, SurfaceSize};

use crate::compositor::{BridgeState, CompositorBridge};
use crate::error::{EmbedError, Result};

impl CompositorBridge {
    /// Composite synchronously into `buffer`, a `size` image in `format` with rows `stride`
    /// bytes apart.
    ///
    /// Runs on the calling thread and does not touch the published frame.
    pub fn render_snapshot(
        &self,
        buffer: &mut [u8],
        size: SurfaceSize,
        stride: usize,
        format: PixelFormat,
    ) -> Result<()> {
        let mut target =
            DrawTarget::new(buffer, size, stride, format).ok_or(EmbedError::InvalidBuffer)?;
        self.render_to_target(&mut target)
    }

    pub fn render_to_target(&self, target: &mut DrawTarget<'_>) -> Result<()> {
        if self.state() == BridgeState::TornDown {
            return Err(EmbedError::SurfaceUnavailable {
                reason: "compositor torn down",
            });
        }
        let drawn = self.with_pipeline(|compositor, rotation| {
            let params = RenderParams::new(target.size(), rotation);
            compositor.composite_to_target(target, &params)
        });
        if drawn {
            tracing::debug!(
                window = %self.window_id(),
                width = target.size().width,
                height = target.size().height,
                depth = target.format().depth(),
                "snapshot rendered"
            );
            Ok(())
        } else {
            Err(EmbedError::SnapshotFailed)
        }
    }
}
