//! The painting boundary: pixel formats, CPU draw targets and the layer compositor.

use crate::geometry::{has_area, ScreenRotation, SurfaceSize, WorldTransform};
use crate::gfx::GraphicsContext;

/// Pixel layouts a host can ask a snapshot to be drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32 bpp, 8 bits per channel with alpha.
    R8G8B8A8,
    /// 32 bpp storage for 24 bits of colour; the padding byte is written as 0xff.
    R8G8B8X8,
    /// 16 bpp packed 5-6-5, little endian.
    R5G6B5,
}

impl PixelFormat {
    /// Map a colour depth in bits to the format hosts mean by it.
    pub fn from_depth(depth: u32) -> Option<Self> {
        match depth {
            32 => Some(PixelFormat::R8G8B8A8),
            24 => Some(PixelFormat::R8G8B8X8),
            16 => Some(PixelFormat::R5G6B5),
            _ => None,
        }
    }

    pub fn depth(self) -> u32 {
        match self {
            PixelFormat::R8G8B8A8 => 32,
            PixelFormat::R8G8B8X8 => 24,
            PixelFormat::R5G6B5 => 16,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::R8G8B8A8 | PixelFormat::R8G8B8X8 => 4,
            PixelFormat::R5G6B5 => 2,
        }
    }

    /// Encode a non-premultiplied RGBA colour into `out`, which must be exactly
    /// [`bytes_per_pixel`](Self::bytes_per_pixel) long.
    pub fn write_pixel(self, [r, g, b, a]: [u8; 4], out: &mut [u8]) {
        match self {
            PixelFormat::R8G8B8A8 => out.copy_from_slice(&[r, g, b, a]),
            PixelFormat::R8G8B8X8 => out.copy_from_slice(&[r, g, b, 0xff]),
            PixelFormat::R5G6B5 => {
                let packed =
                    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                out.copy_from_slice(&packed.to_le_bytes());
            }
        }
    }
}

/// A caller-owned CPU pixel buffer.
#[derive(Debug)]
pub struct DrawTarget<'a> {
    data: &'a mut [u8],
    size: SurfaceSize,
    stride: usize,
    format: PixelFormat,
}

impl<'a> DrawTarget<'a> {
    /// Wrap `data` as a `size` image with rows `stride` bytes apart.
    ///
    /// Returns `None` if the size is degenerate, a row does not fit in `stride`, or `data` is
    /// shorter than `height * stride`.
    pub fn new(
        data: &'a mut [u8],
        size: SurfaceSize,
        stride: usize,
        format: PixelFormat,
    ) -> Option<Self> {
        if !has_area(size) {
            return None;
        }
        let row_bytes = (size.width as usize).checked_mul(format.bytes_per_pixel())?;
        let required = stride.checked_mul(size.height as usize)?;
        if stride < row_bytes || data.len() < required {
            return None;
        }
        Some(Self {
            data,
            size,
            stride,
            format,
        })
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The visible bytes of row `y` (stride padding excluded).
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.stride;
        let len = self.size.width as usize * self.format.bytes_per_pixel();
        &mut self.data[start..start + len]
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        let bpp = self.format.bytes_per_pixel();
        let format = self.format;
        for y in 0..self.size.height as usize {
            for px in self.row_mut(y).chunks_exact_mut(bpp) {
                format.write_pixel(rgba, px);
            }
        }
    }
}

/// Per-paint parameters handed to the layer compositor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub size: SurfaceSize,
    pub rotation: ScreenRotation,
    pub transform: WorldTransform,
}

impl RenderParams {
    pub fn new(size: SurfaceSize, rotation: ScreenRotation) -> Self {
        Self {
            size,
            rotation,
            transform: rotation.world_transform(size),
        }
    }
}

/// Paints the layer tree. The compositing algorithm itself lives outside the embedding layer.
pub trait LayerCompositor: Send {
    /// Composite into the context's current render target (the back buffer for off-screen
    /// contexts). Returns false if nothing could be drawn.
    fn composite(&mut self, context: &mut dyn GraphicsContext, params: &RenderParams) -> bool;

    /// Composite synchronously into a CPU buffer supplied by the host.
    fn composite_to_target(&mut self, target: &mut DrawTarget<'_>, params: &RenderParams) -> bool;

    /// Stop the underlying render loop until [`resume`](Self::resume).
    fn pause(&mut self) {}

    /// Restart the render loop at `size`. Returns false if the loop could not be restarted.
    fn resume(&mut self, _size: SurfaceSize) -> bool {
        true
    }
}
