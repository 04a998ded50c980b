//! The graphics-context boundary.
//!
//! A [`GraphicsContext`] is whatever the windowing layer renders into: an off-screen GL/EGL
//! context with a screen buffer, a swapchain, or a plain CPU buffer. The embedding core only
//! needs the handful of queries below to decide how to share the finished picture.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use crate::geometry::SurfaceSize;
use crate::paint::DrawTarget;

bitflags::bitflags! {
    /// Capabilities reported by a graphics context.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContextCaps: u32 {
        /// Finished frames can be exported as a platform image handle (EGLImage, DXGI shared
        /// handle, IOSurface, dmabuf) without a CPU copy.
        const IMAGE_EXPORT = 1 << 0;
        /// Rows are stored bottom-up (GL convention).
        const ORIGIN_BOTTOM_LEFT = 1 << 1;
        /// Colour channels are premultiplied by alpha.
        const PREMULTIPLIED_ALPHA = 1 << 2;
    }
}

bitflags::bitflags! {
    /// How a consumer must interpret shared surface contents.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureFlags: u32 {
        const ORIGIN_BOTTOM_LEFT = 1 << 0;
        const NON_PREMULTIPLIED = 1 << 1;
    }
}

/// How published frames are shared with the consumer.
///
/// Chosen once when an off-screen context is set up and fixed for that context's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceStrategy {
    /// Frames are exported as platform image handles.
    DirectImageShare(TextureFlags),
    /// Frames are copied through a texture shared with the consumer's context.
    TextureCopyShare(TextureFlags),
}

impl SurfaceStrategy {
    pub fn flags(self) -> TextureFlags {
        match self {
            SurfaceStrategy::DirectImageShare(flags) | SurfaceStrategy::TextureCopyShare(flags) => {
                flags
            }
        }
    }

    pub fn is_direct(self) -> bool {
        matches!(self, SurfaceStrategy::DirectImageShare(_))
    }

    pub fn name(self) -> &'static str {
        match self {
            SurfaceStrategy::DirectImageShare(_) => "direct-image",
            SurfaceStrategy::TextureCopyShare(_) => "texture-copy",
        }
    }
}

/// Opaque reference to a GPU-resident (or CPU-resident, for headless contexts) image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageHandle(NonZeroU64);

impl ImageHandle {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

impl From<NonZeroU64> for ImageHandle {
    fn from(raw: NonZeroU64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

/// Synchronisation primitive signalled when the producer's GPU work on a surface completes.
pub trait GpuFence: Send + Sync {
    /// Block until the fence is signalled or `timeout` elapses. Returns false on timeout or
    /// device loss.
    fn wait(&self, timeout: Duration) -> bool;
}

/// A frame that has just become the front buffer.
#[derive(Clone)]
pub struct SharedSurface {
    pub handle: ImageHandle,
    pub size: SurfaceSize,
    pub fence: Option<Arc<dyn GpuFence>>,
}

impl fmt::Debug for SharedSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSurface")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .field("fence", &self.fence.is_some())
            .finish()
    }
}

/// The render target side of the windowing/graphics layer.
///
/// All methods are called on the compositor thread, except that the bridge serialises access
/// through its own lock so implementations do not need interior synchronisation.
pub trait GraphicsContext: Send {
    /// Whether this context renders into an off-screen buffer rather than a window surface.
    fn is_offscreen(&self) -> bool;

    /// Size of the off-screen buffer. Meaningless for on-screen contexts.
    fn offscreen_size(&self) -> SurfaceSize;

    /// Reallocate the off-screen buffer. This is expensive (it stalls the GPU), so callers only
    /// resize when the size actually changed. Returns false if the resize failed.
    fn resize_offscreen(&mut self, size: SurfaceSize) -> bool;

    fn make_current(&mut self) -> bool;

    fn is_current(&self) -> bool;

    fn capabilities(&self) -> ContextCaps;

    /// Switch the screen buffer over to producing surfaces shareable with `strategy`.
    fn configure_sharing(&mut self, strategy: SurfaceStrategy);

    /// Swap the back buffer to the front and describe the new front buffer.
    ///
    /// Returns `None` if there was nothing to swap.
    fn publish_frame(&mut self) -> Option<SharedSurface>;

    /// CPU-addressable view of the back buffer, for contexts that have one.
    fn default_target(&mut self) -> Option<DrawTarget<'_>> {
        None
    }

    /// Propagate a new surface size to the native (on-screen) surface.
    fn resize_native_surface(&mut self, _size: SurfaceSize) {}
}
