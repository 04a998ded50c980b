#![cfg_attr(docsrs, feature(doc_cfg))]

//! Interfaces shared between the Blitz embedding layer and the components it sits between.
//!
//! The embedding core (`blitz-embed`) never talks to a GPU API, a layer tree or an event loop
//! directly. Instead it is handed implementations of the traits in this crate:
//!
//! - [`GraphicsContext`]: the render target owned by the windowing/graphics layer
//! - [`LayerCompositor`]: the thing that actually paints the layer tree
//! - [`CompositorThread`]: the task queue of the compositor execution context

pub mod geometry;
pub mod gfx;
pub mod paint;
pub mod thread;

pub use geometry::{DevicePixel, ScreenRotation, SurfaceSize, WorldTransform};
pub use gfx::{
    ContextCaps, GpuFence, GraphicsContext, ImageHandle, SharedSurface, SurfaceStrategy,
    TextureFlags,
};
pub use paint::{DrawTarget, LayerCompositor, PixelFormat, RenderParams};
pub use thread::{CompositorThread, Task};
