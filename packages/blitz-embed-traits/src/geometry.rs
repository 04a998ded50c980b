//! Units and sizes used across the embedding boundary.

use euclid::{Size2D, Transform2D};

/// Physical pixels of the render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePixel;

/// Size of a render target. Signed because hosts hand us whatever their toolkit reports,
/// including zero and negative sizes while a view is being laid out.
pub type SurfaceSize = Size2D<i32, DevicePixel>;

/// Transform from layer space into the render target.
pub type WorldTransform = Transform2D<f32, DevicePixel, DevicePixel>;

/// Returns true when both dimensions are strictly positive.
pub fn has_area(size: SurfaceSize) -> bool {
    size.width > 0 && size.height > 0
}

/// Orientation of the embedding view relative to the layer tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ScreenRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl ScreenRotation {
    pub fn degrees(self) -> u32 {
        match self {
            ScreenRotation::Rotation0 => 0,
            ScreenRotation::Rotation90 => 90,
            ScreenRotation::Rotation180 => 180,
            ScreenRotation::Rotation270 => 270,
        }
    }

    /// World transform rotating content clockwise about the centre of a target of `size`.
    ///
    /// Built from exact matrix entries so quarter turns stay integral.
    pub fn world_transform(self, size: SurfaceSize) -> WorldTransform {
        let cx = size.width as f32 / 2.0;
        let cy = size.height as f32 / 2.0;
        match self {
            ScreenRotation::Rotation0 => Transform2D::identity(),
            ScreenRotation::Rotation90 => Transform2D::new(0.0, 1.0, -1.0, 0.0, cx + cy, cy - cx),
            ScreenRotation::Rotation180 => {
                Transform2D::new(-1.0, 0.0, 0.0, -1.0, 2.0 * cx, 2.0 * cy)
            }
            ScreenRotation::Rotation270 => Transform2D::new(0.0, -1.0, 1.0, 0.0, cx - cy, cx + cy),
        }
    }
}
