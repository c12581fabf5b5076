//! Light projection
//!
//! The depth range between `near` and `far` is spread over the whole depth
//! buffer, so `near` should be as large and `far` as small as the scene
//! allows. Wasted range shows up as shadow acne and as depth values clamped
//! to the far plane.

use super::ClipConvention;
use glam::Mat4;

/// Right-handed perspective projection for the given clip convention.
pub fn projection_matrix(
    fov_y_degrees: f32,
    aspect: f32,
    near: f32,
    far: f32,
    convention: ClipConvention,
) -> Mat4 {
    let fov = fov_y_degrees.to_radians();
    match convention {
        ClipConvention::OpenGl => Mat4::perspective_rh_gl(fov, aspect, near, far),
        ClipConvention::Wgpu => Mat4::perspective_rh(fov, aspect, near, far),
    }
}

/// Perspective frustum of the shadow-casting light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightProjection {
    pub fov_y_degrees: f32,
    /// 1.0 for a square shadow map.
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl LightProjection {
    pub fn new(fov_y_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y_degrees,
            aspect: 1.0,
            near,
            far,
        }
    }

    pub fn matrix(&self, convention: ClipConvention) -> Mat4 {
        projection_matrix(self.fov_y_degrees, self.aspect, self.near, self.far, convention)
    }
}

impl Default for LightProjection {
    fn default() -> Self {
        Self::new(90.0, 1.0, 60.0)
    }
}
