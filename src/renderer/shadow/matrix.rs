//! Shadow matrix composition
//!
//! `S = B * P_light * V_light` takes a world-space point to shadow-map
//! texture coordinates with depth in the third component. `B` depends on the
//! clip-space convention of the projection it follows.

use glam::{Mat4, Vec3, Vec4};

/// Clip-space convention of a graphics API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipConvention {
    /// Clip cube [-1, 1]^3, texture v grows upward.
    OpenGl,
    /// Clip volume [-1, 1]^2 x [0, 1], texture v grows downward.
    #[default]
    Wgpu,
}

/// Matrix taking normalized device coordinates to texture space [0, 1]^3.
pub fn bias_matrix(convention: ClipConvention) -> Mat4 {
    match convention {
        ClipConvention::OpenGl => Mat4::from_cols(
            Vec4::new(0.5, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 0.5, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 0.5, 0.0),
            Vec4::new(0.5, 0.5, 0.5, 1.0),
        ),
        ClipConvention::Wgpu => Mat4::from_cols(
            Vec4::new(0.5, 0.0, 0.0, 0.0),
            Vec4::new(0.0, -0.5, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(0.5, 0.5, 0.0, 1.0),
        ),
    }
}

/// `bias * proj * view`.
pub fn compose_shadow_matrix(view: Mat4, proj: Mat4, convention: ClipConvention) -> Mat4 {
    bias_matrix(convention) * proj * view
}

/// Project a world-space point with a shadow matrix, returning
/// `(u, v, depth)` after the perspective divide.
pub fn project_to_shadow_map(shadow_matrix: Mat4, world: Vec3) -> Vec3 {
    let coord = shadow_matrix * world.extend(1.0);
    coord.truncate() / coord.w
}
