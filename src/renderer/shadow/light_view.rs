//! Light-space camera
//!
//! The shadow-casting light is modelled as a camera: a position and an
//! orthonormal basis (u right, v up, w backward) from which the view matrix
//! of the depth pass is built.

use super::ShadowError;
use glam::{Mat4, Vec3, Vec4};

/// Position and orientation of the shadow-casting light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightView {
    position: Vec3,
    u: Vec3,
    v: Vec3,
    w: Vec3,
}

impl LightView {
    /// Light at `position` looking at `target`.
    ///
    /// `up` must not be parallel to `position - target`; the basis is
    /// undefined otherwise. Use [`LightView::try_orient`] for untrusted input.
    pub fn orient(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let w = (position - target).normalize();
        let u = up.cross(w).normalize();
        let v = w.cross(u).normalize();
        Self { position, u, v, w }
    }

    /// Checked variant of [`LightView::orient`].
    pub fn try_orient(position: Vec3, target: Vec3, up: Vec3) -> Result<Self, ShadowError> {
        let forward = position - target;
        let side = up.cross(forward);
        if forward.length_squared() <= f32::EPSILON
            || side.length_squared() <= f32::EPSILON * forward.length_squared() * up.length_squared()
        {
            return Err(ShadowError::DegenerateOrientation);
        }
        Ok(Self::orient(position, target, up))
    }

    /// Re-orient in place.
    pub fn reorient(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        *self = Self::orient(position, target, up);
    }

    /// World-space position of the light.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Basis vectors (u, v, w).
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        (self.u, self.v, self.w)
    }

    /// World to light-eye transform: rows u, v, w after translating by
    /// `-position`.
    pub fn view_matrix(&self) -> Mat4 {
        let rotation = Mat4::from_cols(
            Vec4::new(self.u.x, self.v.x, self.w.x, 0.0),
            Vec4::new(self.u.y, self.v.y, self.w.y, 0.0),
            Vec4::new(self.u.z, self.v.z, self.w.z, 0.0),
            Vec4::W,
        );
        rotation * Mat4::from_translation(-self.position)
    }
}

impl Default for LightView {
    fn default() -> Self {
        Self::orient(Vec3::new(0.0, 15.0, -5.0), Vec3::ZERO, Vec3::Y)
    }
}
