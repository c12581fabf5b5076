//! Shadow mapping module
//!
//! Two-pass shadow mapping for a single light: the depth pass renders the
//! scene from the light into a depth texture, the lit pass projects every
//! fragment into that texture and filters the comparison with a 3x3 PCF
//! kernel.

mod config;
mod depth_target;
mod error;
mod light_view;
mod matrix;
mod pcf;
mod pipeline;
mod projection;

pub use config::{
    AppliedChanges, ConfigChange, FilterMode, LightingSettings, ShadowMapConfig, ShadowSettings,
    MAX_BIAS, MAX_EXPOSURE, MAX_PCF_OFFSET, MAX_RESOLUTION, MIN_EXPOSURE, MIN_RESOLUTION,
};
pub use depth_target::{check_resolution, DepthAttachment, DepthTarget};
pub use error::ShadowError;
pub use light_view::LightView;
pub use matrix::{bias_matrix, compose_shadow_matrix, project_to_shadow_map, ClipConvention};
pub use pcf::{PcfKernel, ShadowDepthMap};
pub use pipeline::{DepthPassState, FrameOutcome, LitPassState, ShadowPipeline};
pub use projection::{projection_matrix, LightProjection};

use glam::{Mat4, Vec3};

/// The shadow-casting point light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowLight {
    pub view: LightView,
    pub projection: LightProjection,
    /// Linear RGB colour of the light.
    pub color: Vec3,
}

impl ShadowLight {
    pub fn new(view: LightView, projection: LightProjection) -> Self {
        Self {
            view,
            projection,
            color: Vec3::ONE,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.view.position()
    }

    /// Unbiased light view-projection used by the depth pass.
    pub fn view_projection(&self, convention: ClipConvention) -> Mat4 {
        self.projection.matrix(convention) * self.view.view_matrix()
    }

    /// World to shadow-map texture space, used by the lit pass.
    pub fn shadow_matrix(&self, convention: ClipConvention) -> Mat4 {
        compose_shadow_matrix(
            self.view.view_matrix(),
            self.projection.matrix(convention),
            convention,
        )
    }
}

impl Default for ShadowLight {
    fn default() -> Self {
        Self::new(LightView::default(), LightProjection::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_matrix_is_biased_view_projection() {
        let light = ShadowLight::default();
        for convention in [ClipConvention::OpenGl, ClipConvention::Wgpu] {
            let expected = bias_matrix(convention) * light.view_projection(convention);
            assert!(light.shadow_matrix(convention).abs_diff_eq(expected, 1e-6));
        }
    }

    #[test]
    fn test_scene_origin_projects_into_map() {
        let light = ShadowLight::default();
        let p = project_to_shadow_map(light.shadow_matrix(ClipConvention::Wgpu), Vec3::ZERO);
        assert!((p.x - 0.5).abs() < 1e-5);
        assert!((p.y - 0.5).abs() < 1e-5);
        assert!(p.z > 0.0 && p.z < 1.0);
    }
}
