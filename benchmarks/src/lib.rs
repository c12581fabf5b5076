//! Shared fixtures for the shadow benchmarks.

use glam::{Vec2, Vec3, Vec4};
use umbra::{ClipConvention, DepthBias, ShadowDepthMap, ShadowLight};

/// Depth map of a tilted plane with a square occluder in the middle.
pub fn occluded_plane(resolution: u32, bias: DepthBias) -> ShadowDepthMap {
    ShadowDepthMap::rasterize(
        resolution,
        |uv: Vec2| {
            let centre = (uv - Vec2::splat(0.5)).abs();
            if centre.x < 0.1 && centre.y < 0.1 {
                0.2
            } else {
                0.5 + 0.3 * uv.x
            }
        },
        bias,
    )
}

/// Light-space coordinates of a regular grid of ground points under the
/// default light.
pub fn ground_coords(count: usize) -> Vec<Vec4> {
    let shadow_matrix = ShadowLight::default().shadow_matrix(ClipConvention::Wgpu);
    let side = (count as f32).sqrt().ceil().max(1.0) as usize;
    (0..count)
        .map(|i| {
            let x = (i % side) as f32 / side as f32 * 20.0 - 10.0;
            let z = (i / side) as f32 / side as f32 * 20.0 - 10.0;
            shadow_matrix * Vec3::new(x, 0.0, z).extend(1.0)
        })
        .collect()
}
