//! Percentage-closer filtering
//!
//! [`PcfKernel`] produces the 3x3 sample pattern shared with the lit shader.
//! [`ShadowDepthMap`] is a CPU depth image that reproduces the depth pass
//! (including rasterizer depth bias) and both comparison sampling modes, so
//! visibility can be evaluated and tested without a GPU.

use super::FilterMode;
use crate::core::render_states::DepthBias;
use glam::{Vec2, Vec3, Vec4};

/// 3x3 percentage-closer filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcfKernel {
    /// Sample spacing in texels.
    pub offset: f32,
}

impl PcfKernel {
    pub fn new(offset: f32) -> Self {
        Self { offset }
    }

    /// Offsets `(i, j) * offset * texel_size` for i, j in -1..=1, row by row.
    pub fn sample_offsets(&self, texel_size: f32) -> [Vec2; 9] {
        let step = self.offset * texel_size;
        let mut offsets = [Vec2::ZERO; 9];
        for (k, offset) in offsets.iter_mut().enumerate() {
            let i = (k % 3) as f32 - 1.0;
            let j = (k / 3) as f32 - 1.0;
            *offset = Vec2::new(i, j) * step;
        }
        offsets
    }

    /// Fraction of the nine samples that see the light, for a homogeneous
    /// shadow-map coordinate as produced by the shadow matrix.
    ///
    /// Points projecting outside the shadow map are lit.
    pub fn visibility(&self, map: &ShadowDepthMap, light_coord: Vec4, filter: FilterMode) -> f32 {
        if light_coord.w <= 0.0 {
            return 1.0;
        }
        let p = light_coord.truncate() / light_coord.w;
        if !is_inside_map(p) {
            return 1.0;
        }

        let lit: f32 = self
            .sample_offsets(map.texel_size())
            .iter()
            .map(|offset| map.sample_compare(p.truncate() + *offset, p.z, filter))
            .sum();
        lit / 9.0
    }
}

impl Default for PcfKernel {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn is_inside_map(p: Vec3) -> bool {
    p.cmpge(Vec3::ZERO).all() && p.cmple(Vec3::ONE).all()
}

/// Square depth image, row-major, texel (0, 0) at uv (0, 0).
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowDepthMap {
    resolution: u32,
    depths: Vec<f32>,
}

impl ShadowDepthMap {
    /// Map cleared to `depth`.
    pub fn new(resolution: u32, depth: f32) -> Self {
        let resolution = resolution.max(1);
        Self {
            resolution,
            depths: vec![depth; (resolution * resolution) as usize],
        }
    }

    /// Map filled from texel coordinates.
    pub fn from_fn(resolution: u32, mut depth: impl FnMut(u32, u32) -> f32) -> Self {
        let resolution = resolution.max(1);
        let mut depths = Vec::with_capacity((resolution * resolution) as usize);
        for y in 0..resolution {
            for x in 0..resolution {
                depths.push(depth(x, y));
            }
        }
        Self { resolution, depths }
    }

    /// Run the depth pass over a surface whose depth at each uv is given by
    /// `depth`, sampled at texel centres.
    ///
    /// The bias adds `factor * max_slope + units * r` per texel, where
    /// `max_slope` is the depth change to the next texel along x or y. Stored
    /// values are clamped to [0, 1] like a depth attachment.
    pub fn rasterize(resolution: u32, depth: impl Fn(Vec2) -> f32, bias: DepthBias) -> Self {
        let resolution = resolution.max(1);
        let texel = 1.0 / resolution as f32;
        Self::from_fn(resolution, |x, y| {
            let uv = Vec2::new((x as f32 + 0.5) * texel, (y as f32 + 0.5) * texel);
            let d = depth(uv);
            let max_slope = if bias.factor != 0.0 {
                let dx = depth(uv + Vec2::new(texel, 0.0)) - d;
                let dy = depth(uv + Vec2::new(0.0, texel)) - d;
                dx.abs().max(dy.abs())
            } else {
                0.0
            };
            (d + bias.offset(max_slope, d)).clamp(0.0, 1.0)
        })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn texel_size(&self) -> f32 {
        1.0 / self.resolution as f32
    }

    /// Stored depth of a texel, clamped to the edge.
    pub fn get(&self, x: i64, y: i64) -> f32 {
        let max = self.resolution as i64 - 1;
        let x = x.clamp(0, max) as usize;
        let y = y.clamp(0, max) as usize;
        self.depths[y * self.resolution as usize + x]
    }

    /// Comparison sample: 1.0 where `depth <= stored`, 0.0 otherwise.
    ///
    /// `Linear` blends the four surrounding comparison results bilinearly,
    /// the way a filtering comparison sampler does.
    pub fn sample_compare(&self, uv: Vec2, depth: f32, filter: FilterMode) -> f32 {
        let res = self.resolution as f32;
        let lit = |x: i64, y: i64| if depth <= self.get(x, y) { 1.0 } else { 0.0 };
        match filter {
            FilterMode::Nearest => {
                let texel = (uv * res).floor();
                lit(texel.x as i64, texel.y as i64)
            }
            FilterMode::Linear => {
                let pos = uv * res - 0.5;
                let base = pos.floor();
                let f = pos - base;
                let (x, y) = (base.x as i64, base.y as i64);
                let mix = |a: f32, b: f32, t: f32| a + (b - a) * t;
                let top = mix(lit(x, y), lit(x + 1, y), f.x);
                let bottom = mix(lit(x, y + 1), lit(x + 1, y + 1), f.x);
                mix(top, bottom, f.y)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel_center(resolution: u32, x: u32, y: u32) -> Vec2 {
        Vec2::new(x as f32 + 0.5, y as f32 + 0.5) / resolution as f32
    }

    #[test]
    fn test_sample_offsets() {
        let offsets = PcfKernel::new(2.0).sample_offsets(0.25);
        assert_eq!(offsets[0], Vec2::new(-0.5, -0.5));
        assert_eq!(offsets[4], Vec2::ZERO);
        assert_eq!(offsets[8], Vec2::new(0.5, 0.5));
        assert_eq!(PcfKernel::new(0.0).sample_offsets(0.25), [Vec2::ZERO; 9]);
    }

    #[test]
    fn test_center_occluder_gives_eight_ninths() {
        let map = ShadowDepthMap::from_fn(8, |x, y| if (x, y) == (4, 4) { 0.1 } else { 1.0 });
        let uv = texel_center(8, 4, 4);
        let coord = Vec4::new(uv.x, uv.y, 0.5, 1.0);
        let visibility = PcfKernel::new(1.0).visibility(&map, coord, FilterMode::Nearest);
        assert!((visibility - 8.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_homogeneous_coordinate_is_divided() {
        let map = ShadowDepthMap::new(4, 0.2);
        let coord = Vec4::new(1.0, 1.0, 1.0, 2.0);
        assert_eq!(
            PcfKernel::default().visibility(&map, coord, FilterMode::Linear),
            0.0
        );
    }

    #[test]
    fn test_outside_map_is_lit() {
        let map = ShadowDepthMap::new(4, 0.0);
        let kernel = PcfKernel::default();
        for coord in [
            Vec4::new(-0.1, 0.5, 0.5, 1.0),
            Vec4::new(0.5, 1.2, 0.5, 1.0),
            Vec4::new(0.5, 0.5, 1.5, 1.0),
            Vec4::new(0.5, 0.5, 0.5, -1.0),
        ] {
            assert_eq!(kernel.visibility(&map, coord, FilterMode::Nearest), 1.0);
        }
    }

    #[test]
    fn test_linear_blends_comparisons() {
        let map = ShadowDepthMap::from_fn(2, |x, _| if x == 0 { 0.0 } else { 1.0 });
        // Halfway between the two texel centres.
        let visibility = map.sample_compare(Vec2::new(0.5, 0.25), 0.5, FilterMode::Linear);
        assert!((visibility - 0.5).abs() < 1e-6);
        assert_eq!(
            map.sample_compare(Vec2::new(0.5, 0.25), 0.5, FilterMode::Nearest),
            1.0
        );
    }

    /// Fraction of receiver points on the tilted surface that shadow
    /// themselves when the surface is its own occluder.
    fn self_shadowed_fraction(bias: DepthBias) -> f32 {
        let resolution = 64;
        let surface = |uv: Vec2| 0.3 + 0.4 * uv.x;
        let map = ShadowDepthMap::rasterize(resolution, surface, bias);
        let kernel = PcfKernel::new(0.0);

        let samples = 257;
        let mut shadowed = 0;
        for sy in 0..samples {
            for sx in 0..samples {
                let uv = Vec2::new(sx as f32 + 0.37, sy as f32 + 0.61) / samples as f32;
                let coord = Vec4::new(uv.x, uv.y, surface(uv), 1.0);
                if kernel.visibility(&map, coord, FilterMode::Nearest) < 1.0 {
                    shadowed += 1;
                }
            }
        }
        shadowed as f32 / (samples * samples) as f32
    }

    #[test]
    fn test_zero_bias_on_tilted_surface_produces_acne() {
        let fraction = self_shadowed_fraction(DepthBias::NONE);
        assert!(fraction > 0.3, "expected acne, got {fraction}");
    }

    #[test]
    fn test_slope_bias_resolves_acne() {
        assert_eq!(self_shadowed_fraction(DepthBias::new(1.5, 0.0)), 0.0);
    }

    #[test]
    fn test_flat_surface_facing_light_is_lit() {
        let surface = |_: Vec2| 0.5;
        for bias in [DepthBias::new(2.0, 0.0), DepthBias::new(0.0, 2.0)] {
            let map = ShadowDepthMap::rasterize(32, surface, bias);
            for (x, y) in [(0, 0), (5, 17), (31, 31)] {
                let uv = texel_center(32, x, y);
                let coord = Vec4::new(uv.x, uv.y, 0.5, 1.0);
                let visibility = PcfKernel::default().visibility(&map, coord, FilterMode::Linear);
                assert_eq!(visibility, 1.0);
            }
        }
    }

    #[test]
    fn test_constant_bias_uses_resolvable_step() {
        let map = ShadowDepthMap::rasterize(4, |_| 0.5, DepthBias::new(0.0, 4.0));
        let expected = 0.5 + 4.0 * DepthBias::resolvable_step(0.5);
        assert_eq!(map.get(2, 2), expected);
    }

    /// Summed visibility error against the analytic shadow of a disc
    /// occluder over a flat receiver.
    fn disc_shadow_error(resolution: u32) -> (f32, f32, f32) {
        let occluder = |uv: Vec2| {
            if (uv - Vec2::splat(0.5)).length() < 0.2 {
                0.3
            } else {
                0.9
            }
        };
        let map = ShadowDepthMap::rasterize(resolution, occluder, DepthBias::NONE);
        let kernel = PcfKernel::new(1.0);

        let samples = 300;
        let (mut error, mut min, mut max) = (0.0f32, f32::MAX, f32::MIN);
        for sy in 0..samples {
            for sx in 0..samples {
                let uv = Vec2::new(sx as f32 + 0.5, sy as f32 + 0.5) / samples as f32;
                let visibility =
                    kernel.visibility(&map, Vec4::new(uv.x, uv.y, 0.6, 1.0), FilterMode::Linear);
                let truth = if (uv - Vec2::splat(0.5)).length() < 0.2 {
                    0.0
                } else {
                    1.0
                };
                error += (visibility - truth).abs();
                min = min.min(visibility);
                max = max.max(visibility);
            }
        }
        (error, min, max)
    }

    #[test]
    fn test_lower_resolution_is_blockier_but_bounded() {
        let (fine_error, fine_min, fine_max) = disc_shadow_error(2048);
        let (coarse_error, coarse_min, coarse_max) = disc_shadow_error(256);
        assert!(coarse_error > fine_error);
        for value in [fine_min, fine_max, coarse_min, coarse_max] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert_eq!(coarse_min, 0.0);
        assert_eq!(coarse_max, 1.0);
    }
}
