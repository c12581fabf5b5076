//! Shadow map and lighting configuration
//!
//! Input handlers never touch the live configuration. They queue
//! [`ConfigChange`]s on [`ShadowSettings`], which the pipeline folds in at
//! the next frame boundary.

use super::ShadowError;
use crate::core::render_states::{CullState, DepthBias};

/// Smallest shadow map edge accepted.
pub const MIN_RESOLUTION: u32 = 256;
/// Largest shadow map edge accepted.
pub const MAX_RESOLUTION: u32 = 4096;
/// Upper bound of both depth bias parameters.
pub const MAX_BIAS: f32 = 100.0;
/// Upper bound of the PCF sample spacing, in texels.
pub const MAX_PCF_OFFSET: f32 = 3.0;
/// Exposure bounds (2^5 to 2^25).
pub const MIN_EXPOSURE: f32 = 32.0;
pub const MAX_EXPOSURE: f32 = 33_554_432.0;

/// How the lit pass samples the shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Point sampling, compared manually in the shader.
    Nearest,
    /// Hardware bilinear comparison.
    #[default]
    Linear,
}

impl FilterMode {
    pub fn toggled(self) -> Self {
        match self {
            FilterMode::Nearest => FilterMode::Linear,
            FilterMode::Linear => FilterMode::Nearest,
        }
    }

    pub fn to_wgpu(self) -> wgpu::FilterMode {
        match self {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }
}

impl std::fmt::Display for FilterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterMode::Nearest => f.write_str("nearest"),
            FilterMode::Linear => f.write_str("linear"),
        }
    }
}

/// Shadow map configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowMapConfig {
    /// Edge length of the square depth texture.
    pub resolution: u32,
    pub filter: FilterMode,
    /// Offset applied while rasterizing the depth pass.
    pub bias: DepthBias,
    /// Spacing of the 3x3 PCF samples, in texels.
    pub pcf_offset: f32,
    /// Draw only back faces into the depth pass.
    pub cull_front_faces: bool,
}

impl ShadowMapConfig {
    /// Size of one shadow map texel in texture coordinates.
    pub fn texel_size(&self) -> f32 {
        1.0 / self.resolution.max(1) as f32
    }

    /// Cull state of the depth pass.
    pub fn depth_cull(&self) -> CullState {
        if self.cull_front_faces {
            CullState::Front
        } else {
            CullState::None
        }
    }

    /// Apply one change, clamping it to the accepted range.
    ///
    /// A zero resolution is rejected and leaves the config untouched.
    pub fn apply(&mut self, change: ConfigChange) -> Result<(), ShadowError> {
        match change {
            ConfigChange::Resolution(0) => return Err(ShadowError::InvalidResolution(0)),
            ConfigChange::Resolution(resolution) => {
                self.resolution = resolution.clamp(MIN_RESOLUTION, MAX_RESOLUTION)
            }
            ConfigChange::Filter(filter) => self.filter = filter,
            ConfigChange::ToggleFilter => self.filter = self.filter.toggled(),
            ConfigChange::BiasFactor(factor) => self.bias.factor = clamp_finite(factor, MAX_BIAS),
            ConfigChange::BiasUnits(units) => self.bias.units = clamp_finite(units, MAX_BIAS),
            ConfigChange::PcfOffset(offset) => {
                self.pcf_offset = clamp_finite(offset, MAX_PCF_OFFSET)
            }
            ConfigChange::CullFrontFaces(enabled) => self.cull_front_faces = enabled,
            ConfigChange::ToggleCullFrontFaces => self.cull_front_faces = !self.cull_front_faces,
        }
        Ok(())
    }

    /// Whether the depth texture or its sampler must be recreated.
    pub fn needs_realloc(&self, previous: &ShadowMapConfig) -> bool {
        self.resolution != previous.resolution || self.filter != previous.filter
    }

    /// Whether the depth pipeline must be rebuilt.
    pub fn depth_state_changed(&self, previous: &ShadowMapConfig) -> bool {
        self.bias != previous.bias || self.cull_front_faces != previous.cull_front_faces
    }
}

impl Default for ShadowMapConfig {
    fn default() -> Self {
        Self {
            resolution: 2048,
            filter: FilterMode::Linear,
            bias: DepthBias::new(2.0, 2.0),
            pcf_offset: 1.0,
            cull_front_faces: false,
        }
    }
}

fn clamp_finite(value: f32, max: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}

/// A requested configuration change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigChange {
    Resolution(u32),
    Filter(FilterMode),
    ToggleFilter,
    BiasFactor(f32),
    BiasUnits(f32),
    PcfOffset(f32),
    CullFrontFaces(bool),
    ToggleCullFrontFaces,
}

/// Outcome of folding queued changes into the live configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AppliedChanges {
    /// The depth target was recreated.
    pub reallocated: bool,
    /// Bias or culling changed; the depth pipeline must be rebuilt.
    pub depth_state_changed: bool,
    /// The reallocation failed and resolution and filter were rolled back.
    pub rejected: Option<ShadowError>,
}

/// Live shadow configuration plus changes waiting for the next frame.
#[derive(Debug, Clone, Default)]
pub struct ShadowSettings {
    config: ShadowMapConfig,
    pending: Vec<ConfigChange>,
}

impl ShadowSettings {
    pub fn new(config: ShadowMapConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
        }
    }

    /// Configuration currently used for rendering.
    pub fn config(&self) -> &ShadowMapConfig {
        &self.config
    }

    /// Configuration after the queued changes, assuming they all succeed.
    pub fn requested(&self) -> ShadowMapConfig {
        let mut config = self.config;
        for change in &self.pending {
            let _ = config.apply(*change);
        }
        config
    }

    /// Queue a change for the next frame.
    pub fn push(&mut self, change: ConfigChange) {
        self.pending.push(change);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Put the resolution and filter back to what the depth target holds.
    pub(crate) fn restore_target(&mut self, resolution: u32, filter: FilterMode) {
        self.config.resolution = resolution;
        self.config.filter = filter;
    }

    /// Fold queued changes into the live configuration.
    ///
    /// `allocate` is called with the new resolution and filter when either
    /// changed. If it fails, both revert to their previous values while the
    /// other changes still take effect.
    pub fn apply_pending<F>(&mut self, allocate: F) -> AppliedChanges
    where
        F: FnOnce(u32, FilterMode) -> Result<(), ShadowError>,
    {
        let mut applied = AppliedChanges::default();
        if self.pending.is_empty() {
            return applied;
        }

        let previous = self.config;
        let mut candidate = previous;
        for change in self.pending.drain(..) {
            if let Err(e) = candidate.apply(change) {
                tracing::warn!("Rejected shadow change {:?}: {}", change, e);
            }
        }

        if candidate.needs_realloc(&previous) {
            match allocate(candidate.resolution, candidate.filter) {
                Ok(()) => applied.reallocated = true,
                Err(e) => {
                    tracing::warn!(
                        "Keeping {}x{} shadow map: {}",
                        previous.resolution,
                        previous.resolution,
                        e
                    );
                    candidate.resolution = previous.resolution;
                    candidate.filter = previous.filter;
                    applied.rejected = Some(e);
                }
            }
        }

        applied.depth_state_changed = candidate.depth_state_changed(&previous);
        self.config = candidate;
        applied
    }
}

/// Lighting parameters of the lit pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingSettings {
    /// Scales the light's radiance, which falls off with squared distance.
    pub exposure: f32,
    /// Ambient light intensity, multiplied by each material's Ka.
    pub ambient: [f32; 3],
    /// Colour used for back-facing fragments.
    pub back_face_color: [f32; 3],
    /// Background colour of the lit pass.
    pub clear_color: [f32; 4],
}

impl LightingSettings {
    /// Set the exposure, clamped to the accepted range.
    pub fn set_exposure(&mut self, exposure: f32) {
        self.exposure = if exposure.is_finite() {
            exposure.clamp(MIN_EXPOSURE, MAX_EXPOSURE)
        } else {
            MIN_EXPOSURE
        };
    }
}

impl Default for LightingSettings {
    fn default() -> Self {
        Self {
            exposure: 550.0,
            ambient: [0.3, 0.3, 0.3],
            back_face_color: [0.0, 0.7, 0.0],
            clear_color: [0.53, 0.68, 0.82, 1.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_clamps() {
        let mut config = ShadowMapConfig::default();
        config.apply(ConfigChange::Resolution(10_000)).unwrap();
        assert_eq!(config.resolution, MAX_RESOLUTION);
        config.apply(ConfigChange::Resolution(16)).unwrap();
        assert_eq!(config.resolution, MIN_RESOLUTION);
        config.apply(ConfigChange::BiasFactor(-3.0)).unwrap();
        assert_eq!(config.bias.factor, 0.0);
        config.apply(ConfigChange::PcfOffset(9.0)).unwrap();
        assert_eq!(config.pcf_offset, MAX_PCF_OFFSET);
        config.apply(ConfigChange::BiasUnits(f32::NAN)).unwrap();
        assert_eq!(config.bias.units, 0.0);
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let mut config = ShadowMapConfig::default();
        assert_eq!(
            config.apply(ConfigChange::Resolution(0)),
            Err(ShadowError::InvalidResolution(0))
        );
        assert_eq!(config.resolution, 2048);
    }

    #[test]
    fn test_changes_wait_for_frame_boundary() {
        let mut settings = ShadowSettings::default();
        settings.push(ConfigChange::Resolution(512));
        settings.push(ConfigChange::ToggleFilter);
        assert_eq!(settings.config().resolution, 2048);
        assert_eq!(settings.requested().resolution, 512);
        assert_eq!(settings.requested().filter, FilterMode::Nearest);

        let mut calls = Vec::new();
        let applied = settings.apply_pending(|resolution, filter| {
            calls.push((resolution, filter));
            Ok(())
        });
        assert_eq!(calls, vec![(512, FilterMode::Nearest)]);
        assert!(applied.reallocated);
        assert!(!applied.depth_state_changed);
        assert_eq!(settings.config().resolution, 512);
        assert!(!settings.has_pending());
    }

    #[test]
    fn test_failed_allocation_rolls_back() {
        let mut settings = ShadowSettings::default();
        settings.push(ConfigChange::Resolution(4096));
        settings.push(ConfigChange::BiasFactor(5.0));

        let error = ShadowError::ResourceAllocation {
            requested: 4096,
            limit: 2048,
        };
        let applied = settings.apply_pending(|_, _| Err(error));
        assert_eq!(applied.rejected, Some(error));
        assert!(!applied.reallocated);
        assert_eq!(settings.config().resolution, 2048);
        assert_eq!(settings.config().bias.factor, 5.0);
        assert!(applied.depth_state_changed);
    }

    #[test]
    fn test_bias_change_skips_allocation() {
        let mut settings = ShadowSettings::default();
        settings.push(ConfigChange::ToggleCullFrontFaces);
        let applied = settings.apply_pending(|_, _| panic!("no reallocation expected"));
        assert!(applied.depth_state_changed);
        assert!(settings.config().cull_front_faces);
        assert_eq!(settings.config().depth_cull(), CullState::Front);
    }

    #[test]
    fn test_no_pending_is_noop() {
        let mut settings = ShadowSettings::default();
        let applied = settings.apply_pending(|_, _| panic!("no reallocation expected"));
        assert_eq!(applied, AppliedChanges::default());
    }

    #[test]
    fn test_exposure_clamped() {
        let mut lighting = LightingSettings::default();
        lighting.set_exposure(1.0);
        assert_eq!(lighting.exposure, MIN_EXPOSURE);
        lighting.set_exposure(1e12);
        assert_eq!(lighting.exposure, MAX_EXPOSURE);
    }
}
