//! Render state configurations
//!
//! Provides convenient structs for configuring render pipeline states.

/// Clear state for render targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearState {
    /// Color to clear to (RGBA), or None to not clear.
    pub color: Option<[f32; 4]>,
    /// Depth value to clear to (0.0-1.0), or None to not clear.
    pub depth: Option<f32>,
}

impl ClearState {
    /// Create a clear state that clears depth only.
    pub fn depth(depth: f32) -> Self {
        Self {
            color: None,
            depth: Some(depth),
        }
    }

    /// Create a clear state that clears both color and depth.
    pub fn color_and_depth(color: [f32; 4], depth: f32) -> Self {
        Self {
            color: Some(color),
            depth: Some(depth),
        }
    }

    /// Get the wgpu load operation for color.
    pub fn color_load_op(&self) -> wgpu::LoadOp<wgpu::Color> {
        match self.color {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        }
    }

    /// Get the wgpu load operation for depth.
    pub fn depth_load_op(&self) -> wgpu::LoadOp<f32> {
        match self.depth {
            Some(d) => wgpu::LoadOp::Clear(d),
            None => wgpu::LoadOp::Load,
        }
    }
}

impl Default for ClearState {
    fn default() -> Self {
        Self::color_and_depth([0.0, 0.0, 0.0, 1.0], 1.0)
    }
}

/// Rasterizer depth offset, the wgpu counterpart of polygon offset.
///
/// The offset added to each fragment's depth is
/// `factor * max_slope + units * r`, where `max_slope` is the depth change per
/// pixel across the primitive and `r` the smallest resolvable depth step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthBias {
    /// Slope-scale factor.
    pub factor: f32,
    /// Constant offset in units of the minimum resolvable depth step.
    pub units: f32,
}

impl DepthBias {
    /// No offset.
    pub const NONE: Self = Self {
        factor: 0.0,
        units: 0.0,
    };

    /// Create a new depth bias.
    pub fn new(factor: f32, units: f32) -> Self {
        Self { factor, units }
    }

    /// Whether any offset is applied.
    pub fn is_enabled(&self) -> bool {
        self.factor != 0.0 || self.units != 0.0
    }

    /// Depth offset applied to a fragment of the given slope and depth.
    pub fn offset(&self, max_slope: f32, depth: f32) -> f32 {
        self.factor * max_slope.abs() + self.units * Self::resolvable_step(depth)
    }

    /// Smallest representable depth difference near `depth` for a 32-bit
    /// float depth buffer: `2^(exponent(depth) - 23)`, never below the
    /// smallest normal float.
    pub fn resolvable_step(depth: f32) -> f32 {
        let biased_exponent = ((depth.abs().to_bits() >> 23) & 0xff) as i32;
        f32::from_bits(((biased_exponent - 23).max(1) as u32) << 23)
    }

    /// Convert to wgpu depth bias state. Units are rounded to whole steps.
    pub fn to_wgpu(&self) -> wgpu::DepthBiasState {
        wgpu::DepthBiasState {
            constant: self.units.round() as i32,
            slope_scale: self.factor,
            clamp: 0.0,
        }
    }
}

/// Depth test configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthState {
    /// Whether to write to the depth buffer.
    pub write: bool,
    /// Comparison function for depth test.
    pub compare: wgpu::CompareFunction,
    /// Offset applied while rasterizing.
    pub bias: DepthBias,
}

impl DepthState {
    /// Depth testing enabled with writes.
    pub fn read_write() -> Self {
        Self {
            write: true,
            compare: wgpu::CompareFunction::Less,
            bias: DepthBias::NONE,
        }
    }

    /// Same state with a rasterizer depth offset.
    pub fn with_bias(mut self, bias: DepthBias) -> Self {
        self.bias = bias;
        self
    }

    /// Convert to wgpu depth stencil state.
    pub fn to_wgpu(&self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: self.write,
            depth_compare: self.compare,
            stencil: wgpu::StencilState::default(),
            bias: self.bias.to_wgpu(),
        }
    }
}

impl Default for DepthState {
    fn default() -> Self {
        Self::read_write()
    }
}

/// Cull mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullState {
    /// No culling.
    #[default]
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    Back,
}

impl CullState {
    /// Convert to wgpu cull mode.
    pub fn to_wgpu(&self) -> Option<wgpu::Face> {
        match self {
            CullState::None => None,
            CullState::Front => Some(wgpu::Face::Front),
            CullState::Back => Some(wgpu::Face::Back),
        }
    }
}
