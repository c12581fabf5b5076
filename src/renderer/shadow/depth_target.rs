//! Shadow map depth attachment
//!
//! A depth-only texture the depth pass renders into and the lit pass samples
//! through a comparison sampler. There is no colour attachment.

use super::{FilterMode, ShadowError};
use crate::context::WgpuContext;
use crate::core::texture::DepthTexture;

/// Depth texture plus the sampler the lit pass reads it with.
pub struct DepthAttachment {
    pub texture: DepthTexture,
    pub sampler: wgpu::Sampler,
    pub filter: FilterMode,
}

impl DepthAttachment {
    pub fn resolution(&self) -> u32 {
        self.texture.size().0
    }
}

/// The single depth target of the shadow-casting light.
#[derive(Default)]
pub struct DepthTarget {
    attachment: Option<DepthAttachment>,
    generation: u64,
}

impl DepthTarget {
    /// An empty target. Nothing can be rendered until [`DepthTarget::allocate`]
    /// succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a target right away.
    pub fn with_resolution(
        ctx: &WgpuContext,
        resolution: u32,
        filter: FilterMode,
    ) -> Result<Self, ShadowError> {
        let mut target = Self::new();
        target.allocate(ctx, resolution, filter)?;
        Ok(target)
    }

    /// (Re)create the depth texture and sampler.
    ///
    /// On error the previous attachment stays in place. On success the
    /// previous texture is destroyed and the generation advances, so bind
    /// groups referencing the old view must be rebuilt.
    pub fn allocate(
        &mut self,
        ctx: &WgpuContext,
        resolution: u32,
        filter: FilterMode,
    ) -> Result<(), ShadowError> {
        check_resolution(resolution, ctx.max_texture_dimension())?;
        let attachment = create_attachment(ctx, resolution, filter)?;

        let previous = self.attachment.replace(attachment);
        if let Some(previous) = previous {
            previous.texture.destroy();
        }
        self.generation += 1;

        tracing::info!(
            "Allocated {}x{} shadow map ({} filtering, generation {})",
            resolution,
            resolution,
            filter,
            self.generation
        );
        Ok(())
    }

    /// The attachment, or `IncompleteFramebuffer` when nothing is allocated.
    pub fn attachment(&self) -> Result<&DepthAttachment, ShadowError> {
        self.attachment
            .as_ref()
            .ok_or(ShadowError::IncompleteFramebuffer)
    }

    pub fn is_complete(&self) -> bool {
        self.attachment.is_some()
    }

    /// Incremented on every successful allocation.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Create the texture and sampler, reporting driver and out-of-memory
/// failures as `ResourceAllocation` instead of a device error.
fn create_attachment(
    ctx: &WgpuContext,
    resolution: u32,
    filter: FilterMode,
) -> Result<DepthAttachment, ShadowError> {
    let created = ctx.capture_errors(|device| {
        let texture = DepthTexture::new(ctx, resolution, resolution, "shadow depth texture");
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow comparison sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter.to_wgpu(),
            min_filter: filter.to_wgpu(),
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        DepthAttachment {
            texture,
            sampler,
            filter,
        }
    });

    created.map_err(|e| {
        tracing::warn!("Shadow map allocation of {}x{} failed: {}", resolution, resolution, e);
        ShadowError::ResourceAllocation {
            requested: resolution,
            limit: ctx.max_texture_dimension(),
        }
    })
}

/// Validate a requested shadow map edge against the device limit.
pub fn check_resolution(resolution: u32, limit: u32) -> Result<(), ShadowError> {
    if resolution == 0 {
        return Err(ShadowError::InvalidResolution(resolution));
    }
    if resolution > limit {
        return Err(ShadowError::ResourceAllocation {
            requested: resolution,
            limit,
        });
    }
    Ok(())
}
