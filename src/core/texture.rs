//! Depth texture abstraction
//!
//! Used both for the screen depth buffer and for shadow map attachments.

use crate::context::WgpuContext;

/// A depth texture usable as a render attachment and as a sampled texture.
pub struct DepthTexture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) size: wgpu::Extent3d,
    label: String,
}

impl DepthTexture {
    /// The depth format used by this texture.
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a new depth texture.
    pub fn new(ctx: &WgpuContext, width: u32, height: u32, label: &str) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });

        Self {
            texture,
            view,
            size,
            label: label.to_string(),
        }
    }

    /// Recreate the texture if the size changed.
    pub fn resize(&mut self, ctx: &WgpuContext, width: u32, height: u32) {
        if self.size.width != width || self.size.height != height {
            let label = std::mem::take(&mut self.label);
            let old = std::mem::replace(self, Self::new(ctx, width, height, &label));
            old.destroy();
        }
    }

    /// Release the GPU memory now instead of when the last reference drops.
    pub fn destroy(self) {
        self.texture.destroy();
    }

    /// Get the texture view.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Get the texture size.
    pub fn size(&self) -> (u32, u32) {
        (self.size.width, self.size.height)
    }
}
