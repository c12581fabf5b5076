//! Render pipeline builder
//!
//! Provides a builder pattern for creating wgpu render pipelines.

use crate::context::WgpuContext;
use crate::core::render_states::{CullState, DepthState};
use crate::core::texture::DepthTexture;

/// Builder for creating render pipelines.
pub struct PipelineBuilder<'a> {
    ctx: &'a WgpuContext,
    label: Option<&'a str>,
    shader_source: Option<&'a str>,
    vertex_entry: &'a str,
    fragment_entry: &'a str,
    vertex_layouts: Vec<wgpu::VertexBufferLayout<'a>>,
    bind_group_layouts: Vec<&'a wgpu::BindGroupLayout>,
    color_format: wgpu::TextureFormat,
    depth_state: DepthState,
    cull_state: CullState,
}

impl<'a> PipelineBuilder<'a> {
    /// Create a new pipeline builder.
    pub fn new(ctx: &'a WgpuContext) -> Self {
        Self {
            ctx,
            label: None,
            shader_source: None,
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
            vertex_layouts: Vec::new(),
            bind_group_layouts: Vec::new(),
            color_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            depth_state: DepthState::default(),
            cull_state: CullState::None,
        }
    }

    /// Set the pipeline label.
    pub fn label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    /// Set the shader source (WGSL).
    pub fn shader(mut self, source: &'a str) -> Self {
        self.shader_source = Some(source);
        self
    }

    /// Add a vertex buffer layout.
    pub fn vertex_layout(mut self, layout: wgpu::VertexBufferLayout<'a>) -> Self {
        self.vertex_layouts.push(layout);
        self
    }

    /// Add a bind group layout.
    pub fn bind_group_layout(mut self, layout: &'a wgpu::BindGroupLayout) -> Self {
        self.bind_group_layouts.push(layout);
        self
    }

    /// Set the color target format.
    pub fn color_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    /// Set the depth test state, including any rasterizer depth bias.
    pub fn depth(mut self, state: DepthState) -> Self {
        self.depth_state = state;
        self
    }

    /// Set the cull state.
    pub fn cull(mut self, state: CullState) -> Self {
        self.cull_state = state;
        self
    }

    fn layout_and_module(
        &self,
        device: &wgpu::Device,
        shader_source: &str,
    ) -> (wgpu::PipelineLayout, wgpu::ShaderModule) {
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: self.label,
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: self.label,
            bind_group_layouts: &self.bind_group_layouts,
            immediate_size: 0,
        });

        (pipeline_layout, shader_module)
    }

    fn shader_source(&self) -> anyhow::Result<&'a str> {
        self.shader_source
            .ok_or_else(|| anyhow::anyhow!("Shader source is required"))
    }

    /// Create GPU objects with `create`, turning captured wgpu errors into
    /// an `Err` instead of a panic.
    fn create<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> anyhow::Result<T> {
        self.ctx.capture_errors(create).map_err(|e| {
            anyhow::anyhow!(
                "Failed to build pipeline '{}': {}",
                self.label.unwrap_or("unnamed"),
                e
            )
        })
    }

    fn primitive(&self) -> wgpu::PrimitiveState {
        wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: self.cull_state.to_wgpu(),
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        }
    }

    /// Build a depth-only render pipeline with no fragment stage.
    /// Used for shadow map generation.
    pub fn build_depth_only(self) -> anyhow::Result<wgpu::RenderPipeline> {
        let shader_source = self.shader_source()?;
        self.create(|device| {
            let (pipeline_layout, shader_module) = self.layout_and_module(device, shader_source);
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: self.label,
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader_module,
                    entry_point: Some(self.vertex_entry),
                    buffers: &self.vertex_layouts,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: None,
                primitive: self.primitive(),
                depth_stencil: Some(self.depth_state.to_wgpu(DepthTexture::FORMAT)),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })
    }

    /// Build the render pipeline.
    pub fn build(self) -> anyhow::Result<wgpu::RenderPipeline> {
        let shader_source = self.shader_source()?;
        self.create(|device| {
            let (pipeline_layout, shader_module) = self.layout_and_module(device, shader_source);
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: self.label,
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader_module,
                    entry_point: Some(self.vertex_entry),
                    buffers: &self.vertex_layouts,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader_module,
                    entry_point: Some(self.fragment_entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.color_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: self.primitive(),
                depth_stencil: Some(self.depth_state.to_wgpu(DepthTexture::FORMAT)),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITION_ONLY: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    return vec4<f32>(f32(index), 0.0, 0.0, 1.0);
}
"#;

    #[test]
    fn test_depth_only_pipeline_builds() {
        let Ok(ctx) = WgpuContext::new_blocking(None) else {
            return;
        };
        let pipeline = PipelineBuilder::new(&ctx)
            .label("depth only")
            .shader(POSITION_ONLY)
            .build_depth_only();
        assert!(pipeline.is_ok());
    }

    #[test]
    fn test_invalid_shader_is_an_error() {
        let Ok(ctx) = WgpuContext::new_blocking(None) else {
            return;
        };
        let result = PipelineBuilder::new(&ctx)
            .label("broken")
            .shader("@vertex fn vs_main( -> {")
            .build_depth_only();
        let message = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains("broken"), "{message}");

        // Missing fragment entry point in an otherwise valid module.
        let result = PipelineBuilder::new(&ctx)
            .label("no fragment")
            .shader(POSITION_ONLY)
            .build();
        assert!(result.is_err());

        // The device is still usable afterwards.
        let pipeline = PipelineBuilder::new(&ctx)
            .shader(POSITION_ONLY)
            .build_depth_only();
        assert!(pipeline.is_ok());
    }

    #[test]
    fn test_missing_shader_source() {
        let Ok(ctx) = WgpuContext::new_blocking(None) else {
            return;
        };
        assert!(PipelineBuilder::new(&ctx).build_depth_only().is_err());
    }
}
