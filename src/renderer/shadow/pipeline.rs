//! Two-pass shadow rendering
//!
//! Pass 1 renders depth from the light with the configured rasterizer bias
//! and culling. Pass 2 renders the scene from the viewer, projecting each
//! fragment into the shadow map for PCF visibility.

use super::{
    AppliedChanges, ClipConvention, DepthTarget, LightingSettings, ShadowError, ShadowLight,
    ShadowMapConfig, ShadowSettings,
};
use crate::context::WgpuContext;
use crate::core::buffer::DynamicUniformBuffer;
use crate::core::pipeline::PipelineBuilder;
use crate::core::render_states::{ClearState, CullState, DepthState};
use crate::core::render_target::RenderTarget;
use crate::core::vertex::VertexPNU;
use crate::renderer::geometry::Geometry;
use crate::renderer::scene::DrawItem;
use crate::renderer::viewer::Viewer;
use glam::Mat4;

const DEPTH_SHADER: &str = include_str!("../../shaders/depth.wgsl");
const LIT_SHADER: &str = include_str!("../../shaders/lit.wgsl");

/// Initial number of per-draw uniform slots.
const INITIAL_DRAWS: usize = 64;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct DepthUniform {
    light_view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct FrameUniform {
    view: [[f32; 4]; 4],
    proj: [[f32; 4]; 4],
    shadow_matrix: [[f32; 4]; 4],
    light_eye_pos: [f32; 4],
    light_color: [f32; 4],
    ambient: [f32; 4],
    /// pcf offset, texel size, unused, exposure
    params: [f32; 4],
    back_face_color: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniform {
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
    /// Kd in rgb, shininess in a.
    kd: [f32; 4],
    ks: [f32; 4],
    ka: [f32; 4],
}

impl DrawUniform {
    fn new(item: &DrawItem<'_>) -> Self {
        let material = item.material;
        Self {
            model: item.model.to_cols_array_2d(),
            normal_matrix: normal_matrix(item.model).to_cols_array_2d(),
            kd: material.kd.extend(material.shininess).to_array(),
            ks: material.ks.extend(0.0).to_array(),
            ka: material.ka.extend(0.0).to_array(),
        }
    }
}

/// Inverse transpose of the model matrix, for transforming normals.
fn normal_matrix(model: Mat4) -> Mat4 {
    if model.determinant().abs() <= f32::EPSILON {
        return model;
    }
    model.inverse().transpose()
}

/// Result of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Both passes were recorded.
    Rendered { draws: usize },
    /// Nothing was recorded.
    Skipped(ShadowError),
}

/// Render state of the depth pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthPassState {
    pub clear: ClearState,
    /// Viewport edge, equal to the shadow map resolution.
    pub resolution: u32,
    /// Depth test, write and rasterizer bias.
    pub depth: DepthState,
    pub cull: CullState,
}

impl DepthPassState {
    pub fn from_config(config: &ShadowMapConfig) -> Self {
        Self {
            clear: ClearState::depth(1.0),
            resolution: config.resolution,
            depth: DepthState::read_write().with_bias(config.bias),
            cull: config.depth_cull(),
        }
    }

    /// Whether a pipeline built for `other` can be reused for this state.
    fn same_pipeline(&self, other: &DepthPassState) -> bool {
        self.depth == other.depth && self.cull == other.cull
    }
}

/// Render state of the lit pass: no culling and no bias.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LitPassState {
    pub clear: ClearState,
    pub depth: DepthState,
    pub cull: CullState,
}

impl LitPassState {
    pub fn new(lighting: &LightingSettings) -> Self {
        Self {
            clear: ClearState::color_and_depth(lighting.clear_color, 1.0),
            depth: DepthState::read_write(),
            cull: CullState::None,
        }
    }
}

/// Shadow-mapping renderer for a single light.
pub struct ShadowPipeline {
    convention: ClipConvention,
    config: ShadowMapConfig,
    lighting: LightingSettings,
    depth_target: DepthTarget,

    depth_state: DepthPassState,
    depth_pipeline: wgpu::RenderPipeline,
    depth_layout: wgpu::BindGroupLayout,
    depth_uniforms: DynamicUniformBuffer<DepthUniform>,
    depth_bind_group: wgpu::BindGroup,

    lit_pipeline: wgpu::RenderPipeline,
    frame_layout: wgpu::BindGroupLayout,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: Option<(u64, wgpu::BindGroup)>,
    draw_layout: wgpu::BindGroupLayout,
    draw_uniforms: DynamicUniformBuffer<DrawUniform>,
    draw_bind_group: wgpu::BindGroup,
}

impl ShadowPipeline {
    /// Create the pipeline and allocate the depth target.
    pub fn new(
        ctx: &WgpuContext,
        color_format: wgpu::TextureFormat,
        config: ShadowMapConfig,
        lighting: LightingSettings,
    ) -> anyhow::Result<Self> {
        let depth_target = DepthTarget::with_resolution(ctx, config.resolution, config.filter)?;

        let depth_layout = dynamic_uniform_layout::<DepthUniform>(
            ctx,
            "shadow depth bind group layout",
            wgpu::ShaderStages::VERTEX,
        );
        let depth_state = DepthPassState::from_config(&config);
        let depth_pipeline = build_depth_pipeline(ctx, &depth_layout, &depth_state)?;
        let depth_uniforms = DynamicUniformBuffer::new(ctx, INITIAL_DRAWS, "shadow depth uniforms");
        let depth_bind_group =
            dynamic_bind_group(ctx, &depth_layout, &depth_uniforms, "shadow depth bind group");

        let frame_layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("lit frame bind group layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(
                                std::mem::size_of::<FrameUniform>() as u64,
                            ),
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                        count: None,
                    },
                ],
            });
        let frame_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lit frame uniforms"),
            size: std::mem::size_of::<FrameUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let draw_layout = dynamic_uniform_layout::<DrawUniform>(
            ctx,
            "lit draw bind group layout",
            wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        );
        let draw_uniforms = DynamicUniformBuffer::new(ctx, INITIAL_DRAWS, "lit draw uniforms");
        let draw_bind_group =
            dynamic_bind_group(ctx, &draw_layout, &draw_uniforms, "lit draw bind group");

        let lit_state = LitPassState::new(&lighting);
        let lit_pipeline = PipelineBuilder::new(ctx)
            .label("lit pipeline")
            .shader(LIT_SHADER)
            .vertex_layout(VertexPNU::layout())
            .bind_group_layout(&frame_layout)
            .bind_group_layout(&draw_layout)
            .color_format(color_format)
            .depth(lit_state.depth)
            .cull(lit_state.cull)
            .build()?;

        Ok(Self {
            convention: ClipConvention::Wgpu,
            config,
            lighting,
            depth_target,
            depth_state,
            depth_pipeline,
            depth_layout,
            depth_uniforms,
            depth_bind_group,
            lit_pipeline,
            frame_layout,
            frame_buffer,
            frame_bind_group: None,
            draw_layout,
            draw_uniforms,
            draw_bind_group,
        })
    }

    /// Apply configuration changes queued since the last frame.
    ///
    /// Resolution or filter changes reallocate the depth target; a failed
    /// reallocation keeps the previous target and rolls both back. Bias or
    /// culling changes rebuild the depth pipeline.
    ///
    /// Afterwards the depth target always matches the resolution and filter
    /// in `settings`, even when `settings` did not start from the
    /// configuration this pipeline was created with.
    pub fn begin_frame(
        &mut self,
        ctx: &WgpuContext,
        settings: &mut ShadowSettings,
    ) -> anyhow::Result<AppliedChanges> {
        let depth_target = &mut self.depth_target;
        let mut applied = settings
            .apply_pending(|resolution, filter| depth_target.allocate(ctx, resolution, filter));
        self.reconcile_target(ctx, settings, &mut applied);

        self.config = *settings.config();
        let state = DepthPassState::from_config(&self.config);
        if !state.same_pipeline(&self.depth_state) {
            self.depth_pipeline = build_depth_pipeline(ctx, &self.depth_layout, &state)?;
            tracing::debug!(
                "Rebuilt depth pipeline (factor {}, units {}, cull {:?})",
                self.config.bias.factor,
                self.config.bias.units,
                state.cull
            );
        }
        self.depth_state = state;

        Ok(applied)
    }

    fn reconcile_target(
        &mut self,
        ctx: &WgpuContext,
        settings: &mut ShadowSettings,
        applied: &mut AppliedChanges,
    ) {
        let wanted = *settings.config();
        let current = self
            .depth_target
            .attachment()
            .ok()
            .map(|attachment| (attachment.resolution(), attachment.filter));
        if current == Some((wanted.resolution, wanted.filter)) {
            return;
        }

        match self.depth_target.allocate(ctx, wanted.resolution, wanted.filter) {
            Ok(()) => applied.reallocated = true,
            Err(e) => {
                tracing::warn!(
                    "Shadow map does not match {}x{} {}: {}",
                    wanted.resolution,
                    wanted.resolution,
                    wanted.filter,
                    e
                );
                if let Some((resolution, filter)) = current {
                    settings.restore_target(resolution, filter);
                }
                applied.rejected = Some(e);
            }
        }
    }

    /// Record the depth pass and the lit pass.
    ///
    /// Only meshes in `items` are drawn; the caller filters out meshes that
    /// are not loaded. The frame is skipped when either the shadow depth
    /// target or the screen depth buffer is missing.
    pub fn render(
        &mut self,
        ctx: &WgpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &RenderTarget<'_>,
        viewer: &dyn Viewer,
        light: &ShadowLight,
        items: &[DrawItem<'_>],
    ) -> FrameOutcome {
        if let Err(e) = self.depth_target.attachment() {
            tracing::warn!("Skipping frame: {}", e);
            return FrameOutcome::Skipped(e);
        }
        if target.depth_view.is_none() {
            tracing::warn!("Skipping frame: render target has no depth buffer");
            return FrameOutcome::Skipped(ShadowError::IncompleteFramebuffer);
        }

        self.prepare_bindings(ctx, items.len());
        self.write_uniforms(ctx, viewer, light, items);

        let Ok(attachment) = self.depth_target.attachment() else {
            return FrameOutcome::Skipped(ShadowError::IncompleteFramebuffer);
        };
        let Some((_, frame_bind_group)) = &self.frame_bind_group else {
            return FrameOutcome::Skipped(ShadowError::IncompleteFramebuffer);
        };

        // Pass 1: depth from the light
        {
            let state = &self.depth_state;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow depth pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: attachment.texture.view(),
                    depth_ops: Some(wgpu::Operations {
                        load: state.clear.depth_load_op(),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            let edge = state.resolution as f32;
            pass.set_viewport(0.0, 0.0, edge, edge, 0.0, 1.0);
            pass.set_pipeline(&self.depth_pipeline);
            for (i, item) in items.iter().enumerate() {
                pass.set_bind_group(0, &self.depth_bind_group, &[self.depth_uniforms.offset(i)]);
                item.mesh.draw(&mut pass);
            }
        }

        // Pass 2: lit scene from the viewer
        {
            let state = LitPassState::new(&self.lighting);
            let mut pass = target.begin_render_pass(encoder, state.clear, "lit pass");
            let viewport = viewer.viewport();
            let width = viewport.width.min(target.width.saturating_sub(viewport.x));
            let height = viewport.height.min(target.height.saturating_sub(viewport.y));
            if width > 0 && height > 0 {
                pass.set_viewport(
                    viewport.x as f32,
                    viewport.y as f32,
                    width as f32,
                    height as f32,
                    0.0,
                    1.0,
                );
            }
            pass.set_pipeline(&self.lit_pipeline);
            pass.set_bind_group(0, frame_bind_group, &[]);
            for (i, item) in items.iter().enumerate() {
                pass.set_bind_group(1, &self.draw_bind_group, &[self.draw_uniforms.offset(i)]);
                item.mesh.draw(&mut pass);
            }
        }

        FrameOutcome::Rendered { draws: items.len() }
    }

    /// Grow per-draw buffers and rebind after a depth target reallocation.
    fn prepare_bindings(&mut self, ctx: &WgpuContext, draws: usize) {
        if self.depth_uniforms.reserve(ctx, draws) {
            self.depth_bind_group = dynamic_bind_group(
                ctx,
                &self.depth_layout,
                &self.depth_uniforms,
                "shadow depth bind group",
            );
        }
        if self.draw_uniforms.reserve(ctx, draws) {
            self.draw_bind_group = dynamic_bind_group(
                ctx,
                &self.draw_layout,
                &self.draw_uniforms,
                "lit draw bind group",
            );
        }

        let generation = self.depth_target.generation();
        let stale = !matches!(&self.frame_bind_group, Some((bound, _)) if *bound == generation);
        if !stale {
            return;
        }
        let Ok(attachment) = self.depth_target.attachment() else {
            self.frame_bind_group = None;
            return;
        };
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lit frame bind group"),
            layout: &self.frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.frame_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(attachment.texture.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&attachment.sampler),
                },
            ],
        });
        self.frame_bind_group = Some((generation, bind_group));
    }

    fn write_uniforms(
        &self,
        ctx: &WgpuContext,
        viewer: &dyn Viewer,
        light: &ShadowLight,
        items: &[DrawItem<'_>],
    ) {
        let view = viewer.view_matrix();
        let frame = FrameUniform {
            view: view.to_cols_array_2d(),
            proj: viewer.projection_matrix().to_cols_array_2d(),
            shadow_matrix: light.shadow_matrix(self.convention).to_cols_array_2d(),
            light_eye_pos: view.transform_point3(light.position()).extend(1.0).to_array(),
            light_color: light.color.extend(1.0).to_array(),
            ambient: [
                self.lighting.ambient[0],
                self.lighting.ambient[1],
                self.lighting.ambient[2],
                1.0,
            ],
            params: [
                self.config.pcf_offset,
                self.config.texel_size(),
                0.0,
                self.lighting.exposure,
            ],
            back_face_color: [
                self.lighting.back_face_color[0],
                self.lighting.back_face_color[1],
                self.lighting.back_face_color[2],
                1.0,
            ],
        };
        ctx.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&frame));

        let light_view_proj = light.view_projection(self.convention).to_cols_array_2d();
        let depth: Vec<DepthUniform> = items
            .iter()
            .map(|item| DepthUniform {
                light_view_proj,
                model: item.model.to_cols_array_2d(),
            })
            .collect();
        self.depth_uniforms.write(ctx, &depth);

        let draws: Vec<DrawUniform> = items.iter().map(DrawUniform::new).collect();
        self.draw_uniforms.write(ctx, &draws);
    }

    /// Configuration used for the current frame.
    pub fn config(&self) -> &ShadowMapConfig {
        &self.config
    }

    pub fn lighting(&self) -> &LightingSettings {
        &self.lighting
    }

    pub fn lighting_mut(&mut self) -> &mut LightingSettings {
        &mut self.lighting
    }

    pub fn depth_target(&self) -> &DepthTarget {
        &self.depth_target
    }

    pub fn convention(&self) -> ClipConvention {
        self.convention
    }
}

fn build_depth_pipeline(
    ctx: &WgpuContext,
    layout: &wgpu::BindGroupLayout,
    state: &DepthPassState,
) -> anyhow::Result<wgpu::RenderPipeline> {
    PipelineBuilder::new(ctx)
        .label("shadow depth pipeline")
        .shader(DEPTH_SHADER)
        .vertex_layout(VertexPNU::position_layout())
        .bind_group_layout(layout)
        .depth(state.depth)
        .cull(state.cull)
        .build_depth_only()
}

fn dynamic_uniform_layout<T: bytemuck::Pod>(
    ctx: &WgpuContext,
    label: &str,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayout {
    ctx.device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: DynamicUniformBuffer::<T>::element_size(),
                },
                count: None,
            }],
        })
}

fn dynamic_bind_group<T: bytemuck::Pod>(
    ctx: &WgpuContext,
    layout: &wgpu::BindGroupLayout,
    buffer: &DynamicUniformBuffer<T>,
    label: &str,
) -> wgpu::BindGroup {
    ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.binding(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::render_states::DepthBias;
    use crate::core::texture::DepthTexture;
    use crate::renderer::geometry::{Mesh, MeshData};
    use crate::renderer::scene::SurfaceMaterial;
    use crate::renderer::shadow::{ConfigChange, FilterMode};
    use crate::renderer::viewer::{Camera, Viewport};
    use glam::Vec3;

    #[test]
    fn test_uniform_layouts() {
        assert_eq!(std::mem::size_of::<DepthUniform>(), 128);
        assert_eq!(std::mem::size_of::<FrameUniform>(), 272);
        assert_eq!(std::mem::size_of::<DrawUniform>(), 176);
    }

    #[test]
    fn test_depth_pass_state_follows_config() {
        let config = ShadowMapConfig {
            resolution: 1024,
            filter: FilterMode::Nearest,
            bias: DepthBias::new(3.0, 4.0),
            pcf_offset: 1.0,
            cull_front_faces: true,
        };
        let state = DepthPassState::from_config(&config);
        assert_eq!(state.resolution, 1024);
        assert_eq!(state.depth.bias, DepthBias::new(3.0, 4.0));
        assert_eq!(state.cull, CullState::Front);
        assert_eq!(state.clear.depth, Some(1.0));
        assert_eq!(state.clear.color, None);

        let resized = DepthPassState::from_config(&ShadowMapConfig {
            resolution: 256,
            ..config
        });
        assert!(state.same_pipeline(&resized));
        let unbiased = DepthPassState::from_config(&ShadowMapConfig {
            bias: DepthBias::NONE,
            ..config
        });
        assert!(!state.same_pipeline(&unbiased));
    }

    #[test]
    fn test_lit_pass_state_has_no_cull_or_bias() {
        let state = LitPassState::new(&LightingSettings::default());
        assert_eq!(state.cull, CullState::None);
        assert!(!state.depth.bias.is_enabled());
        assert!(state.clear.color.is_some());
    }

    #[test]
    fn test_normal_matrix_keeps_normals_perpendicular() {
        let model = Mat4::from_scale(Vec3::new(4.0, 1.0, 1.0));
        let tangent = model.transform_vector3(Vec3::new(1.0, 1.0, 0.0));
        let normal = normal_matrix(model).transform_vector3(Vec3::new(1.0, -1.0, 0.0));
        assert!(tangent.dot(normal).abs() < 1e-5);
    }

    fn offscreen(ctx: &WgpuContext, size: u32) -> (wgpu::Texture, wgpu::TextureView, DepthTexture) {
        let color = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("test color"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = DepthTexture::new(ctx, size, size, "test depth");
        (color, view, depth)
    }

    #[test]
    fn test_frame_renders_on_gpu() {
        let Ok(ctx) = WgpuContext::new_blocking(None) else {
            return;
        };
        let mut pipeline = ShadowPipeline::new(
            &ctx,
            wgpu::TextureFormat::Rgba8Unorm,
            ShadowMapConfig::default(),
            LightingSettings::default(),
        )
        .unwrap();
        let (_color, view, depth) = offscreen(&ctx, 64);
        let target =
            RenderTarget::from_surface(&view, Some(&depth), 64, 64, wgpu::TextureFormat::Rgba8Unorm);

        let mut camera = Camera::new_perspective(
            Vec3::new(0.0, 6.0, 20.0),
            Vec3::ZERO,
            Vec3::Y,
            45.0,
            1.0,
            0.5,
            1000.0,
        );
        camera.set_viewport(Viewport::new(64, 64));
        let ground = Mesh::new(&ctx, &MeshData::plane(40.0, 40.0, 2), Some("ground"));
        let sphere = Mesh::new(&ctx, &MeshData::sphere(1.0, 8, 4), Some("sphere"));
        let items: Vec<DrawItem<'_>> = (0..100)
            .map(|i| DrawItem {
                model: Mat4::from_translation(Vec3::new(i as f32 % 10.0, 2.0, 0.0)),
                mesh: if i == 0 { &ground } else { &sphere },
                material: SurfaceMaterial::default(),
            })
            .collect();

        let mut settings = ShadowSettings::new(*pipeline.config());
        settings.push(ConfigChange::Resolution(512));
        settings.push(ConfigChange::ToggleCullFrontFaces);
        let applied = pipeline.begin_frame(&ctx, &mut settings).unwrap();
        assert!(applied.reallocated);
        assert!(applied.depth_state_changed);
        assert_eq!(pipeline.depth_target().generation(), 2);

        let mut encoder = ctx.create_encoder(Some("test frame"));
        let outcome = pipeline.render(
            &ctx,
            &mut encoder,
            &target,
            &camera,
            &ShadowLight::default(),
            &items,
        );
        ctx.submit(std::iter::once(encoder.finish()));
        assert_eq!(outcome, FrameOutcome::Rendered { draws: 100 });
    }

    #[test]
    fn test_begin_frame_reconciles_target_with_settings() {
        let Ok(ctx) = WgpuContext::new_blocking(None) else {
            return;
        };
        let mut pipeline = ShadowPipeline::new(
            &ctx,
            wgpu::TextureFormat::Rgba8Unorm,
            ShadowMapConfig::default(),
            LightingSettings::default(),
        )
        .unwrap();

        // Settings that never went through the pipeline's own config.
        let mut settings = ShadowSettings::new(ShadowMapConfig {
            resolution: 512,
            filter: FilterMode::Nearest,
            ..ShadowMapConfig::default()
        });
        let applied = pipeline.begin_frame(&ctx, &mut settings).unwrap();
        assert!(applied.reallocated);
        assert!(applied.rejected.is_none());
        let attachment = pipeline.depth_target().attachment().unwrap();
        assert_eq!(attachment.resolution(), 512);
        assert_eq!(attachment.filter, FilterMode::Nearest);
        assert_eq!(pipeline.config().resolution, 512);
        assert_eq!(pipeline.config().texel_size(), 1.0 / 512.0);

        let applied = pipeline.begin_frame(&ctx, &mut settings).unwrap();
        assert!(!applied.reallocated);
        assert_eq!(pipeline.depth_target().generation(), 2);
    }

    #[test]
    fn test_begin_frame_rolls_back_unreachable_settings() {
        let Ok(ctx) = WgpuContext::new_blocking(None) else {
            return;
        };
        let mut pipeline = ShadowPipeline::new(
            &ctx,
            wgpu::TextureFormat::Rgba8Unorm,
            ShadowMapConfig::default(),
            LightingSettings::default(),
        )
        .unwrap();

        let mut settings = ShadowSettings::new(ShadowMapConfig {
            resolution: ctx.max_texture_dimension() + 1,
            filter: FilterMode::Nearest,
            ..ShadowMapConfig::default()
        });
        let applied = pipeline.begin_frame(&ctx, &mut settings).unwrap();
        assert!(!applied.reallocated);
        assert!(matches!(
            applied.rejected,
            Some(ShadowError::ResourceAllocation { .. })
        ));
        let default = ShadowMapConfig::default();
        assert_eq!(settings.config().resolution, default.resolution);
        assert_eq!(settings.config().filter, default.filter);
        assert_eq!(pipeline.config().resolution, default.resolution);
        assert_eq!(pipeline.depth_target().generation(), 1);
    }

    /// Copy a 256-byte-row RGBA8 texture back to the CPU.
    fn read_pixels(ctx: &WgpuContext, texture: &wgpu::Texture, size: u32) -> Vec<u8> {
        const BYTES_PER_ROW: u32 = 256;
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_readback"),
            size: (BYTES_PER_ROW * size) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx.create_encoder(Some("readback copy"));
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(BYTES_PER_ROW),
                    rows_per_image: Some(size),
                },
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
        ctx.submit([encoder.finish()]);

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).unwrap();
        });
        let _ = ctx.device.poll(wgpu::PollType::wait_indefinitely());
        rx.recv().unwrap().expect("Failed to map staging buffer");

        let data = slice.get_mapped_range();
        let pixels = data.to_vec();
        drop(data);
        staging.unmap();
        pixels
    }

    #[test]
    fn test_occluder_darkens_ground_across_reallocation() {
        let Ok(ctx) = WgpuContext::new_blocking(None) else {
            return;
        };
        const SIZE: u32 = 64;
        let mut pipeline = ShadowPipeline::new(
            &ctx,
            wgpu::TextureFormat::Rgba8Unorm,
            ShadowMapConfig::default(),
            LightingSettings::default(),
        )
        .unwrap();
        let (color, view, depth) = offscreen(&ctx, SIZE);
        let target = RenderTarget::from_surface(
            &view,
            Some(&depth),
            SIZE,
            SIZE,
            wgpu::TextureFormat::Rgba8Unorm,
        );

        // Looking straight down, +x to the right and +z towards the bottom.
        let mut camera = Camera::new_perspective(
            Vec3::new(0.0, 30.0, 0.0),
            Vec3::ZERO,
            Vec3::NEG_Z,
            45.0,
            1.0,
            0.5,
            1000.0,
        );
        camera.set_viewport(Viewport::new(SIZE, SIZE));

        // The light at (0, 15, -5) casts the 2x2 occluder at y = 5 onto
        // x in [-1.5, 1.5], z in [1, 4] of the ground.
        let light = ShadowLight::default();
        let ground = Mesh::new(&ctx, &MeshData::plane(40.0, 40.0, 2), Some("ground"));
        let occluder = Mesh::new(&ctx, &MeshData::plane(2.0, 2.0, 1), Some("occluder"));
        let items = [
            DrawItem {
                model: Mat4::IDENTITY,
                mesh: &ground,
                material: SurfaceMaterial::ground(),
            },
            DrawItem {
                model: Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)),
                mesh: &occluder,
                material: SurfaceMaterial::ground(),
            },
        ];

        let view_projection = camera.projection_matrix() * camera.view_matrix();
        let green_at = |pixels: &[u8], world: Vec3| {
            let ndc = view_projection.project_point3(world);
            let x = ((ndc.x + 1.0) * 0.5 * SIZE as f32) as usize;
            let y = ((1.0 - ndc.y) * 0.5 * SIZE as f32) as usize;
            pixels[y * 256 + x * 4 + 1]
        };
        let shadowed = Vec3::new(0.0, 0.0, 2.5);
        let lit = Vec3::new(6.0, 0.0, 3.0);

        let mut settings = ShadowSettings::new(*pipeline.config());
        let initial = settings.config().resolution;
        for resolution in [initial, 256] {
            if resolution != initial {
                settings.push(ConfigChange::Resolution(resolution));
            }
            pipeline.begin_frame(&ctx, &mut settings).unwrap();
            assert_eq!(
                pipeline.depth_target().attachment().unwrap().resolution(),
                resolution
            );

            let mut encoder = ctx.create_encoder(Some("test frame"));
            let outcome = pipeline.render(&ctx, &mut encoder, &target, &camera, &light, &items);
            ctx.submit([encoder.finish()]);
            assert_eq!(outcome, FrameOutcome::Rendered { draws: 2 });

            let pixels = read_pixels(&ctx, &color, SIZE);
            let in_shadow = green_at(&pixels, shadowed);
            let in_light = green_at(&pixels, lit);
            assert!(in_shadow < 60, "{resolution}: shadowed green {in_shadow}");
            assert!(in_light > 100, "{resolution}: lit green {in_light}");
            assert!(
                in_light as u32 > 2 * in_shadow as u32,
                "{resolution}: {in_light} vs {in_shadow}"
            );
        }
    }

    #[test]
    fn test_missing_screen_depth_skips_frame() {
        let Ok(ctx) = WgpuContext::new_blocking(None) else {
            return;
        };
        let mut pipeline = ShadowPipeline::new(
            &ctx,
            wgpu::TextureFormat::Rgba8Unorm,
            ShadowMapConfig::default(),
            LightingSettings::default(),
        )
        .unwrap();
        let (_color, view, _depth) = offscreen(&ctx, 16);
        let target =
            RenderTarget::from_surface(&view, None, 16, 16, wgpu::TextureFormat::Rgba8Unorm);
        let camera = Camera::new_perspective(Vec3::Z, Vec3::ZERO, Vec3::Y, 45.0, 1.0, 0.5, 10.0);

        let mut encoder = ctx.create_encoder(None);
        let outcome = pipeline.render(
            &ctx,
            &mut encoder,
            &target,
            &camera,
            &ShadowLight::default(),
            &[],
        );
        assert_eq!(
            outcome,
            FrameOutcome::Skipped(ShadowError::IncompleteFramebuffer)
        );
    }
}
