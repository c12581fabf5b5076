//! Core rendering abstractions
//!
//! This module provides mid-level abstractions over wgpu primitives.

pub mod buffer;
pub mod pipeline;
pub mod render_states;
pub mod render_target;
pub mod texture;
pub mod vertex;

pub use buffer::{DynamicUniformBuffer, IndexBuffer, VertexBuffer};
pub use pipeline::PipelineBuilder;
pub use render_states::{ClearState, CullState, DepthBias, DepthState};
pub use render_target::RenderTarget;
pub use texture::DepthTexture;
pub use vertex::VertexPNU;
