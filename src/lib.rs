//! Umbra shadow renderer
//!
//! Renders a static forest scene lit by a single shadow-casting light using
//! classic two-pass shadow mapping on top of wgpu.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **context** - Core wgpu wrapper (Device, Queue)
//! 2. **core** - GPU primitives (buffers, textures, pipelines, render states)
//! 3. **renderer** - Cameras, geometry, the forest scene and the shadow pipeline
//! 4. **window** - Window management with winit (feature = "window")

pub mod context;
pub mod core;
pub mod renderer;

#[cfg(feature = "window")]
pub mod window;

// Re-export commonly used types
pub use context::WgpuContext;

pub use core::{
    ClearState, CullState, DepthBias, DepthState, DepthTexture, DynamicUniformBuffer,
    IndexBuffer, PipelineBuilder, RenderTarget, VertexBuffer, VertexPNU,
};

pub use renderer::{
    Aabb, AppliedChanges, Camera, ClipConvention, ConfigChange, DepthTarget, DrawItem, FilterMode,
    FrameOutcome, Geometry, LightProjection, LightView, LightingSettings, LoadState, Mesh,
    MeshData, MeshId, MeshSlot, PcfKernel, Projection, Scene, SceneObject, ShadowDepthMap,
    ShadowError, ShadowLight, ShadowMapConfig, ShadowPipeline, ShadowSettings, SurfaceMaterial,
    Viewer, Viewport,
};

#[cfg(feature = "window")]
pub use renderer::{FlyControl, OrbitControl};

#[cfg(feature = "window")]
pub use window::{
    screen_target, Event, FrameInput, FrameOutput, Key, Modifiers, MouseButton, Window,
    WindowSettings,
};

// Re-export glam for convenience
pub use glam;
