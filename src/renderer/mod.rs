//! High-level rendering
//!
//! Viewer cameras, procedural geometry, the forest scene and the two-pass
//! shadow pipeline.

pub mod geometry;
pub mod scene;
pub mod shadow;
pub mod viewer;

#[cfg(feature = "window")]
pub mod control;

pub use geometry::{Aabb, Geometry, LoadState, Mesh, MeshData, MeshSlot};
pub use scene::{DrawItem, MeshId, Scene, SceneObject, SurfaceMaterial};
pub use shadow::{
    AppliedChanges, ClipConvention, ConfigChange, DepthTarget, FilterMode, FrameOutcome,
    LightProjection, LightView, LightingSettings, PcfKernel, ShadowDepthMap, ShadowError,
    ShadowLight, ShadowMapConfig, ShadowPipeline, ShadowSettings,
};
pub use viewer::{Camera, Projection, Viewer, Viewport};

#[cfg(feature = "window")]
pub use control::{FlyControl, OrbitControl};
