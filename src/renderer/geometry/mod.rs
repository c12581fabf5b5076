//! Geometry abstractions
//!
//! Provides CPU mesh data, GPU meshes, and per-mesh loading state.

mod loading;
mod mesh;

pub use loading::{LoadState, MeshSlot};
pub use mesh::{Mesh, MeshData};

use crate::core::buffer::{IndexBuffer, VertexBuffer};
use glam::{Mat4, Vec3};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB from a set of points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);

        for p in points {
            min = min.min(p);
            max = max.max(p);
        }

        Self { min, max }
    }

    /// Get the center of the AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get all 8 corners of the AABB.
    pub fn corners(&self) -> [Vec3; 8] {
        [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ]
    }

    /// Bounding box of this box after an affine transform.
    pub fn transformed(&self, transform: Mat4) -> Self {
        Self::from_points(
            self.corners()
                .into_iter()
                .map(|c| transform.transform_point3(c)),
        )
    }

    /// Merge two AABBs.
    pub fn merge(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Trait for geometry that can be rendered.
pub trait Geometry {
    /// Get the vertex buffer.
    fn vertex_buffer(&self) -> &VertexBuffer;

    /// Get the index buffer.
    fn index_buffer(&self) -> &IndexBuffer;

    /// Get the object-space bounding box.
    fn aabb(&self) -> Aabb;

    /// Draw the geometry using the given render pass.
    fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer().slice());
        render_pass.set_index_buffer(self.index_buffer().slice(), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..self.index_buffer().count(), 0, 0..1);
    }
}
