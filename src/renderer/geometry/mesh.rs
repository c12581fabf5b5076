//! Mesh geometry
//!
//! `MeshData` holds CPU-side vertices and indices and provides the primitive
//! generators the forest scene is built from. `Mesh` is its GPU upload.
//! All generators emit counter-clockwise front faces whose winding agrees
//! with the vertex normals.

use super::{Aabb, Geometry};
use crate::context::WgpuContext;
use crate::core::buffer::{IndexBuffer, VertexBuffer};
use crate::core::vertex::VertexPNU;
use glam::Vec3;
use std::f32::consts::{PI, TAU};

/// CPU-side triangle mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<VertexPNU>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Bounding box of all vertex positions.
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|v| Vec3::from(v.position)))
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Flat grid in the XZ plane centered on the origin, facing +Y.
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let n = subdivisions.max(1);
        let mut vertices = Vec::with_capacity(((n + 1) * (n + 1)) as usize);
        let mut indices = Vec::with_capacity((n * n * 6) as usize);

        for j in 0..=n {
            for i in 0..=n {
                let u = i as f32 / n as f32;
                let v = j as f32 / n as f32;
                vertices.push(VertexPNU::new(
                    [(u - 0.5) * width, 0.0, (v - 0.5) * depth],
                    [0.0, 1.0, 0.0],
                    [u, v],
                ));
            }
        }

        let idx = |i: u32, j: u32| j * (n + 1) + i;
        for j in 0..n {
            for i in 0..n {
                let a = idx(i, j);
                let b = idx(i + 1, j);
                let c = idx(i + 1, j + 1);
                let d = idx(i, j + 1);
                indices.extend_from_slice(&[a, c, b, a, d, c]);
            }
        }

        Self { vertices, indices }
    }

    /// Closed cylinder standing on the XZ plane (y from 0 to `height`).
    pub fn cylinder(radius: f32, height: f32, segments: u32) -> Self {
        let segments = segments.max(3);
        let mut mesh = Self::default();

        for i in 0..=segments {
            let t = i as f32 / segments as f32;
            let (z, x) = (t * TAU).sin_cos();
            let normal = [x, 0.0, z];
            mesh.vertices
                .push(VertexPNU::new([x * radius, 0.0, z * radius], normal, [t, 1.0]));
            mesh.vertices
                .push(VertexPNU::new([x * radius, height, z * radius], normal, [t, 0.0]));
        }

        for i in 0..segments {
            let base = i * 2;
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
        }

        mesh.push_cap(radius, height, segments, true);
        mesh.push_cap(radius, 0.0, segments, false);
        mesh
    }

    /// Closed cone with its base on the XZ plane and apex at `height`.
    pub fn cone(radius: f32, height: f32, segments: u32) -> Self {
        let segments = segments.max(3);
        let mut mesh = Self::default();
        let slant = Vec3::new(height, radius, height);

        for i in 0..=segments {
            let t = i as f32 / segments as f32;
            let (z, x) = (t * TAU).sin_cos();
            let normal = (Vec3::new(x, 1.0, z) * slant).normalize().to_array();
            mesh.vertices
                .push(VertexPNU::new([x * radius, 0.0, z * radius], normal, [t, 1.0]));
            mesh.vertices
                .push(VertexPNU::new([0.0, height, 0.0], normal, [t, 0.0]));
        }

        for i in 0..segments {
            let base = i * 2;
            mesh.indices.extend_from_slice(&[base, base + 1, base + 2]);
        }

        mesh.push_cap(radius, 0.0, segments, false);
        mesh
    }

    /// UV sphere centered on the origin.
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = Self::default();

        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let (ring_radius, y) = (v * PI).sin_cos();
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let (z, x) = (u * TAU).sin_cos();
                let normal = [x * ring_radius, y, z * ring_radius];
                let position = [normal[0] * radius, normal[1] * radius, normal[2] * radius];
                mesh.vertices.push(VertexPNU::new(position, normal, [u, v]));
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;
                mesh.indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next,
                    current + 1,
                    next + 1,
                    next,
                ]);
            }
        }

        mesh
    }

    /// Disc at height `y`, facing +Y when `up` and -Y otherwise.
    fn push_cap(&mut self, radius: f32, y: f32, segments: u32, up: bool) {
        let normal = if up { [0.0, 1.0, 0.0] } else { [0.0, -1.0, 0.0] };
        let center = self.vertices.len() as u32;
        self.vertices
            .push(VertexPNU::new([0.0, y, 0.0], normal, [0.5, 0.5]));

        for i in 0..=segments {
            let (z, x) = (i as f32 / segments as f32 * TAU).sin_cos();
            self.vertices.push(VertexPNU::new(
                [x * radius, y, z * radius],
                normal,
                [0.5 + x * 0.5, 0.5 + z * 0.5],
            ));
        }

        for i in 0..segments {
            let ring = center + 1 + i;
            if up {
                self.indices.extend_from_slice(&[center, ring + 1, ring]);
            } else {
                self.indices.extend_from_slice(&[center, ring, ring + 1]);
            }
        }
    }
}

/// A mesh uploaded to the GPU.
pub struct Mesh {
    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
    aabb: Aabb,
}

impl Mesh {
    /// Upload mesh data.
    pub fn new(ctx: &WgpuContext, data: &MeshData, label: Option<&str>) -> Self {
        Self {
            vertex_buffer: VertexBuffer::new(ctx, &data.vertices, label),
            index_buffer: IndexBuffer::new(ctx, &data.indices, label),
            aabb: data.aabb(),
        }
    }
}

impl Geometry for Mesh {
    fn vertex_buffer(&self) -> &VertexBuffer {
        &self.vertex_buffer
    }

    fn index_buffer(&self) -> &IndexBuffer {
        &self.index_buffer
    }

    fn aabb(&self) -> Aabb {
        self.aabb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every non-degenerate triangle's geometric normal must point the same way
    /// as the averaged vertex normals.
    fn assert_winding_matches_normals(mesh: &MeshData) {
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| mesh.vertices[i as usize]);
            let pa = Vec3::from(a.position);
            let face = (Vec3::from(b.position) - pa).cross(Vec3::from(c.position) - pa);
            if face.length_squared() < 1e-12 {
                continue;
            }
            let shading = Vec3::from(a.normal) + Vec3::from(b.normal) + Vec3::from(c.normal);
            assert!(
                face.dot(shading) > 0.0,
                "triangle {:?} winds against its normals",
                tri
            );
        }
    }

    #[test]
    fn test_plane() {
        let plane = MeshData::plane(10.0, 4.0, 2);
        assert_eq!(plane.vertices.len(), 9);
        assert_eq!(plane.triangle_count(), 8);
        let aabb = plane.aabb();
        assert_eq!(aabb.min, Vec3::new(-5.0, 0.0, -2.0));
        assert_eq!(aabb.max, Vec3::new(5.0, 0.0, 2.0));
        assert_winding_matches_normals(&plane);
    }

    #[test]
    fn test_cylinder() {
        let cylinder = MeshData::cylinder(0.5, 3.0, 12);
        let aabb = cylinder.aabb();
        assert!((aabb.min.y - 0.0).abs() < 1e-6);
        assert!((aabb.max.y - 3.0).abs() < 1e-6);
        assert_winding_matches_normals(&cylinder);
    }

    #[test]
    fn test_cone() {
        let cone = MeshData::cone(2.0, 5.0, 16);
        assert!((cone.aabb().max.y - 5.0).abs() < 1e-6);
        assert_winding_matches_normals(&cone);
        for v in &cone.vertices {
            assert!((Vec3::from(v.normal).length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_sphere() {
        let sphere = MeshData::sphere(2.0, 16, 8);
        for v in &sphere.vertices {
            assert!((Vec3::from(v.position).length() - 2.0).abs() < 1e-4);
        }
        assert_winding_matches_normals(&sphere);
    }

    #[test]
    fn test_indices_in_range() {
        for mesh in [
            MeshData::plane(1.0, 1.0, 3),
            MeshData::cylinder(1.0, 1.0, 8),
            MeshData::cone(1.0, 1.0, 8),
            MeshData::sphere(1.0, 8, 4),
        ] {
            let count = mesh.vertices.len() as u32;
            assert!(mesh.indices.iter().all(|&i| i < count));
            assert_eq!(mesh.indices.len() % 3, 0);
        }
    }
}
