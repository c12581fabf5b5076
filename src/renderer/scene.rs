//! Forest scene
//!
//! A ground plane and a handful of procedurally generated trees. Meshes are
//! shared between objects through [`MeshId`]s and are generated off the
//! render thread; objects whose mesh is not ready yet are simply not drawn.

use crate::context::WgpuContext;
use crate::renderer::geometry::{Aabb, Geometry, LoadState, Mesh, MeshData, MeshSlot};
use glam::{Mat4, Quat, Vec3};

/// Blinn-Phong surface parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceMaterial {
    /// Diffuse reflectance.
    pub kd: Vec3,
    /// Specular reflectance.
    pub ks: Vec3,
    /// Ambient reflectance.
    pub ka: Vec3,
    /// Specular exponent.
    pub shininess: f32,
}

impl SurfaceMaterial {
    pub fn ground() -> Self {
        Self {
            kd: Vec3::new(0.172285, 0.389, 0.026521),
            ks: Vec3::ZERO,
            ka: Vec3::ONE,
            shininess: 225.0,
        }
    }

    pub fn bark() -> Self {
        Self {
            kd: Vec3::new(0.1424, 0.05157, 0.02339),
            ks: Vec3::splat(0.076),
            ka: Vec3::ONE,
            shininess: 225.0,
        }
    }

    pub fn foliage() -> Self {
        Self {
            kd: Vec3::new(0.046, 0.21, 0.034),
            ks: Vec3::splat(0.076),
            ka: Vec3::ONE,
            shininess: 225.0,
        }
    }
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self::ground()
    }
}

/// Index of a mesh inside a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(usize);

/// A placed instance of a scene mesh.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub transform: Mat4,
    pub mesh: MeshId,
    pub material: SurfaceMaterial,
}

/// One draw call for the shadow pipeline.
#[derive(Clone, Copy)]
pub struct DrawItem<'a> {
    pub model: Mat4,
    pub mesh: &'a Mesh,
    pub material: SurfaceMaterial,
}

/// Static scene: meshes and the objects placing them.
#[derive(Debug, Default)]
pub struct Scene {
    meshes: Vec<MeshSlot>,
    objects: Vec<SceneObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesh slot.
    pub fn add_mesh(&mut self, slot: MeshSlot) -> MeshId {
        self.meshes.push(slot);
        MeshId(self.meshes.len() - 1)
    }

    /// Register a mesh generated on a worker thread.
    pub fn load_mesh<F>(&mut self, name: &str, generate: F) -> MeshId
    where
        F: FnOnce() -> anyhow::Result<MeshData> + Send + 'static,
    {
        let mut slot = MeshSlot::new(name);
        slot.load(generate);
        self.add_mesh(slot)
    }

    /// Place an object.
    pub fn add_object(
        &mut self,
        name: impl Into<String>,
        mesh: MeshId,
        transform: Mat4,
        material: SurfaceMaterial,
    ) {
        self.objects.push(SceneObject {
            name: name.into(),
            transform,
            mesh,
            material,
        });
    }

    /// Ground plane with two kinds of trees scattered over it.
    pub fn forest() -> Self {
        let mut scene = Self::new();

        let ground = scene.load_mesh("ground", || Ok(MeshData::plane(40.0, 40.0, 16)));
        let trunk = scene.load_mesh("trunk", || Ok(MeshData::cylinder(0.25, 2.5, 16)));
        let pine = scene.load_mesh("pine canopy", || Ok(MeshData::cone(1.4, 4.0, 24)));
        let crown = scene.load_mesh("round canopy", || Ok(MeshData::sphere(1.5, 24, 12)));

        scene.add_object("ground", ground, Mat4::IDENTITY, SurfaceMaterial::ground());

        for (i, &(x, z, scale, yaw, round)) in TREES.iter().enumerate() {
            let base = Mat4::from_scale_rotation_translation(
                Vec3::splat(scale),
                Quat::from_rotation_y(yaw),
                Vec3::new(x, 0.0, z),
            );
            scene.add_object(format!("trunk {i}"), trunk, base, SurfaceMaterial::bark());

            let (canopy, lift) = if round { (crown, 3.4) } else { (pine, 1.8) };
            scene.add_object(
                format!("canopy {i}"),
                canopy,
                base * Mat4::from_translation(Vec3::new(0.0, lift, 0.0)),
                SurfaceMaterial::foliage(),
            );
        }

        scene
    }

    /// Upload meshes whose generation finished. Returns how many changed state.
    pub fn poll_loads(&mut self, ctx: &WgpuContext) -> usize {
        self.meshes
            .iter_mut()
            .map(|slot| slot.poll(ctx))
            .filter(|changed| *changed)
            .count()
    }

    /// Whether no mesh is still loading.
    pub fn is_settled(&self) -> bool {
        !self
            .meshes
            .iter()
            .any(|slot| matches!(slot.state(), LoadState::Loading))
    }

    /// Objects whose mesh is ready, in insertion order.
    pub fn draw_list(&self) -> Vec<DrawItem<'_>> {
        self.objects
            .iter()
            .filter_map(|object| {
                let mesh = self.meshes.get(object.mesh.0)?.mesh()?;
                Some(DrawItem {
                    model: object.transform,
                    mesh,
                    material: object.material,
                })
            })
            .collect()
    }

    /// World-space bounds of everything drawable.
    pub fn bounds(&self) -> Option<Aabb> {
        self.draw_list()
            .iter()
            .map(|item| item.mesh.aabb().transformed(item.model))
            .reduce(|a, b| a.merge(&b))
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn meshes(&self) -> &[MeshSlot] {
        &self.meshes
    }
}

/// (x, z, scale, yaw, round crown)
const TREES: [(f32, f32, f32, f32, bool); 9] = [
    (0.0, 0.0, 1.2, 0.0, false),
    (-6.0, 3.5, 1.0, 0.7, true),
    (5.5, -2.0, 1.4, 1.9, false),
    (-3.0, -7.0, 0.9, 2.4, false),
    (8.0, 6.0, 1.1, 0.3, true),
    (-9.5, -1.5, 1.3, 1.1, false),
    (2.5, 9.0, 0.8, 2.8, true),
    (-5.0, 11.0, 1.0, 0.5, false),
    (11.0, -9.0, 1.2, 1.4, true),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forest_layout() {
        let scene = Scene::forest();
        assert_eq!(scene.meshes().len(), 4);
        assert_eq!(scene.objects().len(), 1 + TREES.len() * 2);
        assert!(scene
            .objects()
            .iter()
            .all(|object| object.mesh.0 < scene.meshes().len()));
    }

    #[test]
    fn test_nothing_drawn_until_loaded() {
        let scene = Scene::forest();
        // Nothing has been polled, so no mesh can be ready.
        assert!(scene.draw_list().is_empty());
        assert!(scene.bounds().is_none());
    }

    #[test]
    fn test_trees_stand_on_ground() {
        for &(x, z, _, _, _) in TREES.iter() {
            assert!(x.abs() < 20.0 && z.abs() < 20.0);
        }
    }

    #[test]
    fn test_draw_list_after_loading_on_gpu() {
        let Ok(ctx) = WgpuContext::new_blocking(None) else {
            return;
        };
        let mut scene = Scene::forest();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while !scene.is_settled() && std::time::Instant::now() < deadline {
            scene.poll_loads(&ctx);
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(scene.draw_list().len(), scene.objects().len());
        let bounds = scene.bounds().unwrap();
        assert!(bounds.min.y.abs() < 1e-4);
        assert!(bounds.max.y > 4.0);
    }
}
