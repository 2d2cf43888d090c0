//! Multi-part model resource
//!
//! An ordered list of parts behind a reader/writer lock, with lazy
//! aggregate bounds and statistics recomputed after any mutation.

use crate::material::Material;
use crate::mesh::Mesh;
use ember_math::{Aabb, Mat4};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Skin binding data for an animated part
#[derive(Clone, Debug, Default)]
pub struct SkinningData {
    pub bone_names: Vec<String>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

/// One drawable piece of a model
#[derive(Clone)]
pub struct ModelPart {
    pub name: String,
    pub mesh: Arc<Mesh>,
    pub material: Arc<Material>,
    pub local_transform: Mat4,
    pub local_bounds: Aabb,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub skinning: Option<SkinningData>,
}

impl ModelPart {
    pub fn new(name: impl Into<String>, mesh: Arc<Mesh>, material: Arc<Material>) -> Self {
        let local_bounds = mesh.bounds();
        Self {
            name: name.into(),
            mesh,
            material,
            local_transform: Mat4::IDENTITY,
            local_bounds,
            cast_shadows: true,
            receive_shadows: true,
            skinning: None,
        }
    }
}

/// Aggregate counts over all parts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelStats {
    pub part_count: usize,
    pub vertex_count: usize,
    pub triangle_count: usize,
}

#[derive(Default)]
struct Cached {
    bounds: Aabb,
    stats: ModelStats,
    dirty: bool,
}

/// Shared model. Parts are read via [`access_parts`](Model::access_parts)
/// and mutated via [`modify_parts`](Model::modify_parts); any mutation
/// marks bounds and stats dirty.
pub struct Model {
    name: String,
    parts: RwLock<Vec<ModelPart>>,
    cached: Mutex<Cached>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parts: RwLock::new(Vec::new()),
            cached: Mutex::new(Cached {
                dirty: true,
                ..Default::default()
            }),
        }
    }

    pub fn with_parts(name: impl Into<String>, parts: Vec<ModelPart>) -> Self {
        let model = Self::new(name);
        *model.parts.write() = parts;
        model
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn part_count(&self) -> usize {
        self.parts.read().len()
    }

    /// Read the parts under the shared lock
    pub fn access_parts<R>(&self, f: impl FnOnce(&[ModelPart]) -> R) -> R {
        f(&self.parts.read())
    }

    /// Mutate the parts under the exclusive lock. Bounds and stats are
    /// recomputed lazily afterwards.
    pub fn modify_parts<R>(&self, f: impl FnOnce(&mut Vec<ModelPart>) -> R) -> R {
        let result = f(&mut self.parts.write());
        self.cached.lock().dirty = true;
        result
    }

    pub fn add_part(&self, part: ModelPart) {
        self.modify_parts(|parts| parts.push(part));
    }

    /// Union of part bounds transformed by each part's local transform
    pub fn bounds(&self) -> Aabb {
        let mut cached = self.cached.lock();
        if cached.dirty {
            self.recompute(&mut cached);
        }
        cached.bounds
    }

    pub fn stats(&self) -> ModelStats {
        let mut cached = self.cached.lock();
        if cached.dirty {
            self.recompute(&mut cached);
        }
        cached.stats
    }

    fn recompute(&self, cached: &mut Cached) {
        let parts = self.parts.read();
        let mut bounds = Aabb::EMPTY;
        let mut stats = ModelStats {
            part_count: parts.len(),
            ..Default::default()
        };
        for part in parts.iter() {
            bounds = bounds.union(&part.local_bounds.transformed(&part.local_transform));
            stats.vertex_count += part.mesh.vertex_count();
            stats.triangle_count += part.mesh.triangle_count();
        }
        cached.bounds = bounds;
        cached.stats = stats;
        cached.dirty = false;
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("parts", &self.part_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use ember_math::Vec3;

    fn cube_part(name: &str, offset: Vec3) -> ModelPart {
        let mut part = ModelPart::new(
            name,
            Arc::new(primitives::unit_cube(name)),
            Arc::new(Material::new(name)),
        );
        part.local_transform = Mat4::from_translation(offset);
        part
    }

    #[test]
    fn test_stats_lazy() {
        let model = Model::new("m");
        model.add_part(cube_part("a", Vec3::ZERO));
        model.add_part(cube_part("b", Vec3::new(4.0, 0.0, 0.0)));
        let stats = model.stats();
        assert_eq!(stats.part_count, 2);
        assert_eq!(stats.triangle_count, 24);
    }

    #[test]
    fn test_bounds_cover_offset_parts() {
        let model = Model::new("m");
        model.add_part(cube_part("a", Vec3::ZERO));
        model.add_part(cube_part("b", Vec3::new(4.0, 0.0, 0.0)));
        let bounds = model.bounds();
        assert!(bounds.min.x <= -0.5);
        assert!(bounds.max.x >= 4.5);
    }

    #[test]
    fn test_mutation_marks_dirty() {
        let model = Model::new("m");
        model.add_part(cube_part("a", Vec3::ZERO));
        let before = model.bounds();
        model.modify_parts(|parts| {
            parts[0].local_transform = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        });
        let after = model.bounds();
        assert_ne!(before.center().x, after.center().x);
    }
}
