//! Reference-counted resource manager
//!
//! Name-keyed stores for each resource kind, one reader/writer lock per
//! kind so loader workers can look resources up while the main thread
//! registers. Reference counts come from `Arc::strong_count`; an entry
//! with a count of one is held only by the manager and is eligible for
//! [`cleanup_unused`](ResourceManager::cleanup_unused). The dependency
//! graph is advisory and guarded by its own mutex.

use crate::material::Material;
use crate::mesh::Mesh;
use crate::model::Model;
use crate::shader::Shader;
use crate::texture::Texture;
use ember_core::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Resource kind discriminator for diagnostics and the dependency graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum ResourceKind {
    Mesh,
    Material,
    Texture,
    Shader,
    Model,
}

/// Kind + name pair identifying one entry
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Central registry for all shared resources
#[derive(Default)]
pub struct ResourceManager {
    meshes: RwLock<HashMap<String, Arc<Mesh>>>,
    materials: RwLock<HashMap<String, Arc<Material>>>,
    textures: RwLock<HashMap<String, Arc<Texture>>>,
    shaders: RwLock<HashMap<String, Arc<Shader>>>,
    models: RwLock<HashMap<String, Arc<Model>>>,
    // parent -> children, advisory only
    dependencies: Mutex<HashMap<ResourceId, Vec<ResourceId>>>,
}

macro_rules! resource_store {
    ($kind:expr, $store:ident, $ty:ty,
     $register:ident, $get:ident, $has:ident, $remove:ident,
     $cleanup:ident, $list:ident, $for_each:ident) => {
        /// Register under `name`, rebinding any existing entry. Dependents
        /// of the old binding are not rebound automatically.
        pub fn $register(&self, name: impl Into<String>, resource: Arc<$ty>) -> bool {
            let name = name.into();
            let mut store = self.$store.write();
            if store.insert(name.clone(), resource).is_some() {
                log::debug!("{:?} '{}' rebound", $kind, name);
            }
            true
        }

        pub fn $get(&self, name: &str) -> Option<Arc<$ty>> {
            self.$store.read().get(name).cloned()
        }

        pub fn $has(&self, name: &str) -> bool {
            self.$store.read().contains_key(name)
        }

        /// Remove an entry nobody else holds. Fails with `ResourceBusy`
        /// while external references exist.
        pub fn $remove(&self, name: &str) -> Result<()> {
            let mut store = self.$store.write();
            let entry = store.get(name).ok_or_else(|| {
                Error::ResourceUnavailable(format!("{:?} '{name}'", $kind))
            })?;
            let count = Arc::strong_count(entry) as i64;
            if count > 1 {
                return Err(Error::ResourceBusy {
                    name: name.to_string(),
                    ref_count: count,
                });
            }
            store.remove(name);
            drop(store);
            self.warn_orphans($kind, name);
            Ok(())
        }

        /// Drop every entry held only by the manager; returns the count
        pub fn $cleanup(&self) -> usize {
            let mut store = self.$store.write();
            let before = store.len();
            store.retain(|_, entry| Arc::strong_count(entry) > 1);
            before - store.len()
        }

        pub fn $list(&self) -> Vec<String> {
            let mut names: Vec<String> = self.$store.read().keys().cloned().collect();
            names.sort();
            names
        }

        /// Iterate entries with the read lock held
        pub fn $for_each(&self, mut f: impl FnMut(&str, &Arc<$ty>)) {
            for (name, entry) in self.$store.read().iter() {
                f(name, entry);
            }
        }
    };
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    resource_store!(
        ResourceKind::Mesh, meshes, Mesh,
        register_mesh, get_mesh, has_mesh, remove_mesh,
        cleanup_unused_meshes, list_meshes, for_each_mesh
    );
    resource_store!(
        ResourceKind::Material, materials, Material,
        register_material, get_material, has_material, remove_material,
        cleanup_unused_materials, list_materials, for_each_material
    );
    resource_store!(
        ResourceKind::Texture, textures, Texture,
        register_texture, get_texture, has_texture, remove_texture,
        cleanup_unused_textures, list_textures, for_each_texture
    );
    resource_store!(
        ResourceKind::Shader, shaders, Shader,
        register_shader, get_shader, has_shader, remove_shader,
        cleanup_unused_shaders, list_shaders, for_each_shader
    );
    resource_store!(
        ResourceKind::Model, models, Model,
        register_model, get_model, has_model, remove_model,
        cleanup_unused_models, list_models, for_each_model
    );

    /// External reference count for an entry, or 0 when missing. The
    /// manager's own hold is not counted.
    pub fn reference_count(&self, kind: ResourceKind, name: &str) -> i64 {
        let count = match kind {
            ResourceKind::Mesh => self.meshes.read().get(name).map(Arc::strong_count),
            ResourceKind::Material => self.materials.read().get(name).map(Arc::strong_count),
            ResourceKind::Texture => self.textures.read().get(name).map(Arc::strong_count),
            ResourceKind::Shader => self.shaders.read().get(name).map(Arc::strong_count),
            ResourceKind::Model => self.models.read().get(name).map(Arc::strong_count),
        };
        count.map(|c| c as i64 - 1).unwrap_or(0)
    }

    /// Record an advisory parent -> child edge
    pub fn register_dependency(&self, parent: ResourceId, child: ResourceId) {
        let mut deps = self.dependencies.lock();
        let children = deps.entry(parent).or_default();
        if !children.contains(&child) {
            children.push(child);
        }
    }

    pub fn unregister_dependency(&self, parent: &ResourceId, child: &ResourceId) {
        let mut deps = self.dependencies.lock();
        if let Some(children) = deps.get_mut(parent) {
            children.retain(|c| c != child);
            if children.is_empty() {
                deps.remove(parent);
            }
        }
    }

    /// Children recorded for a parent
    pub fn dependencies_of(&self, parent: &ResourceId) -> Vec<ResourceId> {
        self.dependencies
            .lock()
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    fn warn_orphans(&self, kind: ResourceKind, name: &str) {
        let id = ResourceId::new(kind, name);
        let deps = self.dependencies.lock();
        if let Some(children) = deps.get(&id) {
            if !children.is_empty() {
                log::warn!(
                    "{:?} '{}' removed with {} recorded dependents",
                    kind,
                    name,
                    children.len()
                );
            }
        }
    }

    /// Sweep every store; returns the total number of entries removed
    pub fn cleanup_unused(&self) -> usize {
        self.cleanup_unused_meshes()
            + self.cleanup_unused_materials()
            + self.cleanup_unused_textures()
            + self.cleanup_unused_shaders()
            + self.cleanup_unused_models()
    }

    /// Drop one kind entirely, regardless of reference counts
    pub fn clear_kind(&self, kind: ResourceKind) {
        match kind {
            ResourceKind::Mesh => self.meshes.write().clear(),
            ResourceKind::Material => self.materials.write().clear(),
            ResourceKind::Texture => self.textures.write().clear(),
            ResourceKind::Shader => self.shaders.write().clear(),
            ResourceKind::Model => self.models.write().clear(),
        }
        self.dependencies
            .lock()
            .retain(|parent, _| parent.kind != kind);
    }

    /// Drop everything, including the dependency graph. Used by tests to
    /// reset state between runs.
    pub fn clear(&self) {
        self.meshes.write().clear();
        self.materials.write().clear();
        self.textures.write().clear();
        self.shaders.write().clear();
        self.models.write().clear();
        self.dependencies.lock().clear();
    }

    /// Total entries across all stores
    pub fn total_count(&self) -> usize {
        self.meshes.read().len()
            + self.materials.read().len()
            + self.textures.read().len()
            + self.shaders.read().len()
            + self.models.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;

    #[test]
    fn test_register_get_roundtrip() {
        let mgr = ResourceManager::new();
        let mesh = Arc::new(primitives::unit_cube("cube"));
        mgr.register_mesh("cube", mesh.clone());
        let got = mgr.get_mesh("cube").unwrap();
        assert!(Arc::ptr_eq(&got, &mesh));
        assert!(mgr.has_mesh("cube"));
        assert!(mgr.get_mesh("missing").is_none());
    }

    #[test]
    fn test_remove_busy() {
        let mgr = ResourceManager::new();
        mgr.register_mesh("cube", Arc::new(primitives::unit_cube("cube")));
        let held = mgr.get_mesh("cube").unwrap();
        match mgr.remove_mesh("cube") {
            Err(Error::ResourceBusy { ref_count, .. }) => assert_eq!(ref_count, 2),
            other => panic!("expected ResourceBusy, got {other:?}"),
        }
        drop(held);
        mgr.remove_mesh("cube").unwrap();
        assert!(!mgr.has_mesh("cube"));
        assert!(mgr.get_mesh("cube").is_none());
    }

    #[test]
    fn test_cleanup_unused_spares_held_entries() {
        let mgr = ResourceManager::new();
        mgr.register_mesh("a", Arc::new(primitives::unit_cube("a")));
        mgr.register_mesh("b", Arc::new(primitives::unit_cube("b")));
        let held = mgr.get_mesh("b").unwrap();
        assert_eq!(mgr.cleanup_unused(), 1);
        assert!(!mgr.has_mesh("a"));
        assert!(mgr.has_mesh("b"));
        drop(held);
        assert_eq!(mgr.cleanup_unused(), 1);
    }

    #[test]
    fn test_reference_count() {
        let mgr = ResourceManager::new();
        mgr.register_material("m", Arc::new(Material::new("m")));
        assert_eq!(mgr.reference_count(ResourceKind::Material, "m"), 0);
        let held = mgr.get_material("m").unwrap();
        assert_eq!(mgr.reference_count(ResourceKind::Material, "m"), 1);
        drop(held);
        assert_eq!(mgr.reference_count(ResourceKind::Material, "missing"), 0);
    }

    #[test]
    fn test_rebind_replaces_entry() {
        let mgr = ResourceManager::new();
        mgr.register_mesh("m", Arc::new(primitives::unit_cube("v1")));
        mgr.register_mesh("m", Arc::new(primitives::unit_quad("v2")));
        assert_eq!(mgr.get_mesh("m").unwrap().name(), "v2");
    }

    #[test]
    fn test_dependency_graph() {
        let mgr = ResourceManager::new();
        let parent = ResourceId::new(ResourceKind::Model, "tank");
        let child = ResourceId::new(ResourceKind::Mesh, "turret");
        mgr.register_dependency(parent.clone(), child.clone());
        mgr.register_dependency(parent.clone(), child.clone());
        assert_eq!(mgr.dependencies_of(&parent).len(), 1);
        mgr.unregister_dependency(&parent, &child);
        assert!(mgr.dependencies_of(&parent).is_empty());
    }

    #[test]
    fn test_clear_kind() {
        let mgr = ResourceManager::new();
        mgr.register_mesh("m", Arc::new(primitives::unit_cube("m")));
        mgr.register_material("mat", Arc::new(Material::new("mat")));
        mgr.clear_kind(ResourceKind::Mesh);
        assert!(!mgr.has_mesh("m"));
        assert!(mgr.has_material("mat"));
        assert_eq!(mgr.total_count(), 1);
    }

    #[test]
    fn test_list_sorted() {
        let mgr = ResourceManager::new();
        mgr.register_mesh("zebra", Arc::new(primitives::unit_cube("zebra")));
        mgr.register_mesh("apple", Arc::new(primitives::unit_cube("apple")));
        assert_eq!(mgr.list_meshes(), vec!["apple", "zebra"]);
    }
}
