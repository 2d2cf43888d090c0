//! Render queue submissions
//!
//! A renderable is a tagged variant with a small common header; the
//! batcher switches on the tag in its outer loop instead of dispatching
//! through trait objects.

use crate::batching::InstanceData;
use crate::layer::LayerId;
use crate::lod::LodLevel;
use crate::sort_key::{hash_overrides, MaterialSortKey};
use ember_asset::{Material, Mesh, Model, Shader, Texture};
use ember_math::{Color, Mat4, Vec2, Vec3};
use std::sync::Arc;

/// Per-instance appearance overrides. Any set field changes the pipeline
/// identity and therefore breaks instancing eligibility.
#[derive(Clone, Debug, Default)]
pub struct InstanceOverrides {
    pub tint: Option<Color>,
    pub opacity: Option<f32>,
    pub texture: Option<Arc<Texture>>,
}

impl InstanceOverrides {
    pub fn is_empty(&self) -> bool {
        self.tint.is_none() && self.opacity.is_none() && self.texture.is_none()
    }

    /// Stable hash folded into the material sort key
    pub fn hash(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let mut parts = Vec::with_capacity(6);
        if let Some(tint) = self.tint {
            parts.push(tint.r.to_bits() as u64 | ((tint.g.to_bits() as u64) << 32));
            parts.push(tint.b.to_bits() as u64 | ((tint.a.to_bits() as u64) << 32));
        }
        if let Some(opacity) = self.opacity {
            parts.push(opacity.to_bits() as u64);
        }
        if let Some(texture) = &self.texture {
            parts.push(texture.handle().raw() as u64 | 1 << 63);
        }
        hash_overrides(&parts)
    }
}

/// Tags an item as one LOD level of a shared source asset, so instanced
/// draws never mix levels of the same asset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LodGroup {
    /// Stable id of the source asset (hash of its name)
    pub asset_id: u64,
    pub level: LodLevel,
}

/// Common submission fields shared by every variant
#[derive(Clone, Debug)]
pub struct RenderableHeader {
    pub world_matrix: Mat4,
    pub layer: LayerId,
    pub visible: bool,
    pub transparent_hint: bool,
    /// Precomputed key; the queue computes one when absent
    pub sort_key: Option<MaterialSortKey>,
    /// Explicit order inside screen-space layers
    pub sort_order: i32,
    pub overrides: InstanceOverrides,
    pub lod_group: Option<LodGroup>,
}

impl RenderableHeader {
    pub fn new(world_matrix: Mat4, layer: LayerId) -> Self {
        Self {
            world_matrix,
            layer,
            visible: true,
            transparent_hint: false,
            sort_key: None,
            sort_order: 0,
            overrides: InstanceOverrides::default(),
            lod_group: None,
        }
    }
}

/// Discriminator used in batch keys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderableKind {
    Mesh,
    Model,
    Sprite,
    Text,
    Custom,
}

/// Variant payloads
#[derive(Clone)]
pub enum RenderablePayload {
    Mesh {
        mesh: Arc<Mesh>,
        material: Arc<Material>,
    },
    /// One part of a model; the header's world matrix already includes
    /// the part's local transform
    Model {
        model: Arc<Model>,
        part_index: usize,
    },
    /// A pre-built group of sprites sharing one texture atlas; each
    /// instance carries its own model matrix, UV rect and tint and the
    /// whole group draws as one instanced quad
    Sprite {
        texture: Arc<Texture>,
        instances: Vec<InstanceData>,
    },
    Text {
        text: String,
        texture: Arc<Texture>,
        mesh: Arc<Mesh>,
        shader: Option<Arc<Shader>>,
    },
    Custom {
        tag: String,
        mesh: Arc<Mesh>,
        material: Arc<Material>,
    },
}

/// The unit of submission to the render queue
#[derive(Clone)]
pub struct Renderable {
    pub header: RenderableHeader,
    pub payload: RenderablePayload,
}

impl Renderable {
    pub fn mesh(mesh: Arc<Mesh>, material: Arc<Material>, world: Mat4, layer: LayerId) -> Self {
        Self {
            header: RenderableHeader::new(world, layer),
            payload: RenderablePayload::Mesh { mesh, material },
        }
    }

    pub fn model_part(model: Arc<Model>, part_index: usize, world: Mat4, layer: LayerId) -> Self {
        Self {
            header: RenderableHeader::new(world, layer),
            payload: RenderablePayload::Model { model, part_index },
        }
    }

    /// A single sprite: one instance scaled to `size` on the unit quad
    pub fn sprite(texture: Arc<Texture>, size: Vec2, world: Mat4, layer: LayerId) -> Self {
        let model = world * Mat4::from_scale(Vec3::new(size.x, size.y, 1.0));
        let instance = InstanceData::new(
            model.to_array(),
            [0.0, 0.0, 1.0, 1.0],
            Color::WHITE.to_array(),
        );
        Self::sprite_batch(texture, vec![instance], layer)
    }

    /// A pre-built sprite group; the header matrix stays identity since
    /// every instance carries its own model
    pub fn sprite_batch(
        texture: Arc<Texture>,
        instances: Vec<InstanceData>,
        layer: LayerId,
    ) -> Self {
        Self {
            header: RenderableHeader {
                transparent_hint: true,
                ..RenderableHeader::new(Mat4::IDENTITY, layer)
            },
            payload: RenderablePayload::Sprite { texture, instances },
        }
    }

    pub fn text(
        text: impl Into<String>,
        texture: Arc<Texture>,
        mesh: Arc<Mesh>,
        world: Mat4,
        layer: LayerId,
    ) -> Self {
        Self {
            header: RenderableHeader {
                transparent_hint: true,
                ..RenderableHeader::new(world, layer)
            },
            payload: RenderablePayload::Text {
                text: text.into(),
                texture,
                mesh,
                shader: None,
            },
        }
    }

    pub fn kind(&self) -> RenderableKind {
        match &self.payload {
            RenderablePayload::Mesh { .. } => RenderableKind::Mesh,
            RenderablePayload::Model { .. } => RenderableKind::Model,
            RenderablePayload::Sprite { .. } => RenderableKind::Sprite,
            RenderablePayload::Text { .. } => RenderableKind::Text,
            RenderablePayload::Custom { .. } => RenderableKind::Custom,
        }
    }

    /// The mesh and material this item draws with, when the variant has
    /// both (sprites and text resolve through their own paths).
    pub fn mesh_and_material(&self) -> Option<(Arc<Mesh>, Arc<Material>)> {
        match &self.payload {
            RenderablePayload::Mesh { mesh, material }
            | RenderablePayload::Custom { mesh, material, .. } => {
                Some((Arc::clone(mesh), Arc::clone(material)))
            }
            RenderablePayload::Model { model, part_index } => model.access_parts(|parts| {
                parts
                    .get(*part_index)
                    .map(|p| (Arc::clone(&p.mesh), Arc::clone(&p.material)))
            }),
            RenderablePayload::Sprite { .. } | RenderablePayload::Text { .. } => None,
        }
    }

    /// Whether this item must draw in the transparent phase
    pub fn is_transparent(&self) -> bool {
        if self.header.transparent_hint {
            return true;
        }
        if let Some(opacity) = self.header.overrides.opacity {
            if opacity < 1.0 {
                return true;
            }
        }
        match self.mesh_and_material() {
            Some((_, material)) => material.is_translucent(),
            None => false,
        }
    }
}

impl std::fmt::Debug for Renderable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderable")
            .field("kind", &self.kind())
            .field("layer", &self.header.layer)
            .field("visible", &self.header.visible)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_asset::primitives;
    use ember_gpu::BlendMode;

    fn cube_renderable() -> Renderable {
        Renderable::mesh(
            Arc::new(primitives::unit_cube("c")),
            Arc::new(Material::new("m")),
            Mat4::IDENTITY,
            LayerId::WORLD_MIDGROUND,
        )
    }

    #[test]
    fn test_override_hash_distinguishes_tints() {
        let mut a = InstanceOverrides::default();
        let mut b = InstanceOverrides::default();
        assert_eq!(a.hash(), b.hash());
        a.tint = Some(Color::rgb(1.0, 0.0, 0.0));
        b.tint = Some(Color::rgb(0.0, 1.0, 0.0));
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), 0);
    }

    #[test]
    fn test_transparency_from_material() {
        let r = cube_renderable();
        assert!(!r.is_transparent());

        let material = Arc::new(Material::new("glass"));
        material.set_blend_mode(BlendMode::Alpha);
        let glass = Renderable::mesh(
            Arc::new(primitives::unit_cube("c")),
            material,
            Mat4::IDENTITY,
            LayerId::WORLD_FOREGROUND,
        );
        assert!(glass.is_transparent());
    }

    #[test]
    fn test_transparency_from_opacity_override() {
        let mut r = cube_renderable();
        r.header.overrides.opacity = Some(0.4);
        assert!(r.is_transparent());
    }

    #[test]
    fn test_model_part_resolution() {
        let mesh = Arc::new(primitives::unit_cube("part"));
        let material = Arc::new(Material::new("m"));
        let model = Arc::new(Model::new("model"));
        model.add_part(ember_asset::ModelPart::new(
            "part",
            Arc::clone(&mesh),
            material,
        ));
        let r = Renderable::model_part(model, 0, Mat4::IDENTITY, LayerId::WORLD_MIDGROUND);
        let (resolved, _) = r.mesh_and_material().unwrap();
        assert!(Arc::ptr_eq(&resolved, &mesh));
        assert_eq!(r.kind(), RenderableKind::Model);
    }
}
