//! Sort keys for the render queue
//!
//! Submission order is `(layer priority, layer sort bias, policy-specific
//! order, submission index)`. The material key also doubles as the
//! pipeline identity used by the batcher: two items with equal keys can
//! share all bind state.

use crate::layer::SortPolicy;
use ember_gpu::{BlendMode, CullFace};
use std::cmp::Ordering;

/// Pipeline flag bits carried in the material key
pub mod pipeline_flags {
    pub const CAST_SHADOWS: u16 = 1 << 0;
    pub const RECEIVE_SHADOWS: u16 = 1 << 1;
    pub const SCREEN_SPACE: u16 = 1 << 2;
}

/// Identity of the pipeline state a renderable needs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct MaterialSortKey {
    pub screen_space: bool,
    pub blend_mode: BlendMode,
    pub cull_face: CullFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub shader_id: u32,
    pub material_id: u32,
    pub pipeline_flags: u16,
    /// Stable hash of per-instance overrides (tint, opacity, textures)
    pub override_hash: u64,
}

impl MaterialSortKey {
    pub fn is_translucent(&self) -> bool {
        self.blend_mode.is_translucent()
    }
}

/// Full per-item ordering key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub layer_priority: u32,
    pub sort_bias: i32,
    pub policy: SortPolicy,
    pub material: MaterialSortKey,
    /// Quantized view-space depth, larger is farther from the camera
    pub depth_key: i64,
    /// Explicit order for screen-space layers
    pub sort_order: i32,
    pub texture_id: u32,
    /// Final tiebreak; preserves submission order inside a batch run
    pub submission_index: u32,
}

impl SortKey {
    /// Quantize a view-space distance for depth ordering
    pub fn depth_key_for(view_depth: f32) -> i64 {
        (view_depth.clamp(-1.0e6, 1.0e6) * 1024.0) as i64
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.layer_priority
            .cmp(&other.layer_priority)
            .then_with(|| self.sort_bias.cmp(&other.sort_bias))
            .then_with(|| match self.policy {
                SortPolicy::OpaqueMaterialFirst => self
                    .material
                    .blend_mode
                    .cmp(&other.material.blend_mode)
                    .then_with(|| self.material.shader_id.cmp(&other.material.shader_id))
                    .then_with(|| self.material.material_id.cmp(&other.material.material_id))
                    .then_with(|| self.material.override_hash.cmp(&other.material.override_hash)),
                SortPolicy::TransparentDepth => self
                    .material
                    .blend_mode
                    .cmp(&other.material.blend_mode)
                    // Back to front: larger depth first
                    .then_with(|| other.depth_key.cmp(&self.depth_key))
                    .then_with(|| self.material.shader_id.cmp(&other.material.shader_id)),
                SortPolicy::ScreenSpaceStable => self
                    .sort_order
                    .cmp(&other.sort_order)
                    .then_with(|| self.material.shader_id.cmp(&other.material.shader_id))
                    .then_with(|| self.texture_id.cmp(&other.texture_id)),
            })
            .then_with(|| self.submission_index.cmp(&other.submission_index))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Stable per-process hash of per-instance override values
pub fn hash_overrides(parts: &[u64]) -> u64 {
    // FNV-1a, deterministic across runs unlike the std RandomState hasher
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for part in parts {
        for byte in part.to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(priority: u32, policy: SortPolicy) -> SortKey {
        SortKey {
            layer_priority: priority,
            sort_bias: 0,
            policy,
            material: MaterialSortKey::default(),
            depth_key: 0,
            sort_order: 0,
            texture_id: 0,
            submission_index: 0,
        }
    }

    #[test]
    fn test_layer_priority_dominates() {
        let mut a = key(100, SortPolicy::OpaqueMaterialFirst);
        let b = key(200, SortPolicy::OpaqueMaterialFirst);
        a.material.shader_id = 999;
        assert!(a < b);
    }

    #[test]
    fn test_opaque_before_translucent() {
        let mut opaque = key(100, SortPolicy::OpaqueMaterialFirst);
        let mut alpha = key(100, SortPolicy::OpaqueMaterialFirst);
        opaque.material.blend_mode = BlendMode::Opaque;
        alpha.material.blend_mode = BlendMode::Alpha;
        assert!(opaque < alpha);
    }

    #[test]
    fn test_transparent_back_to_front() {
        let mut near = key(300, SortPolicy::TransparentDepth);
        let mut far = key(300, SortPolicy::TransparentDepth);
        near.material.blend_mode = BlendMode::Alpha;
        far.material.blend_mode = BlendMode::Alpha;
        near.depth_key = SortKey::depth_key_for(5.0);
        far.depth_key = SortKey::depth_key_for(50.0);
        assert!(far < near);
    }

    #[test]
    fn test_screen_space_stable_order() {
        let mut a = key(700, SortPolicy::ScreenSpaceStable);
        let mut b = key(700, SortPolicy::ScreenSpaceStable);
        a.sort_order = 2;
        b.sort_order = 1;
        assert!(b < a);
    }

    #[test]
    fn test_submission_index_breaks_ties() {
        let mut a = key(100, SortPolicy::OpaqueMaterialFirst);
        let mut b = key(100, SortPolicy::OpaqueMaterialFirst);
        a.submission_index = 0;
        b.submission_index = 1;
        assert!(a < b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_identical_inputs_identical_keys() {
        let a = hash_overrides(&[1, 2, 3]);
        let b = hash_overrides(&[1, 2, 3]);
        let c = hash_overrides(&[1, 2, 4]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
