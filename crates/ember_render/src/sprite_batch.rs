//! CPU-side sprite grouping
//!
//! Visible sprites are folded into per-(texture, layer) groups during
//! the sprite pass; every group becomes one pre-built instanced
//! submission, so the render queue sees a handful of batch renderables
//! instead of one item per sprite. Instances within a group are ordered
//! by their explicit sort order.

use crate::batching::InstanceData;
use crate::layer::LayerId;
use ember_asset::Texture;
use ember_math::{Color, Mat4, Vec2, Vec3};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// One drained group, ready to submit as a batch renderable
pub struct SpriteBatchData {
    pub texture: Arc<Texture>,
    pub layer: LayerId,
    /// Smallest sort order among the grouped sprites
    pub sort_order: i32,
    pub instances: Vec<InstanceData>,
}

struct Group {
    texture: Arc<Texture>,
    layer: LayerId,
    sprites: Vec<(i32, InstanceData)>,
}

/// Per-frame sprite accumulator. Grouping key is the texture object and
/// the target layer; blend state is uniform across sprites (alpha).
#[derive(Default)]
pub struct SpriteBatcher {
    groups: HashMap<(usize, LayerId), Group>,
    // first-seen order keeps draining deterministic
    order: Vec<(usize, LayerId)>,
}

impl SpriteBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one sprite. `world` positions the unit quad; `size` scales
    /// it in the quad's plane.
    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        texture: &Arc<Texture>,
        layer: LayerId,
        world: &Mat4,
        size: Vec2,
        uv_rect: [f32; 4],
        tint: Color,
        sort_order: i32,
    ) {
        let model = *world * Mat4::from_scale(Vec3::new(size.x, size.y, 1.0));
        let instance = InstanceData::new(model.to_array(), uv_rect, tint.to_array());
        let key = (Arc::as_ptr(texture) as usize, layer);
        match self.groups.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().sprites.push((sort_order, instance)),
            Entry::Vacant(entry) => {
                self.order.push(key);
                entry.insert(Group {
                    texture: Arc::clone(texture),
                    layer,
                    sprites: vec![(sort_order, instance)],
                });
            }
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn sprite_count(&self) -> usize {
        self.groups.values().map(|g| g.sprites.len()).sum()
    }

    /// Drain groups in first-seen order, instances sorted by sort order
    /// (stable, so submission order breaks ties)
    pub fn drain(&mut self) -> Vec<SpriteBatchData> {
        let mut out = Vec::with_capacity(self.order.len());
        for key in self.order.drain(..) {
            let Some(mut group) = self.groups.remove(&key) else {
                continue;
            };
            group.sprites.sort_by_key(|(order, _)| *order);
            out.push(SpriteBatchData {
                texture: group.texture,
                layer: group.layer,
                sort_order: group.sprites.first().map(|(order, _)| *order).unwrap_or(0),
                instances: group.sprites.into_iter().map(|(_, i)| i).collect(),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atlas(name: &str) -> Arc<Texture> {
        Arc::new(Texture::solid(name, [255; 4]))
    }

    #[test]
    fn test_same_texture_and_layer_share_one_group() {
        let mut batcher = SpriteBatcher::new();
        let texture = atlas("atlas");
        for i in 0..3 {
            batcher.push(
                &texture,
                LayerId::UI_CONTENT,
                &Mat4::from_translation(Vec3::new(i as f32 * 10.0, 0.0, 0.0)),
                Vec2::new(16.0, 8.0),
                [0.0, 0.0, 1.0, 1.0],
                Color::WHITE,
                0,
            );
        }
        assert_eq!(batcher.group_count(), 1);
        assert_eq!(batcher.sprite_count(), 3);

        let batches = batcher.drain();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].instances.len(), 3);
        // Size is folded into the per-instance model
        assert_eq!(batches[0].instances[0].model[0], 16.0);
        assert_eq!(batches[0].instances[0].model[5], 8.0);
        // Drained batcher is empty again
        assert_eq!(batcher.sprite_count(), 0);
    }

    #[test]
    fn test_distinct_textures_split_groups() {
        let mut batcher = SpriteBatcher::new();
        let a = atlas("a");
        let b = atlas("b");
        let quad = Mat4::IDENTITY;
        batcher.push(&a, LayerId::UI_CONTENT, &quad, Vec2::new(1.0, 1.0), [0.0; 4], Color::WHITE, 0);
        batcher.push(&b, LayerId::UI_CONTENT, &quad, Vec2::new(1.0, 1.0), [0.0; 4], Color::WHITE, 0);
        batcher.push(&a, LayerId::UI_OVERLAY, &quad, Vec2::new(1.0, 1.0), [0.0; 4], Color::WHITE, 0);
        assert_eq!(batcher.group_count(), 3);
    }

    #[test]
    fn test_instances_follow_sort_order() {
        let mut batcher = SpriteBatcher::new();
        let texture = atlas("atlas");
        for (order, u) in [(5, 0.5f32), (1, 0.1), (3, 0.3)] {
            batcher.push(
                &texture,
                LayerId::UI_CONTENT,
                &Mat4::IDENTITY,
                Vec2::new(1.0, 1.0),
                [u, 0.0, 1.0, 1.0],
                Color::WHITE,
                order,
            );
        }
        let batches = batcher.drain();
        assert_eq!(batches[0].sort_order, 1);
        let us: Vec<f32> = batches[0].instances.iter().map(|i| i.uv_rect[0]).collect();
        assert_eq!(us, vec![0.1, 0.3, 0.5]);
    }

    #[test]
    fn test_tint_and_uv_reach_instances() {
        let mut batcher = SpriteBatcher::new();
        let texture = atlas("atlas");
        batcher.push(
            &texture,
            LayerId::UI_CONTENT,
            &Mat4::IDENTITY,
            Vec2::new(1.0, 1.0),
            [0.25, 0.5, 0.75, 1.0],
            Color::new(1.0, 0.5, 0.0, 0.8),
            0,
        );
        let batches = batcher.drain();
        assert_eq!(batches[0].instances[0].uv_rect, [0.25, 0.5, 0.75, 1.0]);
        assert_eq!(batches[0].instances[0].tint, [1.0, 0.5, 0.0, 0.8]);
    }
}
