//! Render layers
//!
//! A layer is a named bucket with a priority, a sort policy, default
//! pipeline-state overrides and a camera-mask bit. Layers draw in
//! ascending priority; items inside a layer order by the layer's policy.

use ember_gpu::{BlendMode, CullFace, DepthFunc, ScissorRect, Viewport};
use std::collections::HashMap;

/// Identifier for a registered layer
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct LayerId(pub u32);

impl LayerId {
    pub const INVALID: Self = Self(u32::MAX);

    // Well-known default layers
    pub const WORLD_BACKGROUND: Self = Self(0);
    pub const WORLD_MIDGROUND: Self = Self(1);
    pub const WORLD_FOREGROUND: Self = Self(2);
    pub const UI_BACKGROUND: Self = Self(10);
    pub const UI_CONTENT: Self = Self(11);
    pub const UI_OVERLAY: Self = Self(12);
    pub const DEBUG_OVERLAY: Self = Self(20);

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 != u32::MAX
    }
}

impl std::fmt::Debug for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "LayerId({})", self.0)
        } else {
            write!(f, "LayerId(invalid)")
        }
    }
}

/// Where a layer's content lives
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LayerType {
    World,
    ScreenSpace,
    Overlay,
}

/// How items inside one layer are ordered
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SortPolicy {
    /// Opaque first, then by shader and material to minimize state changes
    OpaqueMaterialFirst,
    /// Back-to-front by view-space depth for correct blending
    TransparentDepth,
    /// Explicit sort order, stable across frames
    ScreenSpaceStable,
}

/// Optional pipeline-state overrides layered over material hints
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LayerOverrides {
    pub blend_mode: Option<BlendMode>,
    pub cull_face: Option<CullFace>,
    pub depth_test: Option<bool>,
    pub depth_write: Option<bool>,
    pub depth_func: Option<DepthFunc>,
}

impl LayerOverrides {
    /// `other` wins wherever it specifies a value
    pub fn merged_with(&self, other: &LayerOverrides) -> LayerOverrides {
        LayerOverrides {
            blend_mode: other.blend_mode.or(self.blend_mode),
            cull_face: other.cull_face.or(self.cull_face),
            depth_test: other.depth_test.or(self.depth_test),
            depth_write: other.depth_write.or(self.depth_write),
            depth_func: other.depth_func.or(self.depth_func),
        }
    }
}

/// Immutable layer configuration
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerDescriptor {
    pub name: String,
    pub priority: u32,
    pub layer_type: LayerType,
    pub sort_policy: SortPolicy,
    pub default_overrides: LayerOverrides,
    /// Bit index into the camera's 32-bit layer mask
    pub mask_index: u32,
    pub sort_bias: i32,
}

impl LayerDescriptor {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            layer_type: LayerType::World,
            sort_policy: SortPolicy::OpaqueMaterialFirst,
            default_overrides: LayerOverrides::default(),
            mask_index: 0,
            sort_bias: 0,
        }
    }

    pub fn mask_bit(&self) -> u32 {
        1 << (self.mask_index % 32)
    }
}

/// Mutable per-layer runtime state
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerState {
    pub enabled: bool,
    pub overrides: LayerOverrides,
    pub viewport: Option<Viewport>,
    pub scissor: Option<ScissorRect>,
}

#[derive(Clone, Debug)]
pub struct LayerRecord {
    pub descriptor: LayerDescriptor,
    pub state: LayerState,
}

/// Registry of all layers, keyed by [`LayerId`]
#[derive(Default)]
pub struct LayerRegistry {
    layers: HashMap<LayerId, LayerRecord>,
}

impl LayerRegistry {
    /// Empty registry; call [`set_default_layers`](Self::set_default_layers)
    /// for the standard set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the engine's standard layers, replacing the current set
    pub fn set_default_layers(&mut self) {
        self.layers.clear();
        let defaults = [
            (
                LayerId::WORLD_BACKGROUND,
                LayerDescriptor {
                    mask_index: 0,
                    ..LayerDescriptor::new("world.background", 100)
                },
            ),
            (
                LayerId::WORLD_MIDGROUND,
                LayerDescriptor {
                    mask_index: 1,
                    ..LayerDescriptor::new("world.midground", 200)
                },
            ),
            (
                LayerId::WORLD_FOREGROUND,
                LayerDescriptor {
                    sort_policy: SortPolicy::TransparentDepth,
                    mask_index: 2,
                    default_overrides: LayerOverrides {
                        depth_write: Some(false),
                        ..Default::default()
                    },
                    ..LayerDescriptor::new("world.foreground", 300)
                },
            ),
            (
                LayerId::UI_BACKGROUND,
                LayerDescriptor {
                    layer_type: LayerType::ScreenSpace,
                    sort_policy: SortPolicy::ScreenSpaceStable,
                    mask_index: 3,
                    default_overrides: LayerOverrides {
                        depth_test: Some(false),
                        blend_mode: Some(BlendMode::Alpha),
                        ..Default::default()
                    },
                    ..LayerDescriptor::new("ui.background", 700)
                },
            ),
            (
                LayerId::UI_CONTENT,
                LayerDescriptor {
                    layer_type: LayerType::ScreenSpace,
                    sort_policy: SortPolicy::ScreenSpaceStable,
                    mask_index: 4,
                    default_overrides: LayerOverrides {
                        depth_test: Some(false),
                        blend_mode: Some(BlendMode::Alpha),
                        ..Default::default()
                    },
                    ..LayerDescriptor::new("ui.content", 760)
                },
            ),
            (
                LayerId::UI_OVERLAY,
                LayerDescriptor {
                    layer_type: LayerType::ScreenSpace,
                    sort_policy: SortPolicy::ScreenSpaceStable,
                    mask_index: 5,
                    default_overrides: LayerOverrides {
                        depth_test: Some(false),
                        blend_mode: Some(BlendMode::Alpha),
                        ..Default::default()
                    },
                    ..LayerDescriptor::new("ui.overlay", 820)
                },
            ),
            (
                LayerId::DEBUG_OVERLAY,
                LayerDescriptor {
                    layer_type: LayerType::Overlay,
                    sort_policy: SortPolicy::ScreenSpaceStable,
                    mask_index: 6,
                    default_overrides: LayerOverrides {
                        depth_test: Some(false),
                        ..Default::default()
                    },
                    ..LayerDescriptor::new("debug.overlay", 900)
                },
            ),
        ];
        for (id, descriptor) in defaults {
            self.register_layer(id, descriptor);
        }
    }

    /// Register or replace a layer. Mask indices beyond 31 wrap with a
    /// warning.
    pub fn register_layer(&mut self, id: LayerId, mut descriptor: LayerDescriptor) -> bool {
        if !id.is_valid() {
            log::warn!("refusing to register the invalid layer id");
            return false;
        }
        if descriptor.mask_index > 31 {
            log::warn!(
                "layer '{}' mask index {} wraps to {}",
                descriptor.name,
                descriptor.mask_index,
                descriptor.mask_index % 32
            );
            descriptor.mask_index %= 32;
        }
        let state = LayerState {
            enabled: true,
            overrides: descriptor.default_overrides,
            ..Default::default()
        };
        self.layers.insert(id, LayerRecord { descriptor, state });
        true
    }

    pub fn has_layer(&self, id: LayerId) -> bool {
        self.layers.contains_key(&id)
    }

    pub fn descriptor(&self, id: LayerId) -> Option<&LayerDescriptor> {
        self.layers.get(&id).map(|r| &r.descriptor)
    }

    pub fn state(&self, id: LayerId) -> Option<&LayerState> {
        self.layers.get(&id).map(|r| &r.state)
    }

    pub fn set_enabled(&mut self, id: LayerId, enabled: bool) -> bool {
        match self.layers.get_mut(&id) {
            Some(record) => {
                record.state.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, id: LayerId) -> bool {
        self.layers
            .get(&id)
            .map(|r| r.state.enabled)
            .unwrap_or(false)
    }

    pub fn set_overrides(&mut self, id: LayerId, overrides: LayerOverrides) -> bool {
        match self.layers.get_mut(&id) {
            Some(record) => {
                record.state.overrides = overrides;
                true
            }
            None => false,
        }
    }

    pub fn set_viewport(&mut self, id: LayerId, viewport: Option<Viewport>) -> bool {
        match self.layers.get_mut(&id) {
            Some(record) => {
                record.state.viewport = viewport;
                true
            }
            None => false,
        }
    }

    pub fn set_scissor_rect(&mut self, id: LayerId, scissor: Option<ScissorRect>) -> bool {
        match self.layers.get_mut(&id) {
            Some(record) => {
                record.state.scissor = scissor;
                true
            }
            None => false,
        }
    }

    /// (id, name, priority) for every layer, ascending priority
    pub fn list_layers(&self) -> Vec<(LayerId, String, u32)> {
        let mut layers: Vec<_> = self
            .layers
            .iter()
            .map(|(id, r)| (*id, r.descriptor.name.clone(), r.descriptor.priority))
            .collect();
        layers.sort_by_key(|(id, _, priority)| (*priority, *id));
        layers
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }

    pub fn reset_to_defaults(&mut self) {
        self.set_default_layers();
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_ordered_by_priority() {
        let mut registry = LayerRegistry::new();
        registry.set_default_layers();
        let layers = registry.list_layers();
        assert_eq!(layers.first().map(|l| l.1.as_str()), Some("world.background"));
        assert_eq!(layers.last().map(|l| l.1.as_str()), Some("debug.overlay"));
        assert!(layers.windows(2).all(|w| w[0].2 <= w[1].2));
    }

    #[test]
    fn test_mask_index_wraps() {
        let mut registry = LayerRegistry::new();
        let descriptor = LayerDescriptor {
            mask_index: 35,
            ..LayerDescriptor::new("custom", 50)
        };
        registry.register_layer(LayerId(99), descriptor);
        let desc = registry.descriptor(LayerId(99)).unwrap();
        assert_eq!(desc.mask_index, 3);
        assert_eq!(desc.mask_bit(), 1 << 3);
    }

    #[test]
    fn test_invalid_id_rejected() {
        let mut registry = LayerRegistry::new();
        assert!(!registry.register_layer(LayerId::INVALID, LayerDescriptor::new("x", 1)));
        assert!(!registry.has_layer(LayerId::INVALID));
    }

    #[test]
    fn test_state_mutation() {
        let mut registry = LayerRegistry::new();
        registry.set_default_layers();
        assert!(registry.is_enabled(LayerId::WORLD_MIDGROUND));
        registry.set_enabled(LayerId::WORLD_MIDGROUND, false);
        assert!(!registry.is_enabled(LayerId::WORLD_MIDGROUND));
        assert!(!registry.set_enabled(LayerId(1234), true));
    }

    #[test]
    fn test_override_merge() {
        let base = LayerOverrides {
            depth_test: Some(true),
            blend_mode: Some(BlendMode::Opaque),
            ..Default::default()
        };
        let per_item = LayerOverrides {
            blend_mode: Some(BlendMode::Alpha),
            ..Default::default()
        };
        let merged = base.merged_with(&per_item);
        assert_eq!(merged.blend_mode, Some(BlendMode::Alpha));
        assert_eq!(merged.depth_test, Some(true));
    }

    #[test]
    fn test_reset_after_clear() {
        let mut registry = LayerRegistry::new();
        registry.set_default_layers();
        registry.clear();
        assert!(registry.is_empty());
        registry.reset_to_defaults();
        assert_eq!(registry.len(), 7);
    }
}
