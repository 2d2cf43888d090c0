//! Rendering layer: layers, sort keys, batching, LOD and the renderer
//! facade.
//!
//! The frame pipeline:
//! - systems submit [`Renderable`]s to the [`Renderer`] queue
//! - `flush_render_queue` resolves sort keys, sorts, batches and draws
//! - the state cache in `ember_gpu` filters redundant device calls
//!
//! Batching collapses contiguous compatible runs into instanced or
//! CPU-merged draws; transparent items and per-instance overrides always
//! draw individually in submission order.

pub mod batching;
pub mod camera;
pub mod components;
pub mod layer;
pub mod light;
pub mod lod;
pub mod lod_generator;
pub mod lod_loader;
pub mod renderable;
pub mod renderer;
pub mod sort_key;
pub mod sprite_batch;
pub mod stats;
pub mod systems;

pub use batching::{Batch, BatchList, BatchPath, BatchingManager, BatchingMode, InstanceData};
pub use camera::{ActiveCamera, CameraComponent, Projection};
pub use components::{
    MeshRenderComponent, ModelRenderComponent, SpriteComponent, TextComponent, TextRebuildFn,
};
pub use layer::{
    LayerDescriptor, LayerId, LayerOverrides, LayerRegistry, LayerState, LayerType, SortPolicy,
};
pub use light::{LightComponent, LightFrame, LightType, ResolvedLight};
pub use lod::{
    selection_distance, LodAssets, LodComponent, LodConfig, LodLevel, TextureLodStrategy,
};
pub use lod_generator::{generate_lod_levels, LodGeneratorConfig};
pub use lod_loader::{lod_path, LodLoader, LodSource};
pub use renderable::{
    InstanceOverrides, LodGroup, Renderable, RenderableHeader, RenderableKind, RenderablePayload,
};
pub use renderer::Renderer;
pub use sort_key::{hash_overrides, MaterialSortKey, SortKey};
pub use sprite_batch::{SpriteBatchData, SpriteBatcher};
pub use stats::FrameStats;
pub use systems::{
    register_render_systems, CameraSystem, LightSystem, LodUpdateSystem, MeshRenderSystem,
    ModelRenderSystem, SpriteBatchSystem, TextSystem, UniformSystem,
};
