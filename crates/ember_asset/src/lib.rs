//! # ember_asset - resource types, manager and async loader
//!
//! The resource layer of the engine:
//! - [`Mesh`], [`Texture`], [`Shader`], [`Material`], [`Model`] with a
//!   two-stage GPU upload lifecycle ([`UploadState`]),
//! - [`ResourceManager`]: name-keyed, reference-counted stores with an
//!   advisory dependency graph,
//! - [`AsyncLoader`]: worker threads for CPU-side decode/parse, drained
//!   on the device thread for uploads and callbacks.
//!
//! # Example
//! ```ignore
//! let manager = Arc::new(ResourceManager::new());
//! let loader = AsyncLoader::new(manager.clone());
//! loader.initialize(None)?;
//! loader.load_mesh_async("assets/tank.obj", "tank", None, 1.0)?;
//! // each frame, on the device thread:
//! loader.process_completed_tasks(&device, 4);
//! ```

pub mod loader;
pub mod manager;
pub mod material;
pub mod mesh;
pub mod model;
pub mod obj;
pub mod primitives;
pub mod shader;
pub mod texture;
pub mod upload;

pub use loader::{
    AsyncLoader, LoadCallback, LoadOutcome, LoadStatus, LoadedResource, LoaderStatsSnapshot,
    TaskId, TaskWork,
};
pub use manager::{ResourceId, ResourceKind, ResourceManager};
pub use material::{LightingParams, Material, RenderStateHints};
pub use mesh::{Mesh, MeshGpu, Vertex};
pub use model::{Model, ModelPart, ModelStats, SkinningData};
pub use shader::{Shader, UniformManager, UniformValue};
pub use texture::Texture;
pub use upload::{UploadState, UploadStateCell};
