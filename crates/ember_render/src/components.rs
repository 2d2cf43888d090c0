//! Renderable entity components
//!
//! Thin data holders the render systems read each frame. Asset handles
//! are shared `Arc`s owned by the resource manager.

use crate::layer::LayerId;
use crate::renderable::InstanceOverrides;
use ember_asset::{Material, Mesh, Model, Shader, Texture};
use ember_math::{Color, Vec2};
use std::sync::Arc;

/// Draws a single mesh with a material
#[derive(Clone)]
pub struct MeshRenderComponent {
    pub mesh: Arc<Mesh>,
    pub material: Arc<Material>,
    pub layer: LayerId,
    pub visible: bool,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub overrides: InstanceOverrides,
}

impl MeshRenderComponent {
    pub fn new(mesh: Arc<Mesh>, material: Arc<Material>) -> Self {
        Self {
            mesh,
            material,
            layer: LayerId::WORLD_MIDGROUND,
            visible: true,
            cast_shadows: true,
            receive_shadows: true,
            overrides: InstanceOverrides::default(),
        }
    }

    pub fn with_layer(mut self, layer: LayerId) -> Self {
        self.layer = layer;
        self
    }
}

/// Draws every part of a multi-part model
#[derive(Clone)]
pub struct ModelRenderComponent {
    pub model: Arc<Model>,
    pub layer: LayerId,
    pub visible: bool,
    pub overrides: InstanceOverrides,
}

impl ModelRenderComponent {
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            layer: LayerId::WORLD_MIDGROUND,
            visible: true,
            overrides: InstanceOverrides::default(),
        }
    }
}

/// Screen-space or billboard sprite
#[derive(Clone)]
pub struct SpriteComponent {
    pub texture: Arc<Texture>,
    pub size: Vec2,
    pub uv_rect: [f32; 4],
    pub tint: Color,
    pub layer: LayerId,
    pub visible: bool,
    /// Explicit order inside screen-space layers
    pub sort_order: i32,
}

impl SpriteComponent {
    pub fn new(texture: Arc<Texture>, size: Vec2) -> Self {
        Self {
            texture,
            size,
            uv_rect: [0.0, 0.0, 1.0, 1.0],
            tint: Color::WHITE,
            layer: LayerId::UI_CONTENT,
            visible: true,
            sort_order: 0,
        }
    }
}

/// Regenerates the glyph mesh for the current text contents
pub type TextRebuildFn = dyn Fn(&str) -> Arc<Mesh> + Send + Sync;

/// Pre-rasterized text: glyph quads in `mesh`, atlas in `texture`
#[derive(Clone)]
pub struct TextComponent {
    pub text: String,
    pub texture: Arc<Texture>,
    pub mesh: Arc<Mesh>,
    pub shader: Option<Arc<Shader>>,
    pub color: Color,
    pub layer: LayerId,
    pub visible: bool,
    pub sort_order: i32,
    /// Invoked by the text pass while `dirty` is set, replacing `mesh`
    pub rebuild: Option<Arc<TextRebuildFn>>,
    /// Set after editing `text`; the text pass runs `rebuild` and clears
    /// it. Without a rebuild function the flag stays set so the host can
    /// swap `mesh` itself and clear it.
    pub dirty: bool,
}

impl TextComponent {
    pub fn new(text: impl Into<String>, texture: Arc<Texture>, mesh: Arc<Mesh>) -> Self {
        Self {
            text: text.into(),
            texture,
            mesh,
            shader: None,
            color: Color::WHITE,
            layer: LayerId::UI_OVERLAY,
            visible: true,
            sort_order: 0,
            rebuild: None,
            dirty: false,
        }
    }

    pub fn with_rebuild(mut self, rebuild: Arc<TextRebuildFn>) -> Self {
        self.rebuild = Some(rebuild);
        self
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text != self.text {
            self.text = text;
            self.dirty = true;
        }
    }
}
