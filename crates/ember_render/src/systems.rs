//! Render-side ECS systems
//!
//! Execution order per frame: camera (20), lights (30), uniforms (40),
//! LOD selection (95), then the submission systems at 100. Transform
//! propagation runs earlier at priority 10 in `ember_ecs`.

use crate::camera::{ActiveCamera, CameraComponent};
use crate::components::{
    MeshRenderComponent, ModelRenderComponent, SpriteComponent, TextComponent,
};
use crate::layer::LayerId;
use crate::light::{LightComponent, LightFrame, LightType, ResolvedLight};
use crate::lod::{selection_distance, LodComponent, LodLevel};
use crate::renderable::{LodGroup, Renderable, RenderableHeader, RenderablePayload};
use crate::renderer::Renderer;
use crate::sort_key::hash_overrides;
use crate::sprite_batch::SpriteBatcher;
use ember_asset::{ResourceManager, UniformValue};
use ember_ecs::{Entity, System, TransformComponent, World};
use ember_math::{radians, Vec3};
use std::any::Any;
use std::sync::Arc;

pub const CAMERA_SYSTEM_PRIORITY: i32 = 20;
pub const LIGHT_SYSTEM_PRIORITY: i32 = 30;
pub const UNIFORM_SYSTEM_PRIORITY: i32 = 40;
pub const LOD_SYSTEM_PRIORITY: i32 = 95;
pub const SUBMIT_SYSTEM_PRIORITY: i32 = 100;

/// Picks the frame's camera: the active camera with the highest depth,
/// entity order breaking ties. Publishes the snapshot on the renderer.
pub struct CameraSystem {
    renderer: Arc<Renderer>,
    aspect: f32,
}

impl CameraSystem {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self {
            renderer,
            aspect: 16.0 / 9.0,
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }
}

impl System for CameraSystem {
    fn name(&self) -> &str {
        "camera"
    }

    fn priority(&self) -> i32 {
        CAMERA_SYSTEM_PRIORITY
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        let mut best: Option<(i32, Entity)> = None;
        for entity in world.query2::<TransformComponent, CameraComponent>() {
            if !world.is_active(entity) {
                continue;
            }
            let Some(camera) = world.get_component::<CameraComponent>(entity) else {
                continue;
            };
            if !camera.active {
                continue;
            }
            if best.map(|(depth, _)| camera.depth > depth).unwrap_or(true) {
                best = Some((camera.depth, entity));
            }
        }

        let Some((_, entity)) = best else {
            self.renderer.set_active_camera(None);
            return;
        };
        let (Some(transform), Some(camera)) = (
            world.get_component::<TransformComponent>(entity),
            world.get_component::<CameraComponent>(entity),
        ) else {
            self.renderer.set_active_camera(None);
            return;
        };

        let world_matrix = transform.world_matrix();
        if let Some(color) = camera.clear_color {
            self.renderer.set_clear_color(color);
        }
        self.renderer.set_active_camera(Some(ActiveCamera {
            entity,
            position: transform.world_position(),
            view: world_matrix.inverse(),
            projection: camera.projection_matrix(self.aspect),
            layer_mask: camera.layer_mask,
            max_sight_distance: camera.max_sight_distance,
        }));
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Gathers lights, culls by fade distance, sorts by priority and fills
/// the per-frame capped snapshot.
pub struct LightSystem {
    renderer: Arc<Renderer>,
    pub ambient: ember_math::Color,
}

impl LightSystem {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self {
            renderer,
            ambient: ember_math::Color::new(0.1, 0.1, 0.1, 1.0),
        }
    }
}

impl System for LightSystem {
    fn name(&self) -> &str {
        "lights"
    }

    fn priority(&self) -> i32 {
        LIGHT_SYSTEM_PRIORITY
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        let camera_pos = self
            .renderer
            .active_camera()
            .map(|c| c.position)
            .unwrap_or(Vec3::ZERO);

        struct Candidate {
            light: ResolvedLight,
            priority: i32,
            distance: f32,
        }
        let mut candidates: Vec<Candidate> = Vec::new();

        for entity in world.query2::<TransformComponent, LightComponent>() {
            if !world.is_active(entity) {
                continue;
            }
            let (Some(transform), Some(light)) = (
                world.get_component::<TransformComponent>(entity),
                world.get_component::<LightComponent>(entity),
            ) else {
                continue;
            };
            if !light.enabled || light.intensity <= 0.0 {
                continue;
            }
            let position = transform.world_position();
            let distance = position.distance(camera_pos);
            if light.light_type != LightType::Directional && distance > light.fade_distance {
                continue;
            }
            let direction = transform
                .world_matrix()
                .transform_vector(Vec3::NEG_Z)
                .normalize_or(Vec3::NEG_Z);
            candidates.push(Candidate {
                light: ResolvedLight {
                    light_type: light.light_type,
                    position,
                    direction,
                    color: light.color,
                    intensity: light.intensity,
                    range: light.range,
                    cos_inner: radians(light.inner_angle_degrees).cos(),
                    cos_outer: radians(light.outer_angle_degrees).cos(),
                },
                priority: light.priority,
                distance,
            });
        }

        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.light.intensity.total_cmp(&a.light.intensity))
                .then_with(|| a.distance.total_cmp(&b.distance))
        });

        let mut frame = LightFrame {
            ambient: self.ambient,
            ..Default::default()
        };
        for candidate in candidates {
            frame.push(candidate.light);
        }
        self.renderer.set_light_frame(frame);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Pushes the frame's view, projection and lighting uniforms into every
/// registered shader's uniform cache.
pub struct UniformSystem {
    renderer: Arc<Renderer>,
    resources: Arc<ResourceManager>,
}

impl UniformSystem {
    pub fn new(renderer: Arc<Renderer>, resources: Arc<ResourceManager>) -> Self {
        Self {
            renderer,
            resources,
        }
    }
}

impl System for UniformSystem {
    fn name(&self) -> &str {
        "uniforms"
    }

    fn priority(&self) -> i32 {
        UNIFORM_SYSTEM_PRIORITY
    }

    fn update(&mut self, _world: &mut World, _dt: f32) {
        let camera = self.renderer.active_camera();
        let lights = self.renderer.light_frame();

        self.resources.for_each_shader(|_, shader| {
            if let Some(camera) = &camera {
                shader.set_mat4("u_view", &camera.view);
                shader.set_mat4("u_projection", &camera.projection);
                shader.set_uniform("u_camera_pos", UniformValue::Vec3(camera.position));
            }
            shader.set_color("u_ambient_color", lights.ambient);
            shader.set_int("u_directional_count", lights.directional.len() as i32);
            shader.set_int("u_point_count", lights.point.len() as i32);
            shader.set_int("u_spot_count", lights.spot.len() as i32);
            for (i, light) in lights.directional.iter().enumerate() {
                shader.set_uniform(
                    &format!("u_directional[{i}].direction"),
                    UniformValue::Vec3(light.direction),
                );
                shader.set_color(&format!("u_directional[{i}].color"), light.color);
                shader.set_float(&format!("u_directional[{i}].intensity"), light.intensity);
            }
            for (i, light) in lights.point.iter().enumerate() {
                shader.set_uniform(
                    &format!("u_point[{i}].position"),
                    UniformValue::Vec3(light.position),
                );
                shader.set_color(&format!("u_point[{i}].color"), light.color);
                shader.set_float(&format!("u_point[{i}].intensity"), light.intensity);
                shader.set_float(&format!("u_point[{i}].range"), light.range);
            }
            for (i, light) in lights.spot.iter().enumerate() {
                shader.set_uniform(
                    &format!("u_spot[{i}].position"),
                    UniformValue::Vec3(light.position),
                );
                shader.set_uniform(
                    &format!("u_spot[{i}].direction"),
                    UniformValue::Vec3(light.direction),
                );
                shader.set_color(&format!("u_spot[{i}].color"), light.color);
                shader.set_float(&format!("u_spot[{i}].intensity"), light.intensity);
                shader.set_float(&format!("u_spot[{i}].cos_inner"), light.cos_inner);
                shader.set_float(&format!("u_spot[{i}].cos_outer"), light.cos_outer);
            }
        });
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Distance-based LOD selection, before the submission systems so they
/// see this frame's levels.
pub struct LodUpdateSystem {
    renderer: Arc<Renderer>,
}

impl LodUpdateSystem {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self { renderer }
    }
}

impl System for LodUpdateSystem {
    fn name(&self) -> &str {
        "lod"
    }

    fn priority(&self) -> i32 {
        LOD_SYSTEM_PRIORITY
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        let Some(camera) = self.renderer.active_camera() else {
            return;
        };
        for entity in world.query2::<TransformComponent, LodComponent>() {
            if !world.is_active(entity) {
                continue;
            }
            let Some(transform) = world.get_component::<TransformComponent>(entity) else {
                continue;
            };
            let world_matrix = transform.world_matrix();
            let world_pos = transform.world_position();

            let Some(lod) = world.get_component::<LodComponent>(entity) else {
                continue;
            };
            let bounds = lod.config.levels[0]
                .mesh
                .as_ref()
                .map(|mesh| mesh.bounds().transformed(&world_matrix));
            let scale = lod.config.bounding_box_scale;
            let distance =
                selection_distance(camera.position, world_pos, bounds.as_ref(), scale);

            if let Some(lod) = world.get_component_mut::<LodComponent>(entity) {
                if lod.update(distance) {
                    log::trace!(
                        "entity {entity:?} switched to {:?} at distance {distance:.1}",
                        lod.current()
                    );
                }
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Shared gating for the submission systems
fn passes_camera(
    renderer: &Renderer,
    camera: &ActiveCamera,
    layer: LayerId,
    world_pos: Vec3,
) -> bool {
    let mask_bit = renderer.with_layers(|layers| layers.descriptor(layer).map(|d| d.mask_bit()));
    let Some(mask_bit) = mask_bit else {
        return false;
    };
    if camera.layer_mask & mask_bit == 0 {
        return false;
    }
    let limit = camera.max_sight_distance;
    world_pos.distance_squared(camera.position) <= limit * limit
}

/// Stable id for LOD grouping, derived from the source mesh name
fn lod_asset_id(name: &str) -> u64 {
    let parts: Vec<u64> = name.bytes().map(|b| b as u64).collect();
    hash_overrides(&parts)
}

/// Submits mesh renderables, resolving per-entity LOD
pub struct MeshRenderSystem {
    renderer: Arc<Renderer>,
}

impl MeshRenderSystem {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self { renderer }
    }
}

impl System for MeshRenderSystem {
    fn name(&self) -> &str {
        "mesh_render"
    }

    fn priority(&self) -> i32 {
        SUBMIT_SYSTEM_PRIORITY
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        let Some(camera) = self.renderer.active_camera() else {
            return;
        };
        for entity in world.query2::<TransformComponent, MeshRenderComponent>() {
            if !world.is_active(entity) {
                continue;
            }
            let (Some(transform), Some(render)) = (
                world.get_component::<TransformComponent>(entity),
                world.get_component::<MeshRenderComponent>(entity),
            ) else {
                continue;
            };
            if !render.visible {
                self.renderer.note_culled(1);
                continue;
            }
            let world_pos = transform.world_position();
            if !passes_camera(&self.renderer, &camera, render.layer, world_pos) {
                self.renderer.note_culled(1);
                continue;
            }

            let mut mesh = Arc::clone(&render.mesh);
            let mut material = Arc::clone(&render.material);
            let mut lod_group = None;
            if let Some(lod) = world.get_component::<LodComponent>(entity) {
                let level = lod.current();
                self.renderer.note_lod_level(level);
                if level == LodLevel::Culled {
                    self.renderer.note_culled(1);
                    continue;
                }
                if let Some(lod_mesh) = lod.config.resolve_mesh(level) {
                    mesh = lod_mesh;
                }
                if let Some(lod_material) = lod.config.resolve_material(level) {
                    material = lod_material;
                }
                lod_group = Some(LodGroup {
                    asset_id: lod_asset_id(render.mesh.name()),
                    level,
                });
            }

            let mut renderable =
                Renderable::mesh(mesh, material, transform.world_matrix(), render.layer);
            renderable.header.overrides = render.overrides.clone();
            renderable.header.lod_group = lod_group;
            self.renderer.submit_renderable(renderable);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Submits one renderable per model part
pub struct ModelRenderSystem {
    renderer: Arc<Renderer>,
}

impl ModelRenderSystem {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self { renderer }
    }
}

impl System for ModelRenderSystem {
    fn name(&self) -> &str {
        "model_render"
    }

    fn priority(&self) -> i32 {
        SUBMIT_SYSTEM_PRIORITY
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        let Some(camera) = self.renderer.active_camera() else {
            return;
        };
        for entity in world.query2::<TransformComponent, ModelRenderComponent>() {
            if !world.is_active(entity) {
                continue;
            }
            let (Some(transform), Some(render)) = (
                world.get_component::<TransformComponent>(entity),
                world.get_component::<ModelRenderComponent>(entity),
            ) else {
                continue;
            };
            if !render.visible {
                self.renderer.note_culled(1);
                continue;
            }
            let world_matrix = transform.world_matrix();
            if !passes_camera(
                &self.renderer,
                &camera,
                render.layer,
                transform.world_position(),
            ) {
                self.renderer.note_culled(1);
                continue;
            }

            let part_count = render.model.access_parts(|parts| parts.len());
            for part_index in 0..part_count {
                let part_world = render.model.access_parts(|parts| {
                    parts.get(part_index).map(|p| world_matrix * p.local_transform)
                });
                let Some(part_world) = part_world else {
                    continue;
                };
                let mut renderable = Renderable::model_part(
                    Arc::clone(&render.model),
                    part_index,
                    part_world,
                    render.layer,
                );
                renderable.header.overrides = render.overrides.clone();
                self.renderer.submit_renderable(renderable);
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Folds visible sprites into per-(texture, layer) groups and submits
/// one pre-built instanced batch renderable per group
pub struct SpriteBatchSystem {
    renderer: Arc<Renderer>,
    batcher: SpriteBatcher,
}

impl SpriteBatchSystem {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self {
            renderer,
            batcher: SpriteBatcher::new(),
        }
    }
}

impl System for SpriteBatchSystem {
    fn name(&self) -> &str {
        "sprites"
    }

    fn priority(&self) -> i32 {
        SUBMIT_SYSTEM_PRIORITY
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        for entity in world.query2::<TransformComponent, SpriteComponent>() {
            if !world.is_active(entity) {
                continue;
            }
            let (Some(transform), Some(sprite)) = (
                world.get_component::<TransformComponent>(entity),
                world.get_component::<SpriteComponent>(entity),
            ) else {
                continue;
            };
            if !sprite.visible {
                self.renderer.note_culled(1);
                continue;
            }
            self.batcher.push(
                &sprite.texture,
                sprite.layer,
                &transform.world_matrix(),
                sprite.size,
                sprite.uv_rect,
                sprite.tint,
                sprite.sort_order,
            );
        }
        for batch in self.batcher.drain() {
            let mut renderable =
                Renderable::sprite_batch(batch.texture, batch.instances, batch.layer);
            renderable.header.sort_order = batch.sort_order;
            self.renderer.submit_renderable(renderable);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Submits pre-rasterized text meshes
pub struct TextSystem {
    renderer: Arc<Renderer>,
}

impl TextSystem {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self { renderer }
    }
}

impl System for TextSystem {
    fn name(&self) -> &str {
        "text"
    }

    fn priority(&self) -> i32 {
        SUBMIT_SYSTEM_PRIORITY
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        for entity in world.query2::<TransformComponent, TextComponent>() {
            if !world.is_active(entity) {
                continue;
            }
            // Regenerate the glyph mesh when the text changed; without a
            // rebuild function the flag stays set for the host to handle
            if let Some(text) = world.get_component_mut::<TextComponent>(entity) {
                if text.dirty {
                    if let Some(rebuild) = text.rebuild.clone() {
                        text.mesh = rebuild(&text.text);
                        text.dirty = false;
                    }
                }
            }
            let (Some(transform), Some(text)) = (
                world.get_component::<TransformComponent>(entity),
                world.get_component::<TextComponent>(entity),
            ) else {
                continue;
            };
            if !text.visible || text.text.is_empty() {
                continue;
            }
            let mut renderable = Renderable {
                header: RenderableHeader {
                    transparent_hint: true,
                    sort_order: text.sort_order,
                    ..RenderableHeader::new(transform.world_matrix(), text.layer)
                },
                payload: RenderablePayload::Text {
                    text: text.text.clone(),
                    texture: Arc::clone(&text.texture),
                    mesh: Arc::clone(&text.mesh),
                    shader: text.shader.clone(),
                },
            };
            if text.color != ember_math::Color::WHITE {
                renderable.header.overrides.tint = Some(text.color);
            }
            self.renderer.submit_renderable(renderable);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Register the full render pipeline on a scheduler
pub fn register_render_systems(
    scheduler: &mut ember_ecs::Scheduler,
    renderer: &Arc<Renderer>,
    resources: &Arc<ResourceManager>,
) {
    scheduler.register(Box::new(ember_ecs::TransformSystem::new()));
    scheduler.register(Box::new(CameraSystem::new(Arc::clone(renderer))));
    scheduler.register(Box::new(LightSystem::new(Arc::clone(renderer))));
    scheduler.register(Box::new(UniformSystem::new(
        Arc::clone(renderer),
        Arc::clone(resources),
    )));
    scheduler.register(Box::new(LodUpdateSystem::new(Arc::clone(renderer))));
    scheduler.register(Box::new(MeshRenderSystem::new(Arc::clone(renderer))));
    scheduler.register(Box::new(ModelRenderSystem::new(Arc::clone(renderer))));
    scheduler.register(Box::new(SpriteBatchSystem::new(Arc::clone(renderer))));
    scheduler.register(Box::new(TextSystem::new(Arc::clone(renderer))));
}
