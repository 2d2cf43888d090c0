//! Material resource
//!
//! A material references a shader, typed parameter maps, named textures,
//! the classic lighting scalars and render-state hints. All value fields
//! sit behind one mutex; getters return copies. Every material carries a
//! process-unique `stable_id` used as a sort-key component.

use crate::shader::Shader;
use crate::texture::Texture;
use ember_gpu::{BlendMode, CullFace};
use ember_math::{Color, Vec2, Vec3, Vec4};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

static NEXT_STABLE_ID: AtomicU32 = AtomicU32::new(1);

/// Render-state hints resolved into the pipeline at draw time
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RenderStateHints {
    pub blend_mode: BlendMode,
    pub cull_face: CullFace,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl Default for RenderStateHints {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::Opaque,
            cull_face: CullFace::Back,
            depth_test: true,
            depth_write: true,
        }
    }
}

/// Scalar lighting model parameters
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LightingParams {
    pub ambient: Color,
    pub diffuse: Color,
    pub specular: Color,
    pub emissive: Color,
    pub shininess: f32,
    pub opacity: f32,
    pub metallic: f32,
    pub roughness: f32,
}

impl Default for LightingParams {
    fn default() -> Self {
        Self {
            ambient: Color::new(0.1, 0.1, 0.1, 1.0),
            diffuse: Color::WHITE,
            specular: Color::WHITE,
            emissive: Color::TRANSPARENT,
            shininess: 32.0,
            opacity: 1.0,
            metallic: 0.0,
            roughness: 0.5,
        }
    }
}

#[derive(Default)]
struct MaterialState {
    ints: HashMap<String, i32>,
    floats: HashMap<String, f32>,
    vec2s: HashMap<String, Vec2>,
    vec3s: HashMap<String, Vec3>,
    vec4s: HashMap<String, Vec4>,
    matrices: HashMap<String, [f32; 16]>,
    colors: HashMap<String, Color>,
    float_arrays: HashMap<String, Vec<f32>>,
    textures: HashMap<String, Arc<Texture>>,
    lighting: LightingParams,
    hints: RenderStateHints,
}

/// Shared material. Cheap to clone via `Arc` in the resource manager.
pub struct Material {
    name: String,
    stable_id: u32,
    shader: Mutex<Option<Arc<Shader>>>,
    state: Mutex<MaterialState>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stable_id: NEXT_STABLE_ID.fetch_add(1, Ordering::Relaxed),
            shader: Mutex::new(None),
            state: Mutex::new(MaterialState::default()),
        }
    }

    pub fn with_shader(name: impl Into<String>, shader: Arc<Shader>) -> Self {
        let mat = Self::new(name);
        mat.set_shader(shader);
        mat
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process-unique, monotonically assigned id used in sort keys
    pub fn stable_id(&self) -> u32 {
        self.stable_id
    }

    pub fn shader(&self) -> Option<Arc<Shader>> {
        self.shader.lock().clone()
    }

    pub fn set_shader(&self, shader: Arc<Shader>) {
        *self.shader.lock() = Some(shader);
    }

    // ---- typed parameters ----

    pub fn set_int(&self, name: &str, v: i32) {
        self.state.lock().ints.insert(name.to_string(), v);
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.state.lock().ints.get(name).copied()
    }

    pub fn set_float(&self, name: &str, v: f32) {
        self.state.lock().floats.insert(name.to_string(), v);
    }

    pub fn get_float(&self, name: &str) -> Option<f32> {
        self.state.lock().floats.get(name).copied()
    }

    pub fn set_vec2(&self, name: &str, v: Vec2) {
        self.state.lock().vec2s.insert(name.to_string(), v);
    }

    pub fn get_vec2(&self, name: &str) -> Option<Vec2> {
        self.state.lock().vec2s.get(name).copied()
    }

    pub fn set_vec3(&self, name: &str, v: Vec3) {
        self.state.lock().vec3s.insert(name.to_string(), v);
    }

    pub fn get_vec3(&self, name: &str) -> Option<Vec3> {
        self.state.lock().vec3s.get(name).copied()
    }

    pub fn set_vec4(&self, name: &str, v: Vec4) {
        self.state.lock().vec4s.insert(name.to_string(), v);
    }

    pub fn get_vec4(&self, name: &str) -> Option<Vec4> {
        self.state.lock().vec4s.get(name).copied()
    }

    pub fn set_matrix(&self, name: &str, v: [f32; 16]) {
        self.state.lock().matrices.insert(name.to_string(), v);
    }

    pub fn get_matrix(&self, name: &str) -> Option<[f32; 16]> {
        self.state.lock().matrices.get(name).copied()
    }

    pub fn set_color(&self, name: &str, v: Color) {
        self.state.lock().colors.insert(name.to_string(), v);
    }

    pub fn get_color(&self, name: &str) -> Option<Color> {
        self.state.lock().colors.get(name).copied()
    }

    pub fn set_float_array(&self, name: &str, v: Vec<f32>) {
        self.state.lock().float_arrays.insert(name.to_string(), v);
    }

    pub fn get_float_array(&self, name: &str) -> Option<Vec<f32>> {
        self.state.lock().float_arrays.get(name).cloned()
    }

    // ---- textures ----

    pub fn set_texture(&self, name: &str, texture: Arc<Texture>) {
        self.state
            .lock()
            .textures
            .insert(name.to_string(), texture);
    }

    pub fn get_texture(&self, name: &str) -> Option<Arc<Texture>> {
        self.state.lock().textures.get(name).cloned()
    }

    pub fn remove_texture(&self, name: &str) -> bool {
        self.state.lock().textures.remove(name).is_some()
    }

    pub fn texture_count(&self) -> usize {
        self.state.lock().textures.len()
    }

    /// Iterate named textures with the material lock held
    pub fn for_each_texture(&self, mut f: impl FnMut(&str, &Arc<Texture>)) {
        let state = self.state.lock();
        for (name, tex) in &state.textures {
            f(name, tex);
        }
    }

    // ---- lighting scalars ----

    pub fn lighting(&self) -> LightingParams {
        self.state.lock().lighting
    }

    pub fn set_lighting(&self, params: LightingParams) {
        self.state.lock().lighting = params;
    }

    pub fn diffuse_color(&self) -> Color {
        self.state.lock().lighting.diffuse
    }

    pub fn set_diffuse_color(&self, color: Color) {
        self.state.lock().lighting.diffuse = color;
    }

    pub fn opacity(&self) -> f32 {
        self.state.lock().lighting.opacity
    }

    pub fn set_opacity(&self, opacity: f32) {
        self.state.lock().lighting.opacity = opacity.clamp(0.0, 1.0);
    }

    // ---- render-state hints ----

    pub fn render_state(&self) -> RenderStateHints {
        self.state.lock().hints
    }

    pub fn set_render_state(&self, hints: RenderStateHints) {
        self.state.lock().hints = hints;
    }

    pub fn set_blend_mode(&self, mode: BlendMode) {
        self.state.lock().hints.blend_mode = mode;
    }

    /// Translucent when the blend mode blends or the opacity is below one
    pub fn is_translucent(&self) -> bool {
        let state = self.state.lock();
        state.hints.blend_mode.is_translucent() || state.lighting.opacity < 1.0
    }
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("stable_id", &self.stable_id)
            .field("textures", &self.texture_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_ids_unique_and_monotonic() {
        let a = Material::new("a");
        let b = Material::new("b");
        assert!(b.stable_id() > a.stable_id());
    }

    #[test]
    fn test_typed_parameters() {
        let mat = Material::new("m");
        mat.set_float("u_gloss", 0.7);
        mat.set_vec3("u_offset", Vec3::X);
        assert_eq!(mat.get_float("u_gloss"), Some(0.7));
        assert_eq!(mat.get_vec3("u_offset"), Some(Vec3::X));
        assert_eq!(mat.get_int("u_missing"), None);
    }

    #[test]
    fn test_translucency() {
        let mat = Material::new("m");
        assert!(!mat.is_translucent());
        mat.set_blend_mode(BlendMode::Alpha);
        assert!(mat.is_translucent());

        let mat2 = Material::new("m2");
        mat2.set_opacity(0.5);
        assert!(mat2.is_translucent());
    }

    #[test]
    fn test_named_textures() {
        let mat = Material::new("m");
        mat.set_texture("albedo", Arc::new(Texture::solid("w", [255; 4])));
        assert_eq!(mat.texture_count(), 1);
        let mut seen = Vec::new();
        mat.for_each_texture(|name, _| seen.push(name.to_string()));
        assert_eq!(seen, vec!["albedo"]);
        assert!(mat.remove_texture("albedo"));
        assert!(!mat.remove_texture("albedo"));
    }

    #[test]
    fn test_opacity_clamped() {
        let mat = Material::new("m");
        mat.set_opacity(2.0);
        assert_eq!(mat.opacity(), 1.0);
    }
}
