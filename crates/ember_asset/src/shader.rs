//! Shader program resource and uniform cache
//!
//! A shader owns a linked program handle plus a [`UniformManager`] that
//! caches uniform locations and the last value set per name, so redundant
//! uniform uploads never reach the device.

use ember_core::{Error, Result};
use ember_gpu::{ProgramHandle, RenderDevice};
use ember_math::{Color, Mat4, Vec2, Vec3, Vec4};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A uniform value of any supported type
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4([f32; 16]),
    Color(Color),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    Vec3Array(Vec<Vec3>),
    Mat4Array(Vec<[f32; 16]>),
}

struct UniformEntry {
    location: i32,
    last_value: Option<UniformValue>,
}

/// Per-program uniform location and value cache.
///
/// Locations are assigned on first use. `set` returns true when the value
/// actually changed and would be pushed to the GPU.
#[derive(Default)]
pub struct UniformManager {
    entries: HashMap<String, UniformEntry>,
    next_location: i32,
    sets_applied: u64,
    sets_skipped: u64,
}

impl UniformManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached location for a uniform name, assigning one on first use
    pub fn location(&mut self, name: &str) -> i32 {
        if let Some(entry) = self.entries.get(name) {
            return entry.location;
        }
        let location = self.next_location;
        self.next_location += 1;
        self.entries.insert(
            name.to_string(),
            UniformEntry {
                location,
                last_value: None,
            },
        );
        location
    }

    /// Record a uniform set. Returns false when the last-set cache already
    /// holds an equal value.
    pub fn set(&mut self, name: &str, value: UniformValue) -> bool {
        if !self.entries.contains_key(name) {
            self.location(name);
        }
        let Some(entry) = self.entries.get_mut(name) else {
            return false;
        };
        if entry.last_value.as_ref() == Some(&value) {
            self.sets_skipped += 1;
            return false;
        }
        entry.last_value = Some(value);
        self.sets_applied += 1;
        true
    }

    /// Drop every cached value, keeping locations. Called when the program
    /// is rebound after another program may have run.
    pub fn invalidate_values(&mut self) {
        for entry in self.entries.values_mut() {
            entry.last_value = None;
        }
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.sets_applied, self.sets_skipped)
    }
}

/// Linked shader program with its uniform cache
pub struct Shader {
    name: String,
    program: Mutex<ProgramHandle>,
    uniforms: Mutex<UniformManager>,
}

impl Shader {
    /// Compile and link from source. Main thread only.
    pub fn compile(
        name: impl Into<String>,
        device: &dyn RenderDevice,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<Self> {
        let name = name.into();
        let program = device
            .create_program(vertex_src, fragment_src)
            .map_err(|e| Error::UploadFailed(format!("shader '{name}': {e}")))?;
        Ok(Self {
            name,
            program: Mutex::new(program),
            uniforms: Mutex::new(UniformManager::new()),
        })
    }

    /// Wrap an existing program handle
    pub fn from_program(name: impl Into<String>, program: ProgramHandle) -> Self {
        Self {
            name: name.into(),
            program: Mutex::new(program),
            uniforms: Mutex::new(UniformManager::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> ProgramHandle {
        *self.program.lock()
    }

    /// Set a uniform through the last-value cache. Returns true when the
    /// value changed.
    pub fn set_uniform(&self, name: &str, value: UniformValue) -> bool {
        self.uniforms.lock().set(name, value)
    }

    pub fn set_int(&self, name: &str, v: i32) -> bool {
        self.set_uniform(name, UniformValue::Int(v))
    }

    pub fn set_float(&self, name: &str, v: f32) -> bool {
        self.set_uniform(name, UniformValue::Float(v))
    }

    pub fn set_vec3(&self, name: &str, v: Vec3) -> bool {
        self.set_uniform(name, UniformValue::Vec3(v))
    }

    pub fn set_color(&self, name: &str, v: Color) -> bool {
        self.set_uniform(name, UniformValue::Color(v))
    }

    pub fn set_mat4(&self, name: &str, v: &Mat4) -> bool {
        self.set_uniform(name, UniformValue::Mat4(v.to_array()))
    }

    /// Forget cached uniform values; the next sets all go through
    pub fn invalidate_uniforms(&self) {
        self.uniforms.lock().invalidate_values();
    }

    /// (applied, skipped) uniform set counts
    pub fn uniform_stats(&self) -> (u64, u64) {
        self.uniforms.lock().stats()
    }

    /// Release the GPU program
    pub fn destroy_gpu(&self, device: &dyn RenderDevice) {
        let mut program = self.program.lock();
        if !program.is_null() {
            device.destroy_program(*program);
            *program = ProgramHandle::NULL;
        }
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("name", &self.name)
            .field("program", &self.program())
            .finish()
    }
}
