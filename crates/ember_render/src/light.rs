//! Light component and the per-frame light snapshot
//!
//! The light pass gathers every active light once per frame, culls the
//! ones that cannot affect the view, sorts by priority and fills a
//! fixed-capacity snapshot the uniform pass pushes to shaders.

use ember_math::{Color, Vec3};

pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;
pub const MAX_POINT_LIGHTS: usize = 16;
pub const MAX_SPOT_LIGHTS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LightType {
    Directional,
    Point,
    Spot,
}

/// Light source component. Position and direction come from the
/// entity's transform; a directional light ignores position.
#[derive(Clone, Debug)]
pub struct LightComponent {
    pub light_type: LightType,
    pub color: Color,
    pub intensity: f32,
    /// Attenuation range for point and spot lights
    pub range: f32,
    /// Lights farther than this from the camera are dropped entirely
    pub fade_distance: f32,
    /// Higher priority wins when the per-type cap is exceeded
    pub priority: i32,
    /// Spot cone angles in degrees; inner <= outer
    pub inner_angle_degrees: f32,
    pub outer_angle_degrees: f32,
    pub enabled: bool,
}

impl Default for LightComponent {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            color: Color::WHITE,
            intensity: 1.0,
            range: 25.0,
            fade_distance: 500.0,
            priority: 0,
            inner_angle_degrees: 25.0,
            outer_angle_degrees: 35.0,
            enabled: true,
        }
    }
}

impl LightComponent {
    pub fn directional(color: Color, intensity: f32) -> Self {
        Self {
            light_type: LightType::Directional,
            color,
            intensity,
            ..Default::default()
        }
    }

    pub fn point(color: Color, intensity: f32, range: f32) -> Self {
        Self {
            light_type: LightType::Point,
            color,
            intensity,
            range,
            ..Default::default()
        }
    }
}

/// One resolved light in the frame snapshot
#[derive(Clone, Copy, Debug)]
pub struct ResolvedLight {
    pub light_type: LightType,
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Color,
    pub intensity: f32,
    pub range: f32,
    /// Precomputed cos(inner)/cos(outer) for spot lights
    pub cos_inner: f32,
    pub cos_outer: f32,
}

/// Lights selected for the current frame, capped per type
#[derive(Clone, Debug, Default)]
pub struct LightFrame {
    pub ambient: Color,
    pub directional: Vec<ResolvedLight>,
    pub point: Vec<ResolvedLight>,
    pub spot: Vec<ResolvedLight>,
}

impl LightFrame {
    pub fn clear(&mut self) {
        self.directional.clear();
        self.point.clear();
        self.spot.clear();
    }

    pub fn total(&self) -> usize {
        self.directional.len() + self.point.len() + self.spot.len()
    }

    /// Insert into the per-type list. Callers push in descending
    /// priority order; pushes past the cap are dropped.
    pub fn push(&mut self, light: ResolvedLight) -> bool {
        let (list, cap) = match light.light_type {
            LightType::Directional => (&mut self.directional, MAX_DIRECTIONAL_LIGHTS),
            LightType::Point => (&mut self.point, MAX_POINT_LIGHTS),
            LightType::Spot => (&mut self.spot, MAX_SPOT_LIGHTS),
        };
        if list.len() >= cap {
            return false;
        }
        list.push(light);
        true
    }
}
