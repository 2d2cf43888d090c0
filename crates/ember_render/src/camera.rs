//! Camera component and the active-camera snapshot

use ember_ecs::Entity;
use ember_gpu::Viewport;
use ember_math::{Mat4, Vec3};

/// Projection kind
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Projection {
    Perspective { fov_degrees: f32 },
    Orthographic { height: f32 },
}

/// Camera component. The first active camera ordered by descending
/// `depth` wins each frame.
#[derive(Clone, Debug)]
pub struct CameraComponent {
    pub active: bool,
    pub depth: i32,
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
    /// Cleared at frame start when set
    pub clear_color: Option<ember_math::Color>,
    pub viewport: Option<Viewport>,
    /// Which layer mask bits this camera renders
    pub layer_mask: u32,
    /// Entities farther than this are culled before submission
    pub max_sight_distance: f32,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self {
            active: true,
            depth: 0,
            projection: Projection::Perspective { fov_degrees: 60.0 },
            near: 0.1,
            far: 2000.0,
            clear_color: None,
            viewport: None,
            layer_mask: u32::MAX,
            max_sight_distance: 2000.0,
        }
    }
}

impl CameraComponent {
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov_degrees } => Mat4::perspective(
                ember_math::radians(fov_degrees),
                aspect,
                self.near,
                self.far,
            ),
            Projection::Orthographic { height } => {
                let half_h = height * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
        }
    }
}

/// Snapshot of the camera chosen for this frame, consumed by the LOD
/// pass, the render systems and the queue flush
#[derive(Clone, Debug)]
pub struct ActiveCamera {
    pub entity: Entity,
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub layer_mask: u32,
    pub max_sight_distance: f32,
}

impl ActiveCamera {
    /// View-space depth of a world point (positive in front)
    pub fn view_depth(&self, world_pos: Vec3) -> f32 {
        -self.view.transform_point(world_pos).z
    }
}
