//! # ember_math - Math primitives for the rendering core
//!
//! Fixed semantic types used throughout the engine: vectors, column-major
//! 4x4 matrices, quaternions, axis-aligned bounding boxes and colors.
//!
//! Conventions: right-handed coordinates, Y up, column-major matrices,
//! normalized quaternions, angles in radians internally (degrees only at
//! public engine boundaries).

pub mod bounds;
pub mod color;
pub mod matrix;
pub mod quaternion;
pub mod vector;

pub use bounds::*;
pub use color::*;
pub use matrix::*;
pub use quaternion::*;
pub use vector::*;

/// Common math constants
pub mod consts {
    pub const PI: f32 = core::f32::consts::PI;
    pub const TAU: f32 = PI * 2.0;
    pub const DEG_TO_RAD: f32 = PI / 180.0;
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
    pub const EPSILON: f32 = 1e-6;
}

/// Convert degrees to radians
#[inline]
pub fn radians(degrees: f32) -> f32 {
    degrees * consts::DEG_TO_RAD
}

/// Convert radians to degrees
#[inline]
pub fn degrees(radians: f32) -> f32 {
    radians * consts::RAD_TO_DEG
}

/// Linear interpolation
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
