//! Built-in procedural meshes

use crate::mesh::{Mesh, Vertex};
use ember_math::{Vec2, Vec3};

/// Axis-aligned unit cube centered at the origin, 24 vertices / 12 triangles
pub fn unit_cube(name: impl Into<String>) -> Mesh {
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        // (normal, right, up) per face
        (Vec3::new(0.0, 0.0, 1.0), Vec3::X, Vec3::Y),
        (Vec3::new(0.0, 0.0, -1.0), -Vec3::X, Vec3::Y),
        (Vec3::new(1.0, 0.0, 0.0), -Vec3::Z, Vec3::Y),
        (Vec3::new(-1.0, 0.0, 0.0), Vec3::Z, Vec3::Y),
        (Vec3::new(0.0, 1.0, 0.0), Vec3::X, -Vec3::Z),
        (Vec3::new(0.0, -1.0, 0.0), Vec3::X, Vec3::Z),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, right, up) in faces {
        let base = vertices.len() as u32;
        let origin = normal * 0.5;
        let corners = [
            origin - right * 0.5 - up * 0.5,
            origin + right * 0.5 - up * 0.5,
            origin + right * 0.5 + up * 0.5,
            origin - right * 0.5 + up * 0.5,
        ];
        let uvs = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        for (corner, uv) in corners.into_iter().zip(uvs) {
            vertices.push(Vertex::new(corner, uv, normal));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    Mesh::with_data(name, vertices, indices)
}

/// Unit quad in the XY plane facing +Z
pub fn unit_quad(name: impl Into<String>) -> Mesh {
    let n = Vec3::new(0.0, 0.0, 1.0);
    let vertices = vec![
        Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec2::new(0.0, 0.0), n),
        Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec2::new(1.0, 0.0), n),
        Vertex::new(Vec3::new(0.5, 0.5, 0.0), Vec2::new(1.0, 1.0), n),
        Vertex::new(Vec3::new(-0.5, 0.5, 0.0), Vec2::new(0.0, 1.0), n),
    ];
    Mesh::with_data(name, vertices, vec![0, 1, 2, 0, 2, 3])
}

/// UV sphere with the given ring/segment resolution
pub fn uv_sphere(name: impl Into<String>, rings: u32, segments: u32) -> Mesh {
    let rings = rings.max(2);
    let segments = segments.max(3);
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for ring in 0..=rings {
        let v = ring as f32 / rings as f32;
        let phi = v * std::f32::consts::PI;
        for segment in 0..=segments {
            let u = segment as f32 / segments as f32;
            let theta = u * std::f32::consts::TAU;
            let dir = Vec3::new(
                phi.sin() * theta.cos(),
                phi.cos(),
                phi.sin() * theta.sin(),
            );
            vertices.push(Vertex::new(dir * 0.5, Vec2::new(u, v), dir));
        }
    }
    let stride = segments + 1;
    for ring in 0..rings {
        for segment in 0..segments {
            let a = ring * stride + segment;
            let b = a + stride;
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    Mesh::with_data(name, vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let cube = unit_cube("cube");
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.triangle_count(), 12);
        let b = cube.bounds();
        assert_eq!(b.min, Vec3::new(-0.5, -0.5, -0.5));
        assert_eq!(b.max, Vec3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_quad_counts() {
        let quad = unit_quad("quad");
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.triangle_count(), 2);
    }

    #[test]
    fn test_sphere_resolution() {
        let sphere = uv_sphere("s", 8, 16);
        assert_eq!(sphere.triangle_count(), (8 * 16 * 2) as usize);
        assert!(sphere.bounds().max_extent() <= 1.0 + 1e-5);
    }
}
