//! LOD mesh generation
//!
//! Vertex-clustering simplification: vertices snap to a uniform grid,
//! cells merge into one representative vertex, and triangles whose
//! corners land in fewer than three distinct cells are dropped. The grid
//! resolution is searched so the output lands under the target triangle
//! count without collapsing to nothing.

use crate::lod::LodLevel;
use ember_asset::{Mesh, Vertex};
use ember_core::{Error, Result};
use ember_math::Vec3;
use std::collections::HashMap;

/// Triangle-count targets per generated level, as fractions of the source
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct LodGeneratorConfig {
    pub target_fractions: [f32; 3],
    /// Triangles under this count are left unsimplified
    pub min_triangles: usize,
}

impl Default for LodGeneratorConfig {
    fn default() -> Self {
        Self {
            target_fractions: [0.5, 0.25, 0.1],
            min_triangles: 8,
        }
    }
}

/// Simplify to at most `target_triangles`, preserving overall shape
pub fn simplify(mesh: &Mesh, name: impl Into<String>, target_triangles: usize) -> Result<Mesh> {
    let name = name.into();
    if target_triangles == 0 {
        return Err(Error::InvalidArgument(format!(
            "zero triangle target for '{name}'"
        )));
    }
    let (vertices, indices) = mesh.access_data(|v, i| (v.to_vec(), i.to_vec()));
    if vertices.is_empty() || indices.len() < 3 {
        return Err(Error::InvalidArgument(format!(
            "source mesh '{}' has no geometry",
            mesh.name()
        )));
    }
    if indices.len() / 3 <= target_triangles {
        return Ok(Mesh::with_data(name, vertices, indices));
    }

    let bounds = mesh.bounds();
    // Binary search the densest grid that still meets the budget.
    let mut lo = 1u32;
    let mut hi = 512u32;
    let mut best: Option<(Vec<Vertex>, Vec<u32>)> = None;
    while lo <= hi {
        let resolution = lo + (hi - lo) / 2;
        let (out_vertices, out_indices) =
            cluster(&vertices, &indices, bounds.min, bounds.size(), resolution);
        let triangles = out_indices.len() / 3;
        if triangles <= target_triangles && triangles > 0 {
            best = Some((out_vertices, out_indices));
            lo = resolution + 1;
        } else if triangles == 0 {
            lo = resolution + 1;
        } else {
            hi = resolution - 1;
        }
    }
    match best {
        Some((out_vertices, out_indices)) => Ok(Mesh::with_data(name, out_vertices, out_indices)),
        None => Err(Error::InvalidArgument(format!(
            "cannot simplify '{}' to {target_triangles} triangles",
            mesh.name()
        ))),
    }
}

fn cluster(
    vertices: &[Vertex],
    indices: &[u32],
    origin: Vec3,
    size: Vec3,
    resolution: u32,
) -> (Vec<Vertex>, Vec<u32>) {
    let cell_of = |p: Vec3| -> (u32, u32, u32) {
        let axis = |v: f32, min: f32, extent: f32| -> u32 {
            if extent <= 1e-9 {
                return 0;
            }
            (((v - min) / extent * resolution as f32) as u32).min(resolution - 1)
        };
        (
            axis(p.x, origin.x, size.x),
            axis(p.y, origin.y, size.y),
            axis(p.z, origin.z, size.z),
        )
    };

    // One representative vertex per occupied cell, averaged
    let mut cell_to_out: HashMap<(u32, u32, u32), u32> = HashMap::new();
    let mut accum: Vec<(Vertex, f32)> = Vec::new();
    let mut vertex_to_out: Vec<u32> = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        let cell = cell_of(vertex.position);
        let out = *cell_to_out.entry(cell).or_insert_with(|| {
            accum.push((*vertex, 0.0));
            (accum.len() - 1) as u32
        });
        let (sum, count) = &mut accum[out as usize];
        if *count > 0.0 {
            sum.position = sum.position + vertex.position;
            sum.normal = sum.normal + vertex.normal;
            sum.tex_coord = sum.tex_coord + vertex.tex_coord;
        }
        *count += 1.0;
        vertex_to_out.push(out);
    }
    let out_vertices: Vec<Vertex> = accum
        .into_iter()
        .map(|(mut v, count)| {
            if count > 1.0 {
                v.position = v.position / count;
                v.tex_coord = v.tex_coord / count;
                v.normal = v.normal.normalize_or(Vec3::Y);
            }
            v
        })
        .collect();

    let mut out_indices = Vec::new();
    for tri in indices.chunks_exact(3) {
        let a = vertex_to_out[tri[0] as usize];
        let b = vertex_to_out[tri[1] as usize];
        let c = vertex_to_out[tri[2] as usize];
        if a != b && b != c && a != c {
            out_indices.extend_from_slice(&[a, b, c]);
        }
    }
    (out_vertices, out_indices)
}

/// Check a simplified mesh against its source: non-empty, bounds within
/// twice the source extent per axis, no degenerate triangles.
pub fn validate_simplified(lod: &Mesh, source: &Mesh) -> Result<()> {
    if lod.vertex_count() == 0 || lod.index_count() == 0 {
        return Err(Error::InvalidArgument(format!(
            "LOD '{}' is empty",
            lod.name()
        )));
    }
    let src = source.bounds();
    let out = lod.bounds();
    let src_size = src.size();
    let out_size = out.size();
    for axis in 0..3 {
        let (s, o) = match axis {
            0 => (src_size.x, out_size.x),
            1 => (src_size.y, out_size.y),
            _ => (src_size.z, out_size.z),
        };
        if o > s * 2.0 + 1e-5 {
            return Err(Error::InvalidArgument(format!(
                "LOD '{}' bounds exceed 2x source on axis {axis}",
                lod.name()
            )));
        }
    }
    let degenerate = lod.access_data(|_, indices| {
        indices
            .chunks_exact(3)
            .any(|t| t[0] == t[1] || t[1] == t[2] || t[0] == t[2])
    });
    if degenerate {
        return Err(Error::InvalidArgument(format!(
            "LOD '{}' contains degenerate triangles",
            lod.name()
        )));
    }
    Ok(())
}

/// Generate LOD1..LOD3 from a source mesh. Outputs are named
/// `{source}_lod{level}` and validated before return.
pub fn generate_lod_levels(source: &Mesh, config: &LodGeneratorConfig) -> Result<Vec<Mesh>> {
    let source_triangles = source.triangle_count();
    if source_triangles == 0 {
        return Err(Error::InvalidArgument(format!(
            "source mesh '{}' has no triangles",
            source.name()
        )));
    }
    let mut levels = Vec::with_capacity(LodLevel::COUNT - 1);
    for (i, fraction) in config.target_fractions.iter().enumerate() {
        let level = i + 1;
        let name = format!("{}_lod{level}", source.name());
        let target = ((source_triangles as f32 * fraction) as usize).max(1);
        if source_triangles <= config.min_triangles {
            levels.push(Mesh::with_data(
                name,
                source.vertices(),
                source.indices(),
            ));
            continue;
        }
        let lod = simplify(source, name, target)?;
        validate_simplified(&lod, source)?;
        levels.push(lod);
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_asset::primitives;

    #[test]
    fn test_generate_reduces_triangles() {
        let source = primitives::uv_sphere("sphere", 16, 32);
        let levels = generate_lod_levels(&source, &LodGeneratorConfig::default()).unwrap();
        assert_eq!(levels.len(), 3);
        let source_tris = source.triangle_count();
        let mut last = source_tris;
        for lod in &levels {
            let tris = lod.triangle_count();
            assert!(tris > 0);
            assert!(tris <= last, "{} > {last}", tris);
            last = tris;
        }
        assert!(levels[2].triangle_count() <= source_tris / 4);
    }

    #[test]
    fn test_validation_passes_for_generated() {
        let source = primitives::uv_sphere("sphere", 12, 24);
        let levels = generate_lod_levels(&source, &LodGeneratorConfig::default()).unwrap();
        for lod in &levels {
            validate_simplified(lod, &source).unwrap();
        }
    }

    #[test]
    fn test_tiny_mesh_left_alone() {
        let source = primitives::unit_quad("quad");
        let levels = generate_lod_levels(&source, &LodGeneratorConfig::default()).unwrap();
        for lod in &levels {
            assert_eq!(lod.triangle_count(), 2);
        }
    }

    #[test]
    fn test_names_follow_pattern() {
        let source = primitives::uv_sphere("rock", 8, 16);
        let levels = generate_lod_levels(&source, &LodGeneratorConfig::default()).unwrap();
        assert_eq!(levels[0].name(), "rock_lod1");
        assert_eq!(levels[2].name(), "rock_lod3");
    }

    #[test]
    fn test_empty_source_rejected() {
        let empty = Mesh::new("empty");
        assert!(generate_lod_levels(&empty, &LodGeneratorConfig::default()).is_err());
        assert!(simplify(&empty, "x", 10).is_err());
    }

    #[test]
    fn test_validation_catches_empty() {
        let source = primitives::unit_cube("c");
        let empty = Mesh::new("empty");
        assert!(validate_simplified(&empty, &source).is_err());
    }
}
