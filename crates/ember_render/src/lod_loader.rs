//! LOD set resolution
//!
//! Builds a complete [`LodConfig`] for a source mesh, taking each level
//! from a pattern-substituted file (`{name}_lod{level}.{ext}`), from the
//! generator, or from files with generation as the fallback.

use crate::lod::{LodAssets, LodConfig};
use crate::lod_generator::{generate_lod_levels, LodGeneratorConfig};
use ember_asset::{obj, Mesh, Vertex};
use ember_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where LOD meshes come from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LodSource {
    /// Every level must exist on disk
    Files,
    /// Every level is generated from the source mesh
    Generate,
    /// Files when present, generated otherwise
    #[default]
    Hybrid,
}

/// Resolver configuration
#[derive(Clone, Debug, Default)]
pub struct LodLoader {
    pub source: LodSource,
    pub generator: LodGeneratorConfig,
}

/// Path for one LOD level: `assets/rock.obj` -> `assets/rock_lod2.obj`
pub fn lod_path(base: &Path, level: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = base
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = if ext.is_empty() {
        format!("{stem}_lod{level}")
    } else {
        format!("{stem}_lod{level}.{ext}")
    };
    base.with_file_name(file)
}

fn load_mesh_file(path: &Path, name: &str) -> Result<Mesh> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("read {}: {e}", path.display())))?;
    let groups = obj::parse_obj(&text)?;
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    for group in groups {
        let base = vertices.len() as u32;
        vertices.extend(group.vertices);
        indices.extend(group.indices.iter().map(|i| i + base));
    }
    Ok(Mesh::with_data(name, vertices, indices))
}

impl LodLoader {
    pub fn new(source: LodSource) -> Self {
        Self {
            source,
            generator: LodGeneratorConfig::default(),
        }
    }

    /// Build a four-level config. LOD0 is the source mesh itself; levels
    /// 1..=3 resolve per the configured [`LodSource`].
    pub fn load_lod_config(
        &self,
        base_path: &Path,
        source_mesh: Arc<Mesh>,
    ) -> Result<LodConfig> {
        let mut config = LodConfig::default();
        config.levels[0] = LodAssets {
            mesh: Some(Arc::clone(&source_mesh)),
            ..Default::default()
        };

        let generated: Option<Vec<Mesh>> = match self.source {
            LodSource::Files => None,
            LodSource::Generate => Some(generate_lod_levels(&source_mesh, &self.generator)?),
            LodSource::Hybrid => {
                // Generate lazily only if some file is missing
                let missing = (1..=3).any(|level| !lod_path(base_path, level).exists());
                if missing {
                    Some(generate_lod_levels(&source_mesh, &self.generator)?)
                } else {
                    None
                }
            }
        };
        let mut generated = generated.map(|levels| levels.into_iter());

        for level in 1..=3usize {
            let path = lod_path(base_path, level);
            let mesh = match self.source {
                LodSource::Generate => next_generated(&mut generated, level)?,
                LodSource::Files => {
                    load_mesh_file(&path, &format!("{}_lod{level}", source_mesh.name()))?
                }
                LodSource::Hybrid => {
                    if path.exists() {
                        // A later missing level still consumes its
                        // generated counterpart to keep levels aligned
                        if let Some(iter) = generated.as_mut() {
                            let _ = iter.next();
                        }
                        load_mesh_file(&path, &format!("{}_lod{level}", source_mesh.name()))?
                    } else {
                        next_generated(&mut generated, level)?
                    }
                }
            };
            config.levels[level] = LodAssets {
                mesh: Some(Arc::new(mesh)),
                ..Default::default()
            };
        }
        Ok(config)
    }
}

fn next_generated(
    generated: &mut Option<std::vec::IntoIter<Mesh>>,
    level: usize,
) -> Result<Mesh> {
    generated
        .as_mut()
        .and_then(|iter| iter.next())
        .ok_or_else(|| Error::ResourceUnavailable(format!("generated LOD{level}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_asset::primitives;

    #[test]
    fn test_lod_path_pattern() {
        assert_eq!(
            lod_path(Path::new("assets/rock.obj"), 2),
            PathBuf::from("assets/rock_lod2.obj")
        );
        assert_eq!(lod_path(Path::new("rock"), 1), PathBuf::from("rock_lod1"));
    }

    #[test]
    fn test_generate_mode_fills_all_levels() {
        let source = Arc::new(primitives::uv_sphere("rock", 12, 24));
        let loader = LodLoader::new(LodSource::Generate);
        let config = loader
            .load_lod_config(Path::new("nonexistent/rock.obj"), Arc::clone(&source))
            .unwrap();
        for level in 0..4 {
            assert!(config.levels[level].mesh.is_some(), "level {level} missing");
        }
        let lod3 = config.levels[3].mesh.as_ref().unwrap();
        assert!(lod3.triangle_count() < source.triangle_count());
    }

    #[test]
    fn test_files_mode_fails_on_missing() {
        let source = Arc::new(primitives::unit_cube("c"));
        let loader = LodLoader::new(LodSource::Files);
        assert!(loader
            .load_lod_config(Path::new("/nonexistent/c.obj"), source)
            .is_err());
    }

    #[test]
    fn test_hybrid_falls_back_to_generation() {
        let source = Arc::new(primitives::uv_sphere("rock", 12, 24));
        let loader = LodLoader::new(LodSource::Hybrid);
        let config = loader
            .load_lod_config(Path::new("/nonexistent/rock.obj"), source)
            .unwrap();
        assert!(config.levels[1].mesh.is_some());
        assert!(config.levels[3].mesh.is_some());
    }
}
