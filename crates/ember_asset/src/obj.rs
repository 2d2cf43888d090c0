//! Minimal Wavefront OBJ parsing
//!
//! Supports v/vt/vn/f/o/g statements with triangle and fan-triangulated
//! polygon faces. Enough for loader tests and simple content; anything
//! unrecognized is skipped.

use crate::mesh::Vertex;
use ember_core::{Error, Result};
use ember_math::{Vec2, Vec3};
use std::collections::HashMap;

/// One named group of geometry from an OBJ file
pub struct ObjGroup {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

#[derive(Default)]
struct GroupBuilder {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    // (position, uv, normal) index triple -> output vertex
    dedup: HashMap<(i64, i64, i64), u32>,
}

fn parse_f32(token: &str, line: usize) -> Result<f32> {
    token
        .parse()
        .map_err(|_| Error::Io(format!("line {line}: bad number '{token}'")))
}

/// Resolve an OBJ 1-based (possibly negative) index into a slice
fn resolve(raw: i64, len: usize, line: usize) -> Result<usize> {
    let idx = if raw > 0 {
        raw - 1
    } else if raw < 0 {
        len as i64 + raw
    } else {
        return Err(Error::Io(format!("line {line}: zero face index")));
    };
    if idx < 0 || idx as usize >= len {
        return Err(Error::Io(format!("line {line}: face index {raw} out of range")));
    }
    Ok(idx as usize)
}

/// Parse OBJ text into one group per `o`/`g` statement (a single unnamed
/// group when the file has none).
pub fn parse_obj(text: &str) -> Result<Vec<ObjGroup>> {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut tex_coords: Vec<Vec2> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();
    let mut groups: Vec<(String, GroupBuilder)> = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };
        match keyword {
            "#" => {}
            "v" => {
                let mut component = |t: Option<&str>| {
                    t.ok_or_else(|| Error::Io(format!("line {line_no}: truncated vertex")))
                        .and_then(|t| parse_f32(t, line_no))
                };
                let x = component(tokens.next())?;
                let y = component(tokens.next())?;
                let z = component(tokens.next())?;
                positions.push(Vec3::new(x, y, z));
            }
            "vt" => {
                let u = parse_f32(tokens.next().unwrap_or("0"), line_no)?;
                let v = parse_f32(tokens.next().unwrap_or("0"), line_no)?;
                tex_coords.push(Vec2::new(u, v));
            }
            "vn" => {
                let x = parse_f32(tokens.next().unwrap_or("0"), line_no)?;
                let y = parse_f32(tokens.next().unwrap_or("0"), line_no)?;
                let z = parse_f32(tokens.next().unwrap_or("0"), line_no)?;
                normals.push(Vec3::new(x, y, z));
            }
            "o" | "g" => {
                let name = tokens.next().unwrap_or("group").to_string();
                groups.push((name, GroupBuilder::default()));
            }
            "f" => {
                if groups.is_empty() {
                    groups.push((String::from("default"), GroupBuilder::default()));
                }
                let Some((_, group)) = groups.last_mut() else {
                    continue;
                };
                let mut face: Vec<u32> = Vec::new();
                for corner in tokens {
                    let mut parts = corner.split('/');
                    let pi: i64 = parts
                        .next()
                        .unwrap_or("")
                        .parse()
                        .map_err(|_| Error::Io(format!("line {line_no}: bad face '{corner}'")))?;
                    let ti: i64 = parts.next().and_then(|t| t.parse().ok()).unwrap_or(0);
                    let ni: i64 = parts.next().and_then(|t| t.parse().ok()).unwrap_or(0);
                    let key = (pi, ti, ni);
                    let index = match group.dedup.get(&key) {
                        Some(&i) => i,
                        None => {
                            let position = positions[resolve(pi, positions.len(), line_no)?];
                            let tex_coord = if ti != 0 {
                                tex_coords[resolve(ti, tex_coords.len(), line_no)?]
                            } else {
                                Vec2::ZERO
                            };
                            let normal = if ni != 0 {
                                normals[resolve(ni, normals.len(), line_no)?]
                            } else {
                                Vec3::Y
                            };
                            let i = group.vertices.len() as u32;
                            group.vertices.push(Vertex::new(position, tex_coord, normal));
                            group.dedup.insert(key, i);
                            i
                        }
                    };
                    face.push(index);
                }
                if face.len() < 3 {
                    return Err(Error::Io(format!("line {line_no}: face with < 3 corners")));
                }
                // Fan triangulation
                for i in 1..face.len() - 1 {
                    group.indices.extend_from_slice(&[face[0], face[i], face[i + 1]]);
                }
            }
            _ => {}
        }
    }

    let groups: Vec<ObjGroup> = groups
        .into_iter()
        .filter(|(_, g)| !g.indices.is_empty())
        .map(|(name, g)| ObjGroup {
            name,
            vertices: g.vertices,
            indices: g.indices,
        })
        .collect();
    if groups.is_empty() {
        return Err(Error::Io("no faces in OBJ data".into()));
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn test_quad_fan_triangulated() {
        let groups = parse_obj(QUAD).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].vertices.len(), 4);
        assert_eq!(groups[0].indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_named_groups() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\no body\nf 1 2 3\no turret\nf 3 2 1\n";
        let groups = parse_obj(text).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "body");
        assert_eq!(groups[1].name, "turret");
    }

    #[test]
    fn test_negative_indices() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let groups = parse_obj(text).unwrap();
        assert_eq!(groups[0].indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_errors() {
        assert!(parse_obj("").is_err());
        assert!(parse_obj("v 0 0\n").is_err());
        assert!(parse_obj("v 0 0 0\nf 1 9 1\n").is_err());
    }
}
