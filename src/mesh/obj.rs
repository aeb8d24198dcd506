// Wavefront OBJ support: tobj feeds mesh-backed SDF sources, and a small
// writer dumps extracted triangle soups for external tools.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{IsoError, Result};
use crate::mesh::types::{MeshData, Pt3};

/// Positions and triangulated faces (zero-based indices).
#[derive(Debug, Clone, Default)]
pub struct ObjMesh {
    pub positions: Vec<Pt3>,
    pub faces: Vec<[usize; 3]>,
}

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: false,
        ..Default::default()
    }
}

pub fn read_obj(path: &Path) -> Result<ObjMesh> {
    let content = fs::read_to_string(path).map_err(|e| IsoError::io(path, e))?;
    parse_obj(&content, path)
}

/// Parse OBJ text. Polygons are triangulated and every model is merged into
/// one mesh; materials are ignored.
pub fn parse_obj(content: &str, path: &Path) -> Result<ObjMesh> {
    let mut reader = content.as_bytes();
    let (models, _materials) = tobj::load_obj_buf(&mut reader, &load_options(), |_| {
        Err(tobj::LoadError::OpenFileFailed)
    })
    .map_err(|e| IsoError::ObjParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut mesh = ObjMesh::default();
    for model in &models {
        tracing::trace!("OBJ model '{}': loading", model.name);

        // Indices are per model.
        let base = mesh.positions.len();
        let obj_mesh = &model.mesh;
        mesh.positions.extend(
            obj_mesh
                .positions
                .chunks_exact(3)
                .map(|c| Pt3::new(c[0], c[1], c[2])),
        );

        let count = mesh.positions.len();
        for tri in obj_mesh.indices.chunks_exact(3) {
            let face = [
                base + tri[0] as usize,
                base + tri[1] as usize,
                base + tri[2] as usize,
            ];
            if let Some(&bad) = face.iter().find(|&&i| i >= count) {
                return Err(IsoError::ObjParse {
                    path: path.to_path_buf(),
                    message: format!(
                        "model '{}' references vertex {} of {}",
                        model.name, bad, count
                    ),
                });
            }
            mesh.faces.push(face);
        }
    }

    tracing::debug!(
        "OBJ {:?}: {} vertices, {} faces from {} models",
        path,
        mesh.positions.len(),
        mesh.faces.len(),
        models.len()
    );

    Ok(mesh)
}

/// Write a triangle soup as OBJ: every position as `v`, every normal as
/// `vn`, and one `f a//a b//b c//c` record per triangle.
pub fn write_obj(path: &Path, mesh: &MeshData) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| IsoError::io(path, e))?;
    let mut out = BufWriter::new(file);
    write_obj_to(&mut out, mesh)
        .and_then(|_| out.flush())
        .map_err(|e| IsoError::io(path, e))
}

pub fn write_obj_to<W: Write>(out: &mut W, mesh: &MeshData) -> std::io::Result<()> {
    for v in mesh.vertices.chunks_exact(3) {
        writeln!(out, "v {} {} {}", v[0], v[1], v[2])?;
    }
    for n in mesh.normals.chunks_exact(3) {
        writeln!(out, "vn {} {} {}", n[0], n[1], n[2])?;
    }
    for i in 0..mesh.triangle_count() {
        let a = i * 3 + 1;
        writeln!(out, "f {a}//{a} {b}//{b} {c}//{c}", b = a + 1, c = a + 2)?;
    }
    Ok(())
}
