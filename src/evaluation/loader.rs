//! Carrega artefatos de malha de arquivos Wavefront OBJ e glTF.

use std::path::Path;

use crate::{MeshCacheError, MeshCacheResult};

use super::mesh::Mesh;

/// Carregador de malhas. Escolhe o formato pela extensão do arquivo.
pub struct MeshLoader;

impl MeshLoader {
    /// Carrega `path`. Toda falha é [`MeshCacheError::ArtifactUnloadable`].
    pub fn load(path: &Path) -> MeshCacheResult<Mesh> {
        if !path.is_file() {
            return Err(MeshCacheError::unloadable(path, "file not found"));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let mesh = match extension.as_str() {
            "obj" => {
                let source = std::fs::read_to_string(path)
                    .map_err(|e| MeshCacheError::unloadable(path, e.to_string()))?;
                parse_obj(&source).map_err(|reason| MeshCacheError::unloadable(path, reason))?
            }
            "gltf" | "glb" => load_gltf(path)?,
            other => {
                return Err(MeshCacheError::unloadable(
                    path,
                    format!("unsupported format '{}'", other),
                ))
            }
        };

        if mesh.vertices.is_empty() {
            return Err(MeshCacheError::unloadable(path, "mesh has no vertices"));
        }
        Ok(mesh)
    }
}

/// Interpreta texto OBJ. Em caso de falha retorna só o motivo.
pub fn parse_obj(source: &str) -> Result<Mesh, String> {
    let mut mesh = Mesh::default();

    for (number, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };
        let line_no = number + 1;

        match keyword {
            "v" => {
                let values: Vec<f64> = parts
                    .map(|p| p.parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|e| format!("line {}: bad vertex: {}", line_no, e))?;
                if values.len() < 3 {
                    return Err(format!("line {}: vertex needs 3 coordinates", line_no));
                }
                // `v x y z r g b`
                if values.len() >= 6 {
                    mesh.has_vertex_colors = true;
                }
                mesh.vertices.push([values[0], values[1], values[2]]);
            }
            "vt" => mesh.has_uv = true,
            "usemtl" | "mtllib" => mesh.has_material = true,
            "f" => {
                let mut face = Vec::new();
                for token in parts {
                    let index = token.split('/').next().unwrap_or_default();
                    let index: i64 = index
                        .parse()
                        .map_err(|_| format!("line {}: bad face index '{}'", line_no, token))?;
                    face.push(resolve_index(index, mesh.vertices.len(), line_no)?);
                }
                if face.len() < 3 {
                    return Err(format!("line {}: face needs 3 vertices", line_no));
                }
                mesh.faces.push(face);
            }
            // o, g, s, vn, vp, l: não usados na pontuação
            _ => {}
        }
    }

    Ok(mesh)
}

/// Base 1, ou negativo relativo aos vértices lidos até aqui.
fn resolve_index(index: i64, defined: usize, line_no: usize) -> Result<usize, String> {
    let resolved = match index {
        0 => None,
        i if i > 0 => Some((i - 1) as usize),
        i => (defined as i64 + i).try_into().ok(),
    };
    match resolved {
        Some(i) if i < defined => Ok(i),
        _ => Err(format!(
            "line {}: face index {} out of range ({} vertices)",
            line_no, index, defined
        )),
    }
}

fn load_gltf(path: &Path) -> MeshCacheResult<Mesh> {
    let (document, buffers, _) =
        gltf::import(path).map_err(|e| MeshCacheError::unloadable(path, e.to_string()))?;

    let mut mesh = Mesh::default();

    for gltf_mesh in document.meshes() {
        for primitive in gltf_mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                tracing::debug!(mode = ?primitive.mode(), "Skipping non-triangle primitive");
                continue;
            }

            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|b| &b[..]));
            let Some(positions) = reader.read_positions() else {
                continue;
            };

            let base = mesh.vertices.len();
            mesh.vertices.extend(
                positions.map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])]),
            );
            let added = mesh.vertices.len() - base;

            let indices: Vec<usize> = match reader.read_indices() {
                Some(indices) => indices.into_u32().map(|i| base + i as usize).collect(),
                None => (base..base + added).collect(),
            };
            if indices.iter().any(|i| *i >= mesh.vertices.len()) {
                return Err(MeshCacheError::unloadable(path, "index out of range"));
            }
            mesh.faces
                .extend(indices.chunks_exact(3).map(|c| c.to_vec()));

            mesh.has_uv |= reader.read_tex_coords(0).is_some();
            mesh.has_vertex_colors |= reader.read_colors(0).is_some();
            mesh.has_material |= primitive.material().index().is_some();
        }
    }

    Ok(mesh)
}
