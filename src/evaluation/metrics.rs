//! As quatro sub-notas de qualidade.
//!
//! Cada métrica é independente e retorna seu próprio erro, então uma falha
//! afeta só aquela sub-nota.

use std::path::Path;

use crate::types::Input;
use crate::MeshCacheResult;

use super::mesh::Mesh;

const SIMPLE_WORDS: [&str; 4] = ["simple", "basic", "cube", "sphere"];
const DETAILED_WORDS: [&str; 3] = ["detailed", "complex", "intricate"];

/// Topologia e densidade. Começa em 1.0 e subtrai penalidades.
pub fn geometry_score(mesh: &Mesh) -> MeshCacheResult<f64> {
    mesh.ensure_finite("geometry")?;

    let mut score = 1.0;
    let vertices = mesh.vertex_count();
    let faces = mesh.face_count();

    if !mesh.is_watertight() {
        score -= 0.2;
        tracing::debug!("Mesh is not watertight");
    }

    if mesh.is_self_intersecting() {
        score -= 0.3;
        tracing::debug!("Mesh has self-intersections");
    }

    if vertices > 0 {
        let ratio = faces as f64 / vertices as f64;
        if !(1.5..=3.0).contains(&ratio) {
            score -= 0.1;
            tracing::debug!(ratio = %format!("{:.2}", ratio), "Unusual face/vertex ratio");
        }
    }

    let degenerate = mesh.degenerate_face_count();
    if degenerate > 0 && faces > 0 {
        score -= (degenerate as f64 / faces as f64 * 0.5).min(0.2);
        tracing::debug!(degenerate, "Found degenerate faces");
    }

    if vertices < 10 {
        score -= 0.3;
    } else if vertices > 100_000 {
        score -= 0.1;
    }

    Ok(f64::max(0.0, score))
}

/// Atributos de superfície. Base 0.5 para modelos sem textura.
pub fn texture_score(mesh: &Mesh, path: &Path) -> MeshCacheResult<f64> {
    let mut score = 0.5;

    if mesh.has_uv {
        score += 0.2;
    }
    if mesh.has_vertex_colors {
        score += 0.2;
    }
    if mesh.has_material {
        score += 0.1;
    }
    if has_sibling_material(path) {
        score += 0.2;
        tracing::debug!(path = %path.display(), "Found associated MTL file");
    }

    Ok(f64::min(1.0, score))
}

/// `model.obj` ao lado de `model.mtl`.
fn has_sibling_material(path: &Path) -> bool {
    let is_obj = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("obj"));
    is_obj && path.with_extension("mtl").is_file()
}

/// Sub-nota de fidelidade e se ela é só uma estimativa provisória.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fidelity {
    pub score: f64,
    pub estimated: bool,
}

/// O quanto a malha corresponde à entrada.
///
/// Prompts de texto são comparados com palavras de complexidade e com as
/// proporções da caixa delimitadora. Imagens ganham um bônus fixo com
/// `estimated = true`: ainda não há comparação entre modalidades.
pub fn fidelity_score(mesh: &Mesh, input: &Input) -> MeshCacheResult<Fidelity> {
    let mut score: f64 = 0.7;

    match input {
        Input::Text(text) => {
            mesh.ensure_finite("fidelity")?;
            let text = text.to_lowercase();
            let vertices = mesh.vertex_count();

            if SIMPLE_WORDS.iter().any(|w| text.contains(w)) {
                score += if vertices < 1000 { 0.2 } else { -0.1 };
            } else if DETAILED_WORDS.iter().any(|w| text.contains(w)) {
                score += if vertices > 500 { 0.2 } else { -0.1 };
            }

            if let Some(bounds) = mesh.bounds() {
                let extents = bounds.extents();
                if extents.iter().all(|e| *e > 0.0) {
                    let longest = extents.iter().cloned().fold(f64::MIN, f64::max);
                    let shortest = extents.iter().cloned().fold(f64::MAX, f64::min);
                    if longest / shortest < 10.0 {
                        score += 0.1;
                    }
                }
            }

            Ok(Fidelity {
                score: score.clamp(0.0, 1.0),
                estimated: false,
            })
        }
        Input::Image(_) => Ok(Fidelity {
            score: f64::min(1.0, score + 0.1),
            estimated: true,
        }),
    }
}

/// Custo de renderização. Começa em 1.0; os bônus só compensam penalidades.
pub fn performance_score(mesh: &Mesh) -> MeshCacheResult<f64> {
    let mut score: f64 = 1.0;
    let vertices = mesh.vertex_count();
    let faces = mesh.face_count();

    if vertices > 50_000 {
        score -= 0.2;
    } else if vertices > 20_000 {
        score -= 0.1;
    }

    if faces > 100_000 {
        score -= 0.2;
    } else if faces > 40_000 {
        score -= 0.1;
    }

    if (100..=10_000).contains(&vertices) && (100..=20_000).contains(&faces) {
        score += 0.1;
    }

    if mesh.is_watertight() {
        mesh.ensure_finite("performance")?;
        if mesh.signed_volume().abs() > 0.0 {
            score += 0.1;
        }
    }

    Ok(score.clamp(0.0, 1.0))
}
