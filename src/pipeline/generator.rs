//! Backends de geração.

use std::f64::consts::PI;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::types::Input;

/// Modelo gravado em disco por um gerador.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedModel {
    pub path: PathBuf,
    pub vertex_count: usize,
    pub face_count: usize,
}

/// Transforma uma entrada em um arquivo de malha.
///
/// A geração pode levar minutos; quem chama a limita com timeout e não segura
/// locks enquanto ela roda.
#[async_trait]
pub trait ModelGenerator: Send + Sync {
    /// Nome do backend, para logs.
    fn name(&self) -> &str;

    /// Grava um modelo para `input` dentro de `output_dir`.
    async fn generate(&self, input: &Input, output_dir: &Path) -> Result<GeneratedModel>;
}

/// Formas primitivas produzidas por [`ProceduralGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Cube,
    Sphere,
    Cylinder,
    Pyramid,
    TwistedPrism,
}

impl Shape {
    /// Escolhe uma forma pelas palavras do prompt. Imagens recebem o prisma torcido.
    pub fn for_input(input: &Input) -> Self {
        let Input::Text(text) = input else {
            return Shape::TwistedPrism;
        };
        let text = text.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| text.contains(w));

        if mentions(&["cube", "box", "square"]) {
            Shape::Cube
        } else if mentions(&["sphere", "ball", "round"]) {
            Shape::Sphere
        } else if mentions(&["cylinder", "tube", "pipe"]) {
            Shape::Cylinder
        } else if mentions(&["pyramid", "triangle"]) {
            Shape::Pyramid
        } else {
            Shape::TwistedPrism
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Shape::Cube => "cube",
            Shape::Sphere => "sphere",
            Shape::Cylinder => "cylinder",
            Shape::Pyramid => "pyramid",
            Shape::TwistedPrism => "twisted_prism",
        }
    }

    /// Malha fechada da forma: vértices e faces poligonais com base 0.
    pub fn build(&self) -> (Vec<[f64; 3]>, Vec<Vec<usize>>) {
        match self {
            Shape::Cube => cube(),
            Shape::Sphere => sphere(8, 12),
            Shape::Cylinder => cylinder(8),
            Shape::Pyramid => pyramid(),
            Shape::TwistedPrism => twisted_prism(10, 6),
        }
    }
}

fn cube() -> (Vec<[f64; 3]>, Vec<Vec<usize>>) {
    let vertices = vec![
        [-1.0, -1.0, -1.0],
        [1.0, -1.0, -1.0],
        [1.0, 1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, 1.0],
        [1.0, -1.0, 1.0],
        [1.0, 1.0, 1.0],
        [-1.0, 1.0, 1.0],
    ];
    let faces = vec![
        vec![0, 3, 2, 1],
        vec![4, 5, 6, 7],
        vec![0, 1, 5, 4],
        vec![2, 3, 7, 6],
        vec![1, 2, 6, 5],
        vec![0, 4, 7, 3],
    ];
    (vertices, faces)
}

fn sphere(rings: usize, segments: usize) -> (Vec<[f64; 3]>, Vec<Vec<usize>>) {
    let mut vertices = vec![[0.0, 0.0, 1.0]];
    for r in 1..rings {
        let theta = PI * r as f64 / rings as f64;
        for s in 0..segments {
            let phi = 2.0 * PI * s as f64 / segments as f64;
            vertices.push([theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()]);
        }
    }
    vertices.push([0.0, 0.0, -1.0]);
    let south = vertices.len() - 1;
    let at = |r: usize, s: usize| 1 + (r - 1) * segments + s % segments;

    let mut faces = Vec::new();
    for s in 0..segments {
        faces.push(vec![0, at(1, s), at(1, s + 1)]);
    }
    for r in 1..rings - 1 {
        for s in 0..segments {
            faces.push(vec![at(r, s), at(r + 1, s), at(r + 1, s + 1)]);
            faces.push(vec![at(r, s), at(r + 1, s + 1), at(r, s + 1)]);
        }
    }
    for s in 0..segments {
        faces.push(vec![south, at(rings - 1, s + 1), at(rings - 1, s)]);
    }
    (vertices, faces)
}

fn cylinder(segments: usize) -> (Vec<[f64; 3]>, Vec<Vec<usize>>) {
    let mut vertices = Vec::with_capacity(2 * segments + 2);
    for z in [0.0, 2.0] {
        for s in 0..segments {
            let phi = 2.0 * PI * s as f64 / segments as f64;
            vertices.push([phi.cos(), phi.sin(), z]);
        }
    }
    let bottom_center = vertices.len();
    vertices.push([0.0, 0.0, 0.0]);
    let top_center = vertices.len();
    vertices.push([0.0, 0.0, 2.0]);

    let mut faces = Vec::new();
    for s in 0..segments {
        let next = (s + 1) % segments;
        faces.push(vec![s, next, segments + next, segments + s]);
        faces.push(vec![bottom_center, next, s]);
        faces.push(vec![top_center, segments + s, segments + next]);
    }
    (vertices, faces)
}

fn pyramid() -> (Vec<[f64; 3]>, Vec<Vec<usize>>) {
    let vertices = vec![
        [-1.0, -1.0, 0.0],
        [1.0, -1.0, 0.0],
        [1.0, 1.0, 0.0],
        [-1.0, 1.0, 0.0],
        [0.0, 0.0, 1.5],
    ];
    let faces = vec![
        vec![0, 3, 2, 1],
        vec![0, 1, 4],
        vec![1, 2, 4],
        vec![2, 3, 4],
        vec![3, 0, 4],
    ];
    (vertices, faces)
}

/// Polígonos empilhados, cada um girado e escalado um pouco mais que o anterior.
fn twisted_prism(layers: usize, sides: usize) -> (Vec<[f64; 3]>, Vec<Vec<usize>>) {
    let mut vertices = Vec::with_capacity(layers * sides);
    for layer in 0..layers {
        let z = layer as f64 * 0.5;
        let twist = layer as f64 * 0.1;
        let radius = 1.0 + 0.3 * (layer as f64 * 0.5).sin();
        for s in 0..sides {
            let phi = 2.0 * PI * s as f64 / sides as f64 + twist;
            vertices.push([radius * phi.cos(), radius * phi.sin(), z]);
        }
    }

    let at = |layer: usize, s: usize| layer * sides + s % sides;
    let mut faces = Vec::new();
    for layer in 0..layers - 1 {
        for s in 0..sides {
            faces.push(vec![at(layer, s), at(layer, s + 1), at(layer + 1, s + 1), at(layer + 1, s)]);
        }
    }
    faces.push((0..sides).rev().map(|s| at(0, s)).collect());
    faces.push((0..sides).map(|s| at(layers - 1, s)).collect());
    (vertices, faces)
}

/// Serializa uma malha como Wavefront OBJ (índices com base 1).
pub fn to_obj(name: &str, vertices: &[[f64; 3]], faces: &[Vec<usize>]) -> String {
    let mut obj = format!("# meshcache procedural model\no {}\n", name);
    for v in vertices {
        let _ = writeln!(obj, "v {:.6} {:.6} {:.6}", v[0], v[1], v[2]);
    }
    for face in faces {
        let indices: Vec<String> = face.iter().map(|i| (i + 1).to_string()).collect();
        let _ = writeln!(obj, "f {}", indices.join(" "));
    }
    obj
}

/// Backend offline que grava primitivas OBJ procedurais.
#[derive(Debug, Clone, Default)]
pub struct ProceduralGenerator;

impl ProceduralGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelGenerator for ProceduralGenerator {
    fn name(&self) -> &str {
        "procedural"
    }

    async fn generate(&self, input: &Input, output_dir: &Path) -> Result<GeneratedModel> {
        let shape = Shape::for_input(input);
        let (vertices, faces) = shape.build();

        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let path = output_dir.join(format!("{}.obj", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, to_obj(shape.name(), &vertices, &faces))
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::debug!(shape = shape.name(), path = %path.display(), "Generated procedural model");

        Ok(GeneratedModel {
            path,
            vertex_count: vertices.len(),
            face_count: faces.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{parse_obj, Mesh};

    fn mesh(shape: Shape) -> Mesh {
        let (vertices, faces) = shape.build();
        Mesh::new(vertices, faces)
    }

    #[test]
    fn test_shape_selection() {
        assert_eq!(Shape::for_input(&Input::text("a red Box")), Shape::Cube);
        assert_eq!(Shape::for_input(&Input::text("a beach ball")), Shape::Sphere);
        assert_eq!(Shape::for_input(&Input::text("copper pipe")), Shape::Cylinder);
        assert_eq!(Shape::for_input(&Input::text("a pyramid")), Shape::Pyramid);
        assert_eq!(Shape::for_input(&Input::text("a dragon")), Shape::TwistedPrism);
        assert_eq!(
            Shape::for_input(&Input::image_bytes(vec![0u8; 4])),
            Shape::TwistedPrism
        );
    }

    #[test]
    fn test_shapes_are_closed() {
        for shape in [
            Shape::Cube,
            Shape::Sphere,
            Shape::Cylinder,
            Shape::Pyramid,
            Shape::TwistedPrism,
        ] {
            let mesh = mesh(shape);
            assert!(mesh.is_watertight(), "{} is open", shape.name());
            assert!(mesh.signed_volume().abs() > 0.0);
        }
    }

    #[test]
    fn test_shape_sizes() {
        assert_eq!(mesh(Shape::Cube).vertex_count(), 8);
        assert_eq!(mesh(Shape::Cylinder).vertex_count(), 18);
        assert_eq!(mesh(Shape::TwistedPrism).vertex_count(), 60);
    }

    #[test]
    fn test_obj_roundtrip_through_parser() {
        let (vertices, faces) = Shape::Pyramid.build();
        let parsed = parse_obj(&to_obj("pyramid", &vertices, &faces)).unwrap();
        assert_eq!(parsed.faces, faces);
        assert_eq!(parsed.vertex_count(), 5);
    }

    #[tokio::test]
    async fn test_generate_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let model = ProceduralGenerator::new()
            .generate(&Input::text("a cube"), &dir.path().join("models"))
            .await
            .unwrap();

        assert!(model.path.exists());
        assert_eq!(model.vertex_count, 8);
        assert_eq!(model.face_count, 6);
    }
}
