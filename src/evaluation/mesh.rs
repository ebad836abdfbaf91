//! Malha poligonal e as verificações geométricas usadas pelas métricas.

use std::collections::HashMap;

use crate::{MeshCacheError, MeshCacheResult};

/// Faces com área abaixo disso são degeneradas.
pub const DEGENERATE_AREA: f64 = 1e-10;

const PARALLEL_EPSILON: f64 = 1e-12;

type Vec3 = [f64; 3];

/// Vértices, faces poligonais e os atributos de superfície encontrados na carga.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    /// Índices de vértices por face, três ou mais em cada.
    pub faces: Vec<Vec<usize>>,
    pub has_uv: bool,
    pub has_vertex_colors: bool,
    pub has_material: bool,
}

/// Caixa delimitadora alinhada aos eixos.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn extents(&self) -> Vec3 {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

impl Mesh {
    pub fn new(vertices: Vec<Vec3>, faces: Vec<Vec<usize>>) -> Self {
        Self {
            vertices,
            faces,
            ..Default::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Falha quando alguma coordenada é NaN ou infinita.
    pub fn ensure_finite(&self, metric: &'static str) -> MeshCacheResult<()> {
        if self.vertices.iter().flatten().all(|c| c.is_finite()) {
            Ok(())
        } else {
            Err(MeshCacheError::metric(metric, "non-finite vertex coordinates"))
        }
    }

    /// Triangulação em leque de todas as faces.
    pub fn triangles(&self) -> Vec<[usize; 3]> {
        let mut triangles = Vec::with_capacity(self.faces.len() * 2);
        for face in &self.faces {
            for i in 1..face.len().saturating_sub(1) {
                triangles.push([face[0], face[i], face[i + 1]]);
            }
        }
        triangles
    }

    /// Área de uma face poligonal, somada sobre seus triângulos em leque.
    pub fn face_area(&self, face: &[usize]) -> f64 {
        (1..face.len().saturating_sub(1))
            .map(|i| {
                let (a, b, c) = (
                    self.vertices[face[0]],
                    self.vertices[face[i]],
                    self.vertices[face[i + 1]],
                );
                0.5 * norm(cross(sub(b, a), sub(c, a)))
            })
            .sum()
    }

    pub fn degenerate_face_count(&self) -> usize {
        self.faces
            .iter()
            .filter(|face| self.face_area(face) < DEGENERATE_AREA)
            .count()
    }

    /// Mapeia cada índice de vértice para o primeiro índice na mesma posição,
    /// para unir vértices duplicados (costuras de UV, normais por face).
    fn welded(&self) -> Vec<usize> {
        let key = |v: &Vec3| v.map(|c| if c == 0.0 { 0u64 } else { c.to_bits() });

        let mut first: HashMap<[u64; 3], usize> = HashMap::with_capacity(self.vertices.len());
        self.vertices
            .iter()
            .enumerate()
            .map(|(i, v)| *first.entry(key(v)).or_insert(i))
            .collect()
    }

    fn welded_triangles(&self) -> Vec<[usize; 3]> {
        let weld = self.welded();
        self.triangles()
            .into_iter()
            .map(|t| t.map(|i| weld[i]))
            .collect()
    }

    /// Superfície fechada: toda aresta não orientada pertence a exatamente dois triângulos.
    pub fn is_watertight(&self) -> bool {
        let triangles = self.welded_triangles();
        if triangles.is_empty() {
            return false;
        }

        let mut edges: HashMap<(usize, usize), u32> = HashMap::new();
        for t in &triangles {
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                if a == b {
                    continue;
                }
                *edges.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        !edges.is_empty() && edges.values().all(|count| *count == 2)
    }

    /// Volume com sinal pelo teorema da divergência. Positivo para orientação
    /// externa em uma superfície fechada.
    pub fn signed_volume(&self) -> f64 {
        self.triangles()
            .iter()
            .map(|t| {
                let (a, b, c) = (self.vertices[t[0]], self.vertices[t[1]], self.vertices[t[2]]);
                dot(a, cross(b, c)) / 6.0
            })
            .sum()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let first = *self.vertices.first()?;
        let mut bounds = Bounds {
            min: first,
            max: first,
        };
        for v in &self.vertices[1..] {
            for axis in 0..3 {
                bounds.min[axis] = bounds.min[axis].min(v[axis]);
                bounds.max[axis] = bounds.max[axis].max(v[axis]);
            }
        }
        Some(bounds)
    }

    /// Se dois triângulos sem vértice em comum se cruzam.
    ///
    /// Os pares candidatos vêm de uma grade uniforme sobre as caixas dos
    /// triângulos, com células do tamanho de um triângulo médio. Cada par é
    /// testado só na célula que contém o canto inferior da interseção das
    /// caixas. Contato coplanar não conta.
    pub fn is_self_intersecting(&self) -> bool {
        let triangles = self.welded_triangles();
        if triangles.len() < 2 {
            return false;
        }
        let boxes: Vec<Bounds> = triangles
            .iter()
            .map(|t| triangle_bounds(&self.vertices, t))
            .collect();
        let grid = Grid::new(&boxes);

        let crossing = |i: usize, j: usize| {
            if !overlaps(&boxes[i], &boxes[j]) {
                return false;
            }
            let (a, b) = (triangles[i], triangles[j]);
            if a.iter().any(|v| b.contains(v)) {
                return false;
            }
            triangles_intersect(&a.map(|k| self.vertices[k]), &b.map(|k| self.vertices[k]))
        };

        let mut cells: HashMap<[i64; 3], Vec<usize>> = HashMap::new();
        let mut oversized = Vec::new();
        let mut is_oversized = vec![false; boxes.len()];
        for (i, b) in boxes.iter().enumerate() {
            let (lo, hi) = (grid.cell(&b.min), grid.cell(&b.max));
            if grid.cells_between(&lo, &hi) > MAX_CELLS_PER_TRIANGLE {
                oversized.push(i);
                is_oversized[i] = true;
                continue;
            }
            for x in lo[0]..=hi[0] {
                for y in lo[1]..=hi[1] {
                    for z in lo[2]..=hi[2] {
                        cells.entry([x, y, z]).or_default().push(i);
                    }
                }
            }
        }

        for (key, members) in &cells {
            for (pos, &i) in members.iter().enumerate() {
                for &j in &members[pos + 1..] {
                    let corner =
                        [0usize, 1, 2].map(|axis| boxes[i].min[axis].max(boxes[j].min[axis]));
                    if grid.cell(&corner) != *key {
                        continue;
                    }
                    if crossing(i, j) {
                        return true;
                    }
                }
            }
        }

        // Triângulos que cobrem muitas células são testados contra todos.
        for (pos, &i) in oversized.iter().enumerate() {
            let others = (0..triangles.len()).filter(|&j| !is_oversized[j]);
            if others
                .chain(oversized[pos + 1..].iter().copied())
                .any(|j| crossing(i, j))
            {
                return true;
            }
        }
        false
    }
}

/// Triângulos cuja caixa cobre mais células que isso ficam fora da grade.
const MAX_CELLS_PER_TRIANGLE: u64 = 64;

/// Grade uniforme para a busca ampla de pares.
struct Grid {
    origin: Vec3,
    cell: f64,
}

impl Grid {
    fn new(boxes: &[Bounds]) -> Self {
        let mut origin = boxes[0].min;
        let mut extent_sum: f64 = 0.0;
        for b in boxes {
            for axis in 0..3 {
                origin[axis] = origin[axis].min(b.min[axis]);
            }
            extent_sum += b.extents().iter().cloned().fold(0.0, f64::max);
        }
        let mean = extent_sum / boxes.len() as f64;
        let cell = if mean.is_finite() && mean > 0.0 { mean } else { 1.0 };
        let origin = origin.map(|c| if c.is_finite() { c } else { 0.0 });
        Self { origin, cell }
    }

    fn cell(&self, p: &Vec3) -> [i64; 3] {
        [0usize, 1, 2].map(|axis| ((p[axis] - self.origin[axis]) / self.cell).floor() as i64)
    }

    fn cells_between(&self, lo: &[i64; 3], hi: &[i64; 3]) -> u64 {
        (0..3).fold(1u64, |acc, axis| {
            let span = hi[axis].saturating_sub(lo[axis]).saturating_add(1).max(1) as u64;
            acc.saturating_mul(span)
        })
    }
}

fn triangle_bounds(vertices: &[Vec3], t: &[usize; 3]) -> Bounds {
    let mut bounds = Bounds {
        min: vertices[t[0]],
        max: vertices[t[0]],
    };
    for &k in &t[1..] {
        for axis in 0..3 {
            bounds.min[axis] = bounds.min[axis].min(vertices[k][axis]);
            bounds.max[axis] = bounds.max[axis].max(vertices[k][axis]);
        }
    }
    bounds
}

fn overlaps(a: &Bounds, b: &Bounds) -> bool {
    (0..3).all(|axis| a.min[axis] <= b.max[axis] && b.min[axis] <= a.max[axis])
}

fn triangles_intersect(a: &[Vec3; 3], b: &[Vec3; 3]) -> bool {
    let edges = |t: &[Vec3; 3]| [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])];
    edges(a)
        .iter()
        .any(|(p, q)| segment_hits_triangle(*p, *q, b))
        || edges(b)
            .iter()
            .any(|(p, q)| segment_hits_triangle(*p, *q, a))
}

/// Möller-Trumbore restrito ao segmento `p..q`.
fn segment_hits_triangle(p: Vec3, q: Vec3, t: &[Vec3; 3]) -> bool {
    let dir = sub(q, p);
    let e1 = sub(t[1], t[0]);
    let e2 = sub(t[2], t[0]);

    let h = cross(dir, e2);
    let det = dot(e1, h);
    if det.abs() < PARALLEL_EPSILON {
        return false;
    }

    let inv = 1.0 / det;
    let s = sub(p, t[0]);
    let u = inv * dot(s, h);
    if !(0.0..=1.0).contains(&u) {
        return false;
    }
    let qv = cross(s, e1);
    let v = inv * dot(dir, qv);
    if v < 0.0 || u + v > 1.0 {
        return false;
    }
    let along = inv * dot(e2, qv);
    (0.0..=1.0).contains(&along)
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Cubo unitário, 8 vértices, 6 quads com orientação externa.
    pub(crate) fn cube() -> Mesh {
        let vertices = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        let faces = vec![
            vec![0, 3, 2, 1],
            vec![4, 5, 6, 7],
            vec![0, 1, 5, 4],
            vec![2, 3, 7, 6],
            vec![1, 2, 6, 5],
            vec![0, 4, 7, 3],
        ];
        Mesh::new(vertices, faces)
    }

    #[test]
    fn test_cube_is_closed_with_unit_volume() {
        let mesh = cube();
        assert!(mesh.is_watertight());
        assert!(!mesh.is_self_intersecting());
        assert_eq!(mesh.degenerate_face_count(), 0);
        assert_eq!(mesh.triangles().len(), 12);
        assert!((mesh.signed_volume() - 1.0).abs() < 1e-9);
        assert_eq!(mesh.bounds().unwrap().extents(), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_open_mesh_is_not_watertight() {
        let mut mesh = cube();
        mesh.faces.pop();
        assert!(!mesh.is_watertight());
    }

    #[test]
    fn test_split_vertices_are_welded() {
        // Dois triângulos de um quadrado, cada um com sua cópia da diagonal.
        let mesh = Mesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            vec![vec![0, 1, 2], vec![3, 4, 5]],
        );
        // Soldada, a diagonal é compartilhada; o contorno continua aberto.
        assert!(!mesh.is_watertight());
        assert!(!mesh.is_self_intersecting());
    }

    #[test]
    fn test_degenerate_faces() {
        let mesh = Mesh::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![vec![0, 1, 2], vec![0, 1, 3]],
        );
        assert_eq!(mesh.degenerate_face_count(), 1);
    }

    #[test]
    fn test_crossing_triangles_intersect() {
        let mesh = Mesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [2.0, 0.0, 0.0],
                [0.0, 2.0, 0.0],
                [0.5, 0.5, -1.0],
                [0.5, 0.5, 1.0],
                [1.5, 1.5, 0.0],
            ],
            vec![vec![0, 1, 2], vec![3, 4, 5]],
        );
        assert!(mesh.is_self_intersecting());
    }

    #[test]
    fn test_separated_triangles_do_not_intersect() {
        let mesh = Mesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 5.0],
                [1.0, 0.0, 5.0],
                [0.0, 1.0, 5.0],
            ],
            vec![vec![0, 1, 2], vec![3, 4, 5]],
        );
        assert!(!mesh.is_self_intersecting());
    }

    /// Grade plana `n` x `n` de quads unitários no plano x = 0.
    fn yz_wall(n: usize) -> Mesh {
        let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
        for y in 0..=n {
            for z in 0..=n {
                vertices.push([0.0, y as f64, z as f64]);
            }
        }
        let at = |y: usize, z: usize| y * (n + 1) + z;
        let mut faces = Vec::with_capacity(n * n);
        for y in 0..n {
            for z in 0..n {
                faces.push(vec![at(y, z), at(y + 1, z), at(y + 1, z + 1), at(y, z + 1)]);
            }
        }
        Mesh::new(vertices, faces)
    }

    #[test]
    fn test_flat_wall_checks_in_bounded_time() {
        let mesh = yz_wall(150);
        assert_eq!(mesh.triangles().len(), 45_000);

        let started = std::time::Instant::now();
        assert!(!mesh.is_self_intersecting());
        assert!(
            started.elapsed() < std::time::Duration::from_secs(10),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_large_triangle_crossing_small_ones() {
        let mut vertices = Vec::new();
        let mut faces = Vec::new();
        for k in 0..50 {
            let x = k as f64 * 3.0;
            let base = vertices.len();
            vertices.extend([[x, 0.0, 0.0], [x + 1.0, 0.0, 0.0], [x, 1.0, 0.0]]);
            faces.push(vec![base, base + 1, base + 2]);
        }
        let mesh = Mesh::new(vertices.clone(), faces.clone());
        assert!(!mesh.is_self_intersecting());

        // Triângulo em pé no plano y = 0.25, muito maior que os demais.
        let base = vertices.len();
        vertices.extend([[-10.0, 0.25, -10.0], [300.0, 0.25, -10.0], [-10.0, 0.25, 300.0]]);
        faces.push(vec![base, base + 1, base + 2]);
        assert!(Mesh::new(vertices, faces).is_self_intersecting());
    }

    #[test]
    fn test_non_finite_coordinates() {
        let mut mesh = cube();
        assert!(mesh.ensure_finite("geometry").is_ok());
        mesh.vertices[0][1] = f64::NAN;
        assert!(matches!(
            mesh.ensure_finite("geometry"),
            Err(MeshCacheError::SubMetricFailure { metric: "geometry", .. })
        ));
    }
}
