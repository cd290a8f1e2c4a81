use glam::{DVec2, DVec3, DVec4};

use super::{BlendIndex, MaterialIndex, SkinIndex};
use crate::convert::TransformConverter;

/// A polygon as a run of corners in the mesh's per-corner buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Face {
    pub index_begin: u32,
    pub num_indices: u32,
}

impl Face {
    pub fn num_triangles(&self) -> usize {
        (self.num_indices as usize).saturating_sub(2)
    }
}

/// Per-corner attribute: corner `i` reads `values[indices[i]]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexAttribute<T> {
    pub values: Vec<T>,
    pub indices: Vec<u32>,
}

impl<T: Copy> VertexAttribute<T> {
    pub fn new(values: Vec<T>, indices: Vec<u32>) -> VertexAttribute<T> {
        VertexAttribute { values, indices }
    }

    /// One value per corner.
    pub fn per_corner(values: Vec<T>) -> VertexAttribute<T> {
        let indices = (0..values.len() as u32).collect();
        VertexAttribute { values, indices }
    }

    pub fn get(&self, corner: usize) -> Option<T> {
        self.indices
            .get(corner)
            .and_then(|&i| self.values.get(i as usize))
            .copied()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub faces: Vec<Face>,
    /// Control points, indexed per corner.
    pub positions: VertexAttribute<DVec3>,
    pub normals: Option<VertexAttribute<DVec3>>,
    pub uvs: Option<VertexAttribute<DVec2>>,
    pub colors: Option<VertexAttribute<DVec4>>,
    /// Material slot of each face.
    pub face_materials: Vec<u32>,
    pub materials: Vec<MaterialIndex>,
    pub skin_deformers: Vec<SkinIndex>,
    pub blend_deformers: Vec<BlendIndex>,
    pub max_face_triangles: usize,
}

impl Mesh {
    /// Mesh from control points and polygons given as control point indices.
    pub fn from_polygons(name: &str, control_points: Vec<DVec3>, polygons: &[Vec<u32>]) -> Mesh {
        let mut faces = Vec::with_capacity(polygons.len());
        let mut indices = Vec::new();
        for polygon in polygons {
            faces.push(Face {
                index_begin: indices.len() as u32,
                num_indices: polygon.len() as u32,
            });
            indices.extend_from_slice(polygon);
        }
        let max_face_triangles = faces.iter().map(Face::num_triangles).max().unwrap_or(0);
        Mesh {
            name: name.to_string(),
            face_materials: vec![0; faces.len()],
            faces,
            positions: VertexAttribute::new(control_points, indices),
            max_face_triangles,
            ..Mesh::default()
        }
    }

    pub fn num_corners(&self) -> usize {
        self.positions.indices.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.positions.values.len()
    }

    /// Control point of a corner.
    pub fn vertex_index(&self, corner: usize) -> u32 {
        self.positions.indices[corner]
    }

    /// Material slot of a face, 0 when unassigned.
    pub fn face_material(&self, face: usize) -> u32 {
        self.face_materials.get(face).copied().unwrap_or(0)
    }

    pub fn total_triangles(&self) -> usize {
        self.faces.iter().map(Face::num_triangles).sum()
    }

    fn corner_position(&self, corner: u32) -> DVec3 {
        self.positions.get(corner as usize).unwrap_or(DVec3::ZERO)
    }

    fn face_normal(&self, face: &Face) -> DVec3 {
        // Newell's method, robust for non-planar and concave polygons.
        let mut n = DVec3::ZERO;
        let begin = face.index_begin;
        let count = face.num_indices;
        for i in 0..count {
            let a = self.corner_position(begin + i);
            let b = self.corner_position(begin + (i + 1) % count);
            n += DVec3::new(
                (a.y - b.y) * (a.z + b.z),
                (a.z - b.z) * (a.x + b.x),
                (a.x - b.x) * (a.y + b.y),
            );
        }
        n.normalize_or_zero()
    }

    /// Writes flat face normals for every corner.
    pub fn generate_normals(&mut self) {
        let mut values = Vec::with_capacity(self.faces.len());
        let mut indices = vec![0u32; self.num_corners()];
        for (i, face) in self.faces.iter().enumerate() {
            values.push(self.face_normal(face));
            for corner in face.index_begin..face.index_begin + face.num_indices {
                if let Some(slot) = indices.get_mut(corner as usize) {
                    *slot = i as u32;
                }
            }
        }
        self.normals = Some(VertexAttribute::new(values, indices));
    }

    /// Triangulates `face` into corner indices written to `out`, returning the triangle count.
    /// `out` must hold at least `max_face_triangles * 3` entries.
    pub fn triangulate_face(&self, out: &mut [u32], face: &Face) -> usize {
        let count = face.num_indices as usize;
        let begin = face.index_begin;
        if count < 3 || out.len() < (count - 2) * 3 {
            return 0;
        }
        if count == 3 {
            out[..3].copy_from_slice(&[begin, begin + 1, begin + 2]);
            return 1;
        }

        // Ear clipping in the face plane; falls back to a fan when no ear is found.
        let normal = self.face_normal(face);
        let (u, v) = normal.any_orthonormal_pair();
        let projected: Vec<(f64, f64)> = (0..count as u32)
            .map(|i| {
                let p = self.corner_position(begin + i);
                (p.dot(u), p.dot(v))
            })
            .collect();

        let mut remaining: Vec<usize> = (0..count).collect();
        let mut written = 0;
        while remaining.len() > 3 {
            let n = remaining.len();
            let ear = (0..n).find(|&i| {
                let prev = remaining[(i + n - 1) % n];
                let cur = remaining[i];
                let next = remaining[(i + 1) % n];
                is_ear(&projected, &remaining, prev, cur, next)
            });
            let i = match ear {
                Some(i) => i,
                None => break,
            };
            let prev = remaining[(i + n - 1) % n];
            let cur = remaining[i];
            let next = remaining[(i + 1) % n];
            out[written * 3..written * 3 + 3]
                .copy_from_slice(&[begin + prev as u32, begin + cur as u32, begin + next as u32]);
            written += 1;
            remaining.remove(i);
        }
        for i in 1..remaining.len() - 1 {
            out[written * 3..written * 3 + 3].copy_from_slice(&[
                begin + remaining[0] as u32,
                begin + remaining[i] as u32,
                begin + remaining[i + 1] as u32,
            ]);
            written += 1;
        }
        written
    }

    pub(crate) fn convert(&mut self, converter: &TransformConverter) {
        for p in self.positions.values.iter_mut() {
            *p = converter.convert_position(*p);
        }
        if let Some(normals) = self.normals.as_mut() {
            for n in normals.values.iter_mut() {
                *n = converter.convert_direction(*n);
            }
        }
    }
}

fn cross_2d(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn inside_triangle(p: (f64, f64), a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> bool {
    let d1 = cross_2d(a, b, p);
    let d2 = cross_2d(b, c, p);
    let d3 = cross_2d(c, a, p);
    d1 >= 0.0 && d2 >= 0.0 && d3 >= 0.0
}

fn is_ear(points: &[(f64, f64)], remaining: &[usize], prev: usize, cur: usize, next: usize) -> bool {
    let (a, b, c) = (points[prev], points[cur], points[next]);
    if cross_2d(a, b, c) <= 0.0 {
        return false;
    }
    remaining
        .iter()
        .filter(|&&i| i != prev && i != cur && i != next)
        .all(|&i| !inside_triangle(points[i], a, b, c))
}
