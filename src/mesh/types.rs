use bytemuck::{Pod, Zeroable};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{IsoError, Result};

pub type Pt3 = Point3<f32>;
pub type Vec3 = Vector3<f32>;

/// Axis-aligned bounding box in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Pt3,
    pub max: Pt3,
}

impl AABB {
    pub fn new(min: Pt3, max: Pt3) -> Self {
        Self { min, max }
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn is_valid(&self) -> bool {
        let e = self.extent();
        e.x > 0.0 && e.y > 0.0 && e.z > 0.0
    }

    /// Squared distance from `p` to the box, zero inside.
    pub fn distance_squared(&self, p: &Pt3) -> f32 {
        let below = self.min - p;
        let above = p - self.max;
        below.sup(&above).sup(&Vec3::zeros()).magnitude_squared()
    }
}

/// One unit cube of the sampled volume: corner positions in grid-index
/// space and the scalar sample at each corner.
///
/// Corner numbering follows the polygonizer tables: 0..3 walk the `k` face,
/// 4..7 the `k + 1` face.
#[derive(Debug, Clone, Copy)]
pub struct GridCell {
    pub p: [Pt3; 8],
    pub val: [f32; 8],
}

/// A triangle in grid-index space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub p: [Pt3; 3],
}

/// Interleaved normal + position, laid out for direct GPU upload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct VertexRecord {
    pub normal: [f32; 3],
    pub position: [f32; 3],
}

/// Flat triangle soup for one (offset level, object) pair.
///
/// Vertices are not shared: every triangle contributes three positions and
/// repeats its flat normal three times, so `normals.len() == vertices.len()`
/// and both are multiples of nine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub normals: Vec<f32>,
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_triangle_capacity(triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(triangles * 9),
            normals: Vec::with_capacity(triangles * 9),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 9
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Append one triangle with a shared flat normal.
    pub fn push_triangle(&mut self, positions: [[f32; 3]; 3], normal: [f32; 3]) {
        for position in positions {
            self.vertices.extend_from_slice(&position);
            self.normals.extend_from_slice(&normal);
        }
    }

    /// Interleave into `VertexRecord`s (normal first, then position).
    pub fn records(&self) -> Vec<VertexRecord> {
        self.vertices
            .chunks_exact(3)
            .zip(self.normals.chunks_exact(3))
            .map(|(v, n)| VertexRecord {
                normal: [n[0], n[1], n[2]],
                position: [v[0], v[1], v[2]],
            })
            .collect()
    }

    /// Pack into a byte buffer: vertex byte length and normal byte length as
    /// little-endian u32, followed by the vertex floats and the normal floats.
    ///
    /// Fails when either array is 4 GiB or more, since the header cannot
    /// describe it.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&self.vertices);
        let normal_bytes: &[u8] = bytemuck::cast_slice(&self.normals);
        let vertex_len = length_header(vertex_bytes.len())?;
        let normal_len = length_header(normal_bytes.len())?;

        let mut bytes = Vec::with_capacity(8 + vertex_bytes.len() + normal_bytes.len());
        bytes.extend_from_slice(&vertex_len);
        bytes.extend_from_slice(&normal_len);

        if cfg!(target_endian = "little") {
            bytes.extend_from_slice(vertex_bytes);
            bytes.extend_from_slice(normal_bytes);
        } else {
            for f in self.vertices.iter().chain(self.normals.iter()) {
                bytes.extend_from_slice(&f.to_le_bytes());
            }
        }

        Ok(bytes)
    }
}

fn length_header(bytes: usize) -> Result<[u8; 4]> {
    u32::try_from(bytes)
        .map(u32::to_le_bytes)
        .map_err(|_| IsoError::BufferTooLarge { bytes })
}
