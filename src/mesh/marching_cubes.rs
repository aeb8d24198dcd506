use crate::mesh::grid_trait::Grid;
use crate::mesh::tables::{EDGE_CORNERS, EDGE_TABLE, TRI_TABLE};
use crate::mesh::types::{GridCell, MeshData, Pt3, Triangle, Vec3};
use rayon::prelude::*;

/// Tolerance used by the interpolation guards.
const INTERP_EPSILON: f32 = 1e-5;

/// Point on the segment `p1..p2` where the field crosses `isolevel`,
/// assuming the field is linear between `valp1` and `valp2`.
///
/// Guards run in a fixed order: an endpoint sitting on the isolevel wins
/// (`p1` first), and a flat segment returns `p1`.
pub fn vertex_interp(isolevel: f32, p1: Pt3, p2: Pt3, valp1: f32, valp2: f32) -> Pt3 {
    if (isolevel - valp1).abs() < INTERP_EPSILON {
        return p1;
    }
    if (isolevel - valp2).abs() < INTERP_EPSILON {
        return p2;
    }
    if (valp1 - valp2).abs() < INTERP_EPSILON {
        return p1;
    }

    let mu = (isolevel - valp1) / (valp2 - valp1);
    p1 + (p2 - p1) * mu
}

/// 8-bit configuration: bit `n` set when corner `n` is below `isolevel`.
#[inline]
pub fn cube_index(cell: &GridCell, isolevel: f32) -> usize {
    cell.val
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < isolevel)
        .fold(0, |index, (corner, _)| index | (1usize << corner))
}

/// Triangulate one cube. Appends 0..=5 triangles to `triangles` and returns
/// how many were added.
pub fn marching_triangles(cell: &GridCell, isolevel: f32, triangles: &mut Vec<Triangle>) -> usize {
    let index = cube_index(cell, isolevel);
    let edges = EDGE_TABLE[index];

    // Entirely inside or entirely outside.
    if edges == 0 {
        return 0;
    }

    let mut vertlist = [Pt3::origin(); 12];
    for (edge, &(a, b)) in EDGE_CORNERS.iter().enumerate() {
        if edges & (1 << edge) != 0 {
            vertlist[edge] = vertex_interp(isolevel, cell.p[a], cell.p[b], cell.val[a], cell.val[b]);
        }
    }

    let mut added = 0;
    for tri in TRI_TABLE[index].chunks_exact(3) {
        if tri[0] == -1 {
            break;
        }
        triangles.push(Triangle {
            p: [
                vertlist[tri[0] as usize],
                vertlist[tri[1] as usize],
                vertlist[tri[2] as usize],
            ],
        });
        added += 1;
    }

    added
}

/// Flat normal `normalize((p1 - p0) x (p2 - p0))`. Degenerate triangles get
/// a zero vector.
pub fn triangle_normal(tri: &Triangle) -> Vec3 {
    let normal = (tri.p[1] - tri.p[0]).cross(&(tri.p[2] - tri.p[0]));
    let length = normal.magnitude();

    if length > 0.0 {
        normal / length
    } else {
        tracing::trace!("Degenerate triangle {:?}, keeping zero normal", tri.p);
        Vec3::zeros()
    }
}

/// Unit cube at `(i, j, k)` with corners in table order.
pub fn grid_cell<G: Grid + ?Sized>(grid: &G, i: usize, j: usize, k: usize) -> GridCell {
    const OFFSETS: [(usize, usize, usize); 8] = [
        (0, 0, 0),
        (1, 0, 0),
        (1, 1, 0),
        (0, 1, 0),
        (0, 0, 1),
        (1, 0, 1),
        (1, 1, 1),
        (0, 1, 1),
    ];

    let mut cell = GridCell {
        p: [Pt3::origin(); 8],
        val: [0.0; 8],
    };
    for (corner, &(di, dj, dk)) in OFFSETS.iter().enumerate() {
        let (ci, cj, ck) = (i + di, j + dj, k + dk);
        cell.p[corner] = Pt3::new(ci as f32, cj as f32, ck as f32);
        cell.val[corner] = grid.get(ci, cj, ck);
    }
    cell
}

/// Map a grid-index point into `[-1, 1)` per axis: x against depth,
/// y against height, z against width.
#[inline]
pub fn normalize_position(p: &Pt3, width: usize, height: usize, depth: usize) -> [f32; 3] {
    [
        p.x / depth as f32 * 2.0 - 1.0,
        p.y / height as f32 * 2.0 - 1.0,
        p.z / width as f32 * 2.0 - 1.0,
    ]
}

/// Inverse of [`normalize_position`].
#[inline]
pub fn denormalize_position(v: [f32; 3], width: usize, height: usize, depth: usize) -> Pt3 {
    Pt3::new(
        (v[0] + 1.0) * 0.5 * depth as f32,
        (v[1] + 1.0) * 0.5 * height as f32,
        (v[2] + 1.0) * 0.5 * width as f32,
    )
}

/// Extract the `isolevel` surface of `grid` as a flat-shaded triangle soup
/// in normalized coordinates.
///
/// Depth slabs are triangulated in parallel and concatenated in slab order,
/// so output is identical to a serial walk over `i`, then `j`, then `k`.
pub fn polygonize<G: Grid + ?Sized>(grid: &G, isolevel: f32) -> MeshData {
    let (width, height, depth) = grid.dimensions();
    if width < 2 || height < 2 || depth < 2 {
        return MeshData::new();
    }

    let slabs: Vec<Vec<Triangle>> = (0..depth - 1)
        .into_par_iter()
        .map(|i| {
            let mut triangles = Vec::new();
            for j in 0..height - 1 {
                for k in 0..width - 1 {
                    let cell = grid_cell(grid, i, j, k);
                    marching_triangles(&cell, isolevel, &mut triangles);
                }
            }
            triangles
        })
        .collect();

    let total: usize = slabs.iter().map(Vec::len).sum();
    let mut mesh = MeshData::with_triangle_capacity(total);
    let mut degenerate = 0usize;

    for tri in slabs.iter().flatten() {
        let normal = triangle_normal(tri);
        if normal == Vec3::zeros() {
            degenerate += 1;
        }
        mesh.push_triangle(
            [
                normalize_position(&tri.p[0], width, height, depth),
                normalize_position(&tri.p[1], width, height, depth),
                normalize_position(&tri.p[2], width, height, depth),
            ],
            [normal.x, normal.y, normal.z],
        );
    }

    if degenerate > 0 {
        tracing::debug!(
            "{} of {} triangles are degenerate (zero normal)",
            degenerate,
            total
        );
    }

    mesh
}
