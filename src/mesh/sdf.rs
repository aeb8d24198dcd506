use std::path::{Path, PathBuf};

use crate::error::{IsoError, Result};
use crate::mesh::obj::{self, ObjMesh};
use crate::mesh::types::{Pt3, Vec3, AABB};

/// Per-object signed distance query.
///
/// Negative inside, positive outside. Must be total over R^3 and safe to
/// call from several threads at once, since grid evaluation is parallel.
pub trait SdfSource: Send + Sync {
    fn distance(&self, point: &Pt3) -> f32;
}

impl<F> SdfSource for F
where
    F: Fn(&Pt3) -> f32 + Send + Sync,
{
    fn distance(&self, point: &Pt3) -> f32 {
        self(point)
    }
}

/// Signed distance function for a sphere
pub fn sphere_sdf(point: &Pt3, center: &Pt3, radius: f32) -> f32 {
    (point - center).magnitude() - radius
}

/// Analytic sphere, mostly for tests and demos.
#[derive(Debug, Clone, Copy)]
pub struct SphereSdf {
    pub center: Pt3,
    pub radius: f32,
}

impl SphereSdf {
    pub fn new(center: Pt3, radius: f32) -> Self {
        Self { center, radius }
    }
}

impl SdfSource for SphereSdf {
    fn distance(&self, point: &Pt3) -> f32 {
        sphere_sdf(point, &self.center, self.radius)
    }
}

/// Signed distance to a closed triangle mesh.
///
/// Distance is exact. Every triangle is visited, but the closest-point test
/// is skipped when the triangle's box is already farther than the best hit
/// so far. The sign comes from
/// the closest triangle's face normal, so the mesh must be consistently
/// wound with normals facing out.
#[derive(Debug, Clone)]
pub struct MeshSdf {
    triangles: Vec<[Pt3; 3]>,
    face_normals: Vec<Vec3>,
    face_bounds: Vec<AABB>,
    bounds: AABB,
}

impl MeshSdf {
    /// Build from an already-parsed mesh.
    pub fn from_obj(mesh: &ObjMesh) -> Result<Self> {
        let triangles: Vec<[Pt3; 3]> = mesh
            .faces
            .iter()
            .map(|f| {
                [
                    mesh.positions[f[0]],
                    mesh.positions[f[1]],
                    mesh.positions[f[2]],
                ]
            })
            .collect();

        if triangles.is_empty() {
            return Err(IsoError::EmptyMesh {
                path: PathBuf::new(),
            });
        }

        Ok(Self::from_triangles(triangles))
    }

    pub fn from_triangles(triangles: Vec<[Pt3; 3]>) -> Self {
        let face_normals = triangles
            .iter()
            .map(|[a, b, c]| {
                (b - a)
                    .cross(&(c - a))
                    .try_normalize(f32::EPSILON)
                    .unwrap_or_else(Vec3::z)
            })
            .collect();

        let face_bounds: Vec<AABB> = triangles
            .iter()
            .map(|[a, b, c]| AABB::new(a.inf(b).inf(c), a.sup(b).sup(c)))
            .collect();

        let mut min = Pt3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
        let mut max = Pt3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
        for face in &face_bounds {
            min = min.inf(&face.min);
            max = max.sup(&face.max);
        }

        Self {
            triangles,
            face_normals,
            face_bounds,
            bounds: AABB::new(min, max),
        }
    }

    /// Load an OBJ file and prepare it for distance queries.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mesh = obj::read_obj(path)?;
        let sdf = Self::from_obj(&mesh).map_err(|err| match err {
            IsoError::EmptyMesh { .. } => IsoError::EmptyMesh {
                path: path.to_path_buf(),
            },
            other => other,
        })?;
        tracing::debug!(
            "Loaded {:?}: {} triangles",
            path,
            sdf.triangle_count()
        );
        Ok(sdf)
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn bounds(&self) -> AABB {
        self.bounds
    }

    fn closest_face(&self, point: &Pt3) -> (f32, usize) {
        let mut min_dist_sq = f32::MAX;
        let mut closest_face = 0;

        for (face_idx, [a, b, c]) in self.triangles.iter().enumerate() {
            if self.face_bounds[face_idx].distance_squared(point) >= min_dist_sq {
                continue;
            }
            let closest = closest_point_on_triangle(point, a, b, c);
            let dist_sq = (closest - point).magnitude_squared();

            if dist_sq < min_dist_sq {
                min_dist_sq = dist_sq;
                closest_face = face_idx;
            }
        }

        (min_dist_sq.sqrt(), closest_face)
    }
}

impl SdfSource for MeshSdf {
    fn distance(&self, point: &Pt3) -> f32 {
        let (dist, face) = self.closest_face(point);
        let to_point = point - self.triangles[face][0];
        if to_point.dot(&self.face_normals[face]) >= 0.0 {
            dist
        } else {
            -dist
        }
    }
}

/// Closest point on triangle `abc` to `point` (Ericson, Real-Time Collision
/// Detection, 5.1.5).
pub fn closest_point_on_triangle(point: &Pt3, a: &Pt3, b: &Pt3, c: &Pt3) -> Pt3 {
    let ab = b - a;
    let ac = c - a;
    let ap = point - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = point - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = point - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}
