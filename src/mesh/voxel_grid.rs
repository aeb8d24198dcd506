use crate::error::{IsoError, Result};
use crate::mesh::grid_trait::Grid;
use crate::mesh::sdf::SdfSource;
use crate::mesh::types::{Vec3, AABB};
use rayon::prelude::*;

/// Dense scalar volume sampled from a signed distance field.
///
/// Sample `(i, j, k)` sits at `bounds.min + (i * cell.x, j * cell.y, k * cell.z)`
/// where `i` runs over depth (x), `j` over height (y) and `k` over width (z).
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub bounds: AABB,
    /// Samples, indexed by `i * width * height + j * width + k`.
    pub data: Vec<f32>,
    /// World size of one cell along x, y, z.
    pub cell_size: Vec3,
}

impl VoxelGrid {
    /// Allocate a grid of `width x height x depth` samples over `bounds`.
    pub fn new(width: usize, height: usize, depth: usize, bounds: AABB) -> Result<Self> {
        if width < 2 || height < 2 || depth < 2 {
            return Err(IsoError::InvalidGrid(format!(
                "need at least 2 samples per axis, got {width}x{height}x{depth}"
            )));
        }
        if !bounds.is_valid() {
            return Err(IsoError::InvalidGrid(format!(
                "empty or inverted bounding box {:?}..{:?}",
                bounds.min, bounds.max
            )));
        }

        let len = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(depth))
            .ok_or_else(|| {
                IsoError::InvalidGrid(format!("{width}x{height}x{depth} overflows"))
            })?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            IsoError::InvalidGrid(format!("cannot allocate {len} samples: {e}"))
        })?;
        data.resize(len, 0.0);

        let extent = bounds.extent();
        let cell_size = Vec3::new(
            extent.x / depth as f32,
            extent.y / height as f32,
            extent.z / width as f32,
        );

        tracing::debug!(
            "Allocated {}x{}x{} grid ({} samples), cell {:?}",
            width,
            height,
            depth,
            len,
            cell_size
        );

        Ok(Self {
            width,
            height,
            depth,
            bounds,
            data,
            cell_size,
        })
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i * self.width * self.height + j * self.width + k
    }

    /// Overwrite every sample with `source` evaluated in parallel.
    pub fn evaluate<S: SdfSource + ?Sized>(&mut self, source: &S) {
        let (w, h) = (self.width, self.height);
        let min_bound = self.bounds.min;
        let cell = self.cell_size;

        self.data
            .par_iter_mut()
            .enumerate()
            .for_each(|(index, value)| {
                let k = index % w;
                let j = (index / w) % h;
                let i = index / (w * h);

                let pos = min_bound
                    + Vec3::new(
                        i as f32 * cell.x,
                        j as f32 * cell.y,
                        k as f32 * cell.z,
                    );

                *value = source.distance(&pos);
            });
    }

    /// Returns the sample at a grid coordinate.
    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> f32 {
        self.data[self.index(i, j, k)]
    }
}

impl Grid for VoxelGrid {
    fn dimensions(&self) -> (usize, usize, usize) {
        (self.width, self.height, self.depth)
    }

    fn get(&self, i: usize, j: usize, k: usize) -> f32 {
        self.get(i, j, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::types::Pt3;
    use approx::assert_relative_eq;

    fn lattice_point(grid: &VoxelGrid, i: usize, j: usize, k: usize) -> Pt3 {
        grid.bounds.min
            + Vec3::new(
                i as f32 * grid.cell_size.x,
                j as f32 * grid.cell_size.y,
                k as f32 * grid.cell_size.z,
            )
    }

    fn unit_bounds() -> AABB {
        AABB::new(Pt3::new(-1.0, -1.0, -1.0), Pt3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn rejects_degenerate_grids() {
        assert!(VoxelGrid::new(1, 4, 4, unit_bounds()).is_err());
        let flat = AABB::new(Pt3::new(0.0, 0.0, 0.0), Pt3::new(1.0, 0.0, 1.0));
        assert!(VoxelGrid::new(4, 4, 4, flat).is_err());
        assert!(VoxelGrid::new(usize::MAX, 2, 2, unit_bounds()).is_err());
    }

    #[test]
    fn addressing_is_depth_major() {
        let grid = VoxelGrid::new(4, 3, 2, unit_bounds()).unwrap();
        assert_eq!(grid.data.len(), 24);
        assert_eq!(grid.index(0, 0, 1), 1);
        assert_eq!(grid.index(0, 1, 0), 4);
        assert_eq!(grid.index(1, 0, 0), 12);
        assert_eq!(grid.index(1, 2, 3), 12 + 8 + 3);
    }

    #[test]
    fn cell_size_pairs_axes_with_dimensions() {
        let bounds = AABB::new(Pt3::new(0.0, 0.0, 0.0), Pt3::new(10.0, 6.0, 4.0));
        // width 8 (z), height 3 (y), depth 5 (x)
        let grid = VoxelGrid::new(8, 3, 5, bounds).unwrap();
        assert_relative_eq!(grid.cell_size.x, 2.0);
        assert_relative_eq!(grid.cell_size.y, 2.0);
        assert_relative_eq!(grid.cell_size.z, 0.5);
    }

    #[test]
    fn evaluate_samples_lattice_points() {
        let bounds = AABB::new(Pt3::new(-20.0, -20.0, -20.0), Pt3::new(20.0, 20.0, 20.0));
        let mut grid = VoxelGrid::new(10, 10, 10, bounds).unwrap();
        let source = |p: &Pt3| p.x * 100.0 + p.y * 10.0 + p.z;
        grid.evaluate(&source);

        for (i, j, k) in [(0, 0, 0), (3, 7, 1), (9, 9, 9), (5, 0, 2)] {
            let pos = lattice_point(&grid, i, j, k);
            assert_relative_eq!(grid.get(i, j, k), source(&pos), epsilon = 1e-2);
        }
        // First sample is the box minimum, not a half-cell in.
        assert_relative_eq!(grid.get(0, 0, 0), -2220.0, epsilon = 1e-3);
        assert_relative_eq!(lattice_point(&grid, 1, 0, 0).x, -16.0);
    }

    #[test]
    fn evaluate_overwrites_previous_pass() {
        let mut grid = VoxelGrid::new(4, 4, 4, unit_bounds()).unwrap();
        grid.evaluate(&|_: &Pt3| 7.0f32);
        grid.evaluate(&|p: &Pt3| p.x);
        assert!(grid.data.iter().all(|&v| v < 1.0));
    }
}
