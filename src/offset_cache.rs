// Offset-level extraction driver.
// Samples every object at every discrete offset, polygonizes each volume and
// keeps all results so the displayed level can be switched without work.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use crate::error::{IsoError, ObjectKind, Result};
use crate::mesh::blend::FieldBlender;
use crate::mesh::marching_cubes::polygonize;
use crate::mesh::obj::write_obj;
use crate::mesh::scene::Scene;
use crate::mesh::types::MeshData;
use crate::mesh::voxel_grid::VoxelGrid;
use crate::settings::ExtractionSettings;

/// Every extracted surface, keyed by (offset level, object).
///
/// Entries are stored level-major: dynamic slots first, then static slots,
/// both in slot order. The table is only handed out after every entry has
/// been written, and a new pass builds a new table.
#[derive(Debug, Clone)]
pub struct OffsetLevelCache {
    dynamic_count: usize,
    static_count: usize,
    offsets: Vec<f32>,
    entries: Vec<MeshData>,
    active_level: usize,
}

/// One unit of work: a single object at a single offset.
#[derive(Debug, Clone, Copy)]
struct Job {
    level: usize,
    offset: f32,
    kind: ObjectKind,
    slot: usize,
}

impl OffsetLevelCache {
    /// Run a full pass over `scene`.
    ///
    /// Fails before any sampling when the settings are invalid, a slot is
    /// empty, or the dynamic count has no blend policy.
    pub fn build(scene: &Scene, settings: &ExtractionSettings) -> Result<Self> {
        settings.validate()?;
        scene.ensure_loaded()?;

        let blender = if scene.dynamic_count() > 0 {
            Some(FieldBlender::new(scene, settings.falloff_width)?)
        } else {
            None
        };

        let offsets: Vec<f32> = (0..settings.offset_levels)
            .map(|level| settings.offset_for_level(level))
            .collect();

        let jobs: Vec<Job> = offsets
            .iter()
            .enumerate()
            .flat_map(|(level, &offset)| {
                scene.objects().map(move |(kind, slot)| Job {
                    level,
                    offset,
                    kind,
                    slot,
                })
            })
            .collect();

        if jobs.is_empty() {
            tracing::warn!("Scene has no objects, cache will be empty");
        }

        tracing::info!(
            "Building offset cache: {} levels x {} objects ({} dynamic, {} static), {}",
            offsets.len(),
            scene.object_count(),
            scene.dynamic_count(),
            scene.static_count(),
            if settings.parallel { "parallel" } else { "sequential" }
        );

        let start = Instant::now();
        let (w, h, d) = settings.dimensions();
        let bounds = settings.bounds();

        let entries = if settings.parallel {
            jobs.par_iter()
                .map(|job| {
                    let mut grid = VoxelGrid::new(w, h, d, bounds)?;
                    extract(&mut grid, scene, blender.as_ref(), job, settings.isolevel)
                })
                .collect::<Result<Vec<MeshData>>>()?
        } else {
            // One buffer, overwritten by every pass.
            let mut grid = VoxelGrid::new(w, h, d, bounds)?;
            jobs.iter()
                .map(|job| extract(&mut grid, scene, blender.as_ref(), job, settings.isolevel))
                .collect::<Result<Vec<MeshData>>>()?
        };

        let total: usize = entries.iter().map(MeshData::triangle_count).sum();
        tracing::info!(
            "Offset cache ready: {} entries, {} triangles in {:.2?}",
            entries.len(),
            total,
            start.elapsed()
        );

        Ok(Self {
            dynamic_count: scene.dynamic_count(),
            static_count: scene.static_count(),
            offsets,
            entries,
            active_level: 0,
        })
    }

    pub fn levels(&self) -> usize {
        self.offsets.len()
    }

    pub fn object_count(&self) -> usize {
        self.dynamic_count + self.static_count
    }

    pub fn dynamic_count(&self) -> usize {
        self.dynamic_count
    }

    pub fn static_count(&self) -> usize {
        self.static_count
    }

    /// Offset value a level was extracted at.
    pub fn offset(&self, level: usize) -> Option<f32> {
        self.offsets.get(level).copied()
    }

    fn check_level(&self, level: usize) -> Result<()> {
        if level < self.levels() {
            Ok(())
        } else {
            Err(IsoError::LevelOutOfRange {
                level,
                levels: self.levels(),
            })
        }
    }

    fn object_index(&self, kind: ObjectKind, slot: usize) -> Result<usize> {
        let (base, count) = match kind {
            ObjectKind::Dynamic => (0, self.dynamic_count),
            ObjectKind::Static => (self.dynamic_count, self.static_count),
        };
        if slot < count {
            Ok(base + slot)
        } else {
            Err(IsoError::SlotOutOfRange { kind, slot, count })
        }
    }

    pub fn entry(&self, level: usize, kind: ObjectKind, slot: usize) -> Result<&MeshData> {
        self.check_level(level)?;
        let object = self.object_index(kind, slot)?;
        Ok(&self.entries[level * self.object_count() + object])
    }

    /// All entries of one level, dynamic objects first.
    pub fn level(&self, level: usize) -> Result<&[MeshData]> {
        self.check_level(level)?;
        let n = self.object_count();
        Ok(&self.entries[level * n..(level + 1) * n])
    }

    /// Entries as `(level, kind, slot, mesh)` in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, ObjectKind, usize, &MeshData)> + '_ {
        let n = self.object_count();
        self.entries.iter().enumerate().map(move |(index, mesh)| {
            let level = index / n;
            let object = index % n;
            let (kind, slot) = if object < self.dynamic_count {
                (ObjectKind::Dynamic, object)
            } else {
                (ObjectKind::Static, object - self.dynamic_count)
            };
            (level, kind, slot, mesh)
        })
    }

    pub fn active_level(&self) -> usize {
        self.active_level
    }

    pub fn set_active_level(&mut self, level: usize) -> Result<()> {
        self.check_level(level)?;
        if level != self.active_level {
            tracing::debug!("Active offset level {} -> {}", self.active_level, level);
        }
        self.active_level = level;
        Ok(())
    }

    /// Surface of an object at the active level.
    pub fn active(&self, kind: ObjectKind, slot: usize) -> Result<&MeshData> {
        self.entry(self.active_level, kind, slot)
    }

    /// Level shown for a continuous slider value: `floor(value * levels_per_unit)`,
    /// clamped to the levels that exist.
    pub fn level_for_slider(&self, value: f32, levels_per_unit: f32) -> usize {
        let raw = (value * levels_per_unit).floor();
        if raw.is_nan() || raw <= 0.0 {
            return 0;
        }
        (raw as usize).min(self.levels().saturating_sub(1))
    }

    /// Write every entry as `<stem>_<dynN|staticN>_<level>.obj` under `dir`.
    pub fn export_obj(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        self.export(dir, stem, "obj", |path, mesh| write_obj(path, mesh))
    }

    /// Write every entry as packed binary (`MeshData::to_bytes`), named like
    /// [`export_obj`](Self::export_obj) with a `.bin` extension.
    pub fn export_binary(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        self.export(dir, stem, "bin", |path, mesh| {
            fs::write(path, mesh.to_bytes()?).map_err(|e| IsoError::io(path, e))
        })
    }

    fn export<F>(&self, dir: &Path, stem: &str, extension: &str, write: F) -> Result<Vec<PathBuf>>
    where
        F: Fn(&Path, &MeshData) -> Result<()>,
    {
        fs::create_dir_all(dir).map_err(|e| IsoError::io(dir, e))?;

        let mut written = Vec::with_capacity(self.entries.len());
        for (level, kind, slot, mesh) in self.iter() {
            let path = dir.join(entry_file_name(stem, level, kind, slot, extension));
            write(&path, mesh)?;
            tracing::debug!("Wrote {} triangles to {:?}", mesh.triangle_count(), path);
            written.push(path);
        }

        tracing::info!("Exported {} meshes to {:?}", written.len(), dir);
        Ok(written)
    }
}

fn entry_file_name(stem: &str, level: usize, kind: ObjectKind, slot: usize, extension: &str) -> String {
    let label = match kind {
        ObjectKind::Dynamic => "dyn",
        ObjectKind::Static => "static",
    };
    format!("{stem}_{label}{slot}_{level}.{extension}")
}

/// Sample one object into `grid` and polygonize it.
fn extract(
    grid: &mut VoxelGrid,
    scene: &Scene,
    blender: Option<&FieldBlender<'_>>,
    job: &Job,
    isolevel: f32,
) -> Result<MeshData> {
    let start = Instant::now();

    match job.kind {
        ObjectKind::Dynamic => {
            let blender = blender.ok_or(IsoError::UnsupportedObjectCount {
                dynamic: scene.dynamic_count(),
            })?;
            grid.evaluate(&blender.field(job.slot, job.offset)?);
        }
        // Static objects are never blended or offset.
        ObjectKind::Static => grid.evaluate(scene.source(ObjectKind::Static, job.slot)?),
    }
    let sampled = start.elapsed();

    let mesh = polygonize(&*grid, isolevel);

    tracing::info!(
        "Level {} (offset {}), {} object {}: {} triangles",
        job.level,
        job.offset,
        job.kind,
        job.slot,
        mesh.triangle_count()
    );
    tracing::debug!(
        "Sampled in {:.2?}, polygonized in {:.2?}",
        sampled,
        start.elapsed() - sampled
    );

    Ok(mesh)
}
