use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IsoError, ObjectKind, Result};
use crate::mesh::blend::DEFAULT_FALLOFF_WIDTH;
use crate::mesh::marching_cubes::denormalize_position;
use crate::mesh::scene::Scene;
use crate::mesh::types::{Pt3, Vec3, AABB};

/// Everything an extraction pass needs, fixed before the pass starts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Samples per axis as `[width, height, depth]`.
    pub resolution: [usize; 3],
    pub bbox_min: [f32; 3],
    pub bbox_max: [f32; 3],
    pub isolevel: f32,
    /// Number of discrete offsets, `0..offset_levels`.
    pub offset_levels: usize,
    /// Offset value between consecutive levels.
    pub offset_step: f32,
    pub falloff_width: f32,
    /// Extract (level, object) pairs concurrently.
    pub parallel: bool,
    /// OBJ files for dynamic slots, in slot order.
    pub dynamic_meshes: Vec<PathBuf>,
    /// OBJ files for static slots, in slot order.
    pub static_meshes: Vec<PathBuf>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            resolution: [100, 100, 100],
            bbox_min: [-20.0, -20.0, -20.0],
            bbox_max: [20.0, 20.0, 20.0],
            isolevel: 0.0,
            offset_levels: 2,
            offset_step: 1.0,
            falloff_width: DEFAULT_FALLOFF_WIDTH,
            parallel: true,
            dynamic_meshes: Vec::new(),
            static_meshes: Vec::new(),
        }
    }
}

impl ExtractionSettings {
    /// Read settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| IsoError::io(path, e))?;
        let settings: ExtractionSettings = serde_json::from_str(&content)?;
        tracing::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| IsoError::io(path, e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let [w, h, d] = self.resolution;
        if w < 2 || h < 2 || d < 2 {
            return Err(IsoError::InvalidSettings(format!(
                "resolution must be at least 2 per axis, got {w}x{h}x{d}"
            )));
        }
        if !self.bounds().is_valid() {
            return Err(IsoError::InvalidSettings(format!(
                "bounding box {:?}..{:?} is empty or inverted",
                self.bbox_min, self.bbox_max
            )));
        }
        if self.offset_levels == 0 {
            return Err(IsoError::InvalidSettings(
                "offset_levels must be at least 1".to_string(),
            ));
        }
        if !self.offset_step.is_finite() {
            return Err(IsoError::InvalidSettings(format!(
                "offset_step must be finite, got {}",
                self.offset_step
            )));
        }
        if !(self.falloff_width > 0.0 && self.falloff_width.is_finite()) {
            return Err(IsoError::InvalidSettings(format!(
                "falloff_width must be positive, got {}",
                self.falloff_width
            )));
        }
        if self.dynamic_meshes.len() > 3 {
            return Err(IsoError::UnsupportedObjectCount {
                dynamic: self.dynamic_meshes.len(),
            });
        }
        Ok(())
    }

    pub fn dimensions(&self) -> (usize, usize, usize) {
        let [w, h, d] = self.resolution;
        (w, h, d)
    }

    pub fn bounds(&self) -> AABB {
        AABB::new(Pt3::from(self.bbox_min), Pt3::from(self.bbox_max))
    }

    /// World size of one cell along x, y, z (x against depth, z against width).
    pub fn cell_size(&self) -> Vec3 {
        let extent = self.bounds().extent();
        let [w, h, d] = self.resolution;
        Vec3::new(extent.x / d as f32, extent.y / h as f32, extent.z / w as f32)
    }

    pub fn offset_for_level(&self, level: usize) -> f32 {
        level as f32 * self.offset_step
    }

    /// Map an extracted vertex from normalized space back into world space.
    pub fn normalized_to_world(&self, v: [f32; 3]) -> Pt3 {
        let [w, h, d] = self.resolution;
        let index = denormalize_position(v, w, h, d);
        Pt3::from(self.bbox_min) + index.coords.component_mul(&self.cell_size())
    }

    /// Build a scene sized by the mesh lists and load every file into its
    /// slot. Load failures are logged and leave the slot empty.
    pub fn build_scene(&self) -> Scene {
        let mut scene = Scene::new(self.dynamic_meshes.len(), self.static_meshes.len());
        let lists = [
            (ObjectKind::Dynamic, &self.dynamic_meshes),
            (ObjectKind::Static, &self.static_meshes),
        ];

        let mut failed = 0;
        for (kind, paths) in lists {
            for (slot, path) in paths.iter().enumerate() {
                if scene.load_object(kind, slot, path).is_err() {
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            tracing::warn!(
                "{} of {} meshes failed to load",
                failed,
                scene.object_count()
            );
        }
        scene
    }
}
