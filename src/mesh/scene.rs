use std::path::Path;
use std::sync::Arc;

use crate::error::{IsoError, ObjectKind, Result};
use crate::mesh::sdf::{MeshSdf, SdfSource};
use crate::mesh::types::Pt3;

type Slot = Option<Arc<dyn SdfSource>>;

/// Fixed set of dynamic and static shapes.
///
/// Slot counts are set at construction and never change. A slot stays empty
/// until a source is loaded into it; extraction refuses to run over empty
/// slots.
#[derive(Clone)]
pub struct Scene {
    dynamic: Vec<Slot>,
    statics: Vec<Slot>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("dynamic", &self.loaded_mask(ObjectKind::Dynamic))
            .field("static", &self.loaded_mask(ObjectKind::Static))
            .finish()
    }
}

impl Scene {
    pub fn new(dynamic_count: usize, static_count: usize) -> Self {
        Self {
            dynamic: vec![None; dynamic_count],
            statics: vec![None; static_count],
        }
    }

    pub fn dynamic_count(&self) -> usize {
        self.dynamic.len()
    }

    pub fn static_count(&self) -> usize {
        self.statics.len()
    }

    pub fn object_count(&self) -> usize {
        self.dynamic.len() + self.statics.len()
    }

    fn slots(&self, kind: ObjectKind) -> &[Slot] {
        match kind {
            ObjectKind::Dynamic => &self.dynamic,
            ObjectKind::Static => &self.statics,
        }
    }

    fn slot_mut(&mut self, kind: ObjectKind, slot: usize) -> Result<&mut Slot> {
        let slots = match kind {
            ObjectKind::Dynamic => &mut self.dynamic,
            ObjectKind::Static => &mut self.statics,
        };
        let count = slots.len();
        slots
            .get_mut(slot)
            .ok_or(IsoError::SlotOutOfRange { kind, slot, count })
    }

    /// Install a source into a slot, replacing whatever was there.
    pub fn set_object(
        &mut self,
        kind: ObjectKind,
        slot: usize,
        source: impl SdfSource + 'static,
    ) -> Result<()> {
        *self.slot_mut(kind, slot)? = Some(Arc::new(source));
        Ok(())
    }

    /// Load an OBJ mesh into a slot.
    ///
    /// A failed load is reported and leaves the slot empty; the error is
    /// returned so the caller can decide whether to carry on.
    pub fn load_object(&mut self, kind: ObjectKind, slot: usize, path: &Path) -> Result<()> {
        let target = self.slot_mut(kind, slot)?;
        match MeshSdf::load_from_file(path) {
            Ok(sdf) => {
                tracing::info!(
                    "Loaded {} object {} from {:?} ({} triangles)",
                    kind,
                    slot,
                    path,
                    sdf.triangle_count()
                );
                *target = Some(Arc::new(sdf));
                Ok(())
            }
            Err(err) => {
                tracing::warn!("{:?} NOT FOUND or unreadable: {}", path, err);
                *target = None;
                Err(err)
            }
        }
    }

    pub fn is_loaded(&self, kind: ObjectKind, slot: usize) -> bool {
        matches!(self.slots(kind).get(slot), Some(Some(_)))
    }

    fn loaded_mask(&self, kind: ObjectKind) -> Vec<bool> {
        self.slots(kind).iter().map(Option::is_some).collect()
    }

    /// Borrow a loaded source.
    pub fn source(&self, kind: ObjectKind, slot: usize) -> Result<&dyn SdfSource> {
        let slots = self.slots(kind);
        match slots.get(slot) {
            Some(Some(source)) => Ok(source.as_ref()),
            Some(None) => Err(IsoError::ObjectNotLoaded { kind, slot }),
            None => Err(IsoError::SlotOutOfRange {
                kind,
                slot,
                count: slots.len(),
            }),
        }
    }

    /// Every slot must be loaded before extraction starts.
    pub fn ensure_loaded(&self) -> Result<()> {
        for kind in [ObjectKind::Dynamic, ObjectKind::Static] {
            for slot in 0..self.slots(kind).len() {
                self.source(kind, slot)?;
            }
        }
        Ok(())
    }

    /// Distance to a single object, no blending.
    pub fn distance(&self, kind: ObjectKind, slot: usize, point: &Pt3) -> Result<f32> {
        Ok(self.source(kind, slot)?.distance(point))
    }

    /// `(kind, slot)` for every object, dynamic slots first.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectKind, usize)> + '_ {
        (0..self.dynamic.len())
            .map(|slot| (ObjectKind::Dynamic, slot))
            .chain((0..self.statics.len()).map(|slot| (ObjectKind::Static, slot)))
    }
}
