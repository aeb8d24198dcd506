//! Offset-level isosurface extraction.
//!
//! A [`Scene`] holds a fixed set of dynamic and static shapes, each answering
//! signed distance queries. [`OffsetLevelCache::build`] samples every shape on
//! a dense grid at a handful of discrete offsets, runs marching cubes over
//! each volume and keeps every resulting triangle soup, so switching the
//! displayed offset is a lookup.
//!
//! Dynamic shapes are sampled through a [`FieldBlender`], which inflates a
//! shape by the active offset while keeping it out of its siblings and out
//! of the first static shape.

pub mod error;
pub mod mesh;
pub mod offset_cache;
pub mod settings;

pub use error::{IsoError, ObjectKind, Result};
pub use mesh::{FieldBlender, MeshData, Scene, SdfSource};
pub use offset_cache::OffsetLevelCache;
pub use settings::ExtractionSettings;
