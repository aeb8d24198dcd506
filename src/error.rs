//! Error types for surface extraction.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, IsoError>;

/// Which slot array an object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Deformable shape that takes part in blending.
    Dynamic,
    /// Rigid shape, sampled directly.
    Static,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Dynamic => write!(f, "dynamic"),
            ObjectKind::Static => write!(f, "static"),
        }
    }
}

/// Errors that can occur while loading shapes or extracting surfaces.
#[derive(Debug, Error)]
pub enum IsoError {
    /// The blend policy only covers one to three dynamic objects.
    #[error("unsupported dynamic object count: {dynamic} (expected 1, 2 or 3)")]
    UnsupportedObjectCount {
        /// Configured dynamic object count.
        dynamic: usize,
    },

    /// Extraction was requested for a slot whose mesh never loaded.
    #[error("{kind} object {slot} is not loaded")]
    ObjectNotLoaded {
        /// Slot array.
        kind: ObjectKind,
        /// Zero-based slot index.
        slot: usize,
    },

    /// Slot index past the fixed object count.
    #[error("{kind} slot {slot} out of range (scene has {count})")]
    SlotOutOfRange {
        /// Slot array.
        kind: ObjectKind,
        /// Requested slot.
        slot: usize,
        /// Number of slots of that kind.
        count: usize,
    },

    /// Offset level past the number of levels the cache was built with.
    #[error("offset level {level} out of range (cache has {levels})")]
    LevelOutOfRange {
        /// Requested level.
        level: usize,
        /// Levels in the cache.
        levels: usize,
    },

    /// Mesh buffer too large for the u32 length header of the binary layout.
    #[error("mesh buffer of {bytes} bytes does not fit a u32 length header")]
    BufferTooLarge {
        /// Buffer size in bytes.
        bytes: usize,
    },

    /// Grid dimensions or bounds cannot be sampled.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// Settings failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Mesh file contained no triangles.
    #[error("mesh {path:?} has no triangles")]
    EmptyMesh {
        /// Source file.
        path: PathBuf,
    },

    /// OBJ content the loader could not parse.
    #[error("failed to parse OBJ {path:?}: {message}")]
    ObjParse {
        /// Source file.
        path: PathBuf,
        /// Loader message.
        message: String,
    },

    /// Filesystem failure.
    #[error("i/o error on {path:?}: {source}")]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Settings (de)serialization failure.
    #[error("settings json: {0}")]
    Json(#[from] serde_json::Error),
}

impl IsoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IsoError::Io {
            path: path.into(),
            source,
        }
    }
}
