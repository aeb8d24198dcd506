pub mod blend;
pub mod grid_trait;
pub mod marching_cubes;
pub mod obj;
pub mod scene;
pub mod sdf;
pub mod tables;
pub mod types;
pub mod voxel_grid;

// Re-export commonly used items
pub use blend::{BlendPolicy, BlendedField, FieldBlender};
pub use grid_trait::Grid;
pub use marching_cubes::{marching_triangles, polygonize, vertex_interp};
pub use scene::Scene;
pub use sdf::{MeshSdf, SdfSource, SphereSdf};
pub use types::{MeshData, Pt3, Vec3, VertexRecord, AABB};
pub use voxel_grid::VoxelGrid;
