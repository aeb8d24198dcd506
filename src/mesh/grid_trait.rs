// Trait for abstracting over sampled volumes.
// The polygonizer only needs dimensions and corner lookups, so tests can
// feed it hand-built volumes without going through an SDF.

/// Common interface for dense scalar volumes.
/// Must be Sync for parallel polygonization.
pub trait Grid: Sync {
    /// Sample counts as `(width, height, depth)`.
    fn dimensions(&self) -> (usize, usize, usize);

    /// Sample at depth index `i`, height index `j`, width index `k`.
    fn get(&self, i: usize, j: usize, k: usize) -> f32;
}
