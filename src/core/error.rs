use thiserror::Error;

/// Rejected at construction time; see `EsdfConfig::validate`.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("num_buckets must be >= 2, got {0}")]
    TooFewBuckets(usize),

    #[error("max_distance_m ({max}) must be <= default_distance_m ({default})")]
    MaxExceedsDefault { max: f32, default: f32 },

    #[error("max_behind_surface_m must be >= 0.0, got {0}")]
    NegativeMaxBehindSurface(f32),

    #[error("num_neighbor must be one of 6, 18, 24, 26, got {0}")]
    InvalidNumNeighbor(u8),

    #[error("voxels_per_side must be a power of two, got {0}")]
    VoxelsPerSideNotPowerOfTwo(usize),
}
