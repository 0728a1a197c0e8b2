//! Incremental Euclidean signed distance field engine over a sparse,
//! block-hashed voxel volume. Three interchangeable algorithmic variants
//! (FIESTA, EDT, Voxfield) share the volume/neighborhood/bucket-queue
//! skeleton in [`core`] and differ only in their `EsdfEngine` update loop,
//! each in [`engine`].

pub mod config;
pub mod core;
pub mod engine;

pub use config::{validate_voxels_per_side, EsdfConfig};
pub use core::error::ConfigError;
pub use core::index::{BlockIndex, GlobalIndex, VoxelIndex};
pub use core::neighborhood::Connectivity;
pub use core::voxel::{EsdfVoxel, OccupancyVoxel, TsdfVoxel, UpdateFlags};
pub use core::volume::VoxelVolume;
pub use engine::{EdtEngine, EsdfVolume, FiestaEngine, OccupancyVolume, TsdfVolume, VoxfieldEngine};
