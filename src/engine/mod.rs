pub mod common;
pub mod edt;
pub mod fiesta;
pub mod voxfield;

use crate::core::voxel::{EsdfVoxel, OccupancyVoxel, TsdfVoxel};
use crate::core::volume::VoxelVolume;

pub type OccupancyVolume<const VPS: usize> = VoxelVolume<OccupancyVoxel, VPS>;
pub type TsdfVolume<const VPS: usize> = VoxelVolume<TsdfVoxel, VPS>;
pub type EsdfVolume<const VPS: usize> = VoxelVolume<EsdfVoxel<VPS>, VPS>;

pub use edt::EdtEngine;
pub use fiesta::FiestaEngine;
pub use voxfield::VoxfieldEngine;
