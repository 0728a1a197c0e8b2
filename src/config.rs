//! Tuning knobs shared by every `EsdfEngine` variant. Construction always
//! goes through `validate`; nothing downstream re-checks these invariants.

use crate::core::error::ConfigError;
use crate::core::neighborhood::Connectivity;
use crate::core::prelude::Real;

impl TryFrom<u8> for Connectivity {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            6 => Ok(Connectivity::Six),
            18 => Ok(Connectivity::Eighteen),
            24 => Ok(Connectivity::TwentyFour),
            26 => Ok(Connectivity::TwentySix),
            other => Err(ConfigError::InvalidNumNeighbor(other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EsdfConfig {
    pub max_distance_m: Real,
    pub default_distance_m: Real,
    pub max_behind_surface_m: Real,
    pub num_buckets: usize,
    pub connectivity: Connectivity,
    pub patch_on: bool,
    pub early_break: bool,
    pub finer_esdf_on: bool,
    pub fixed_band_esdf_on: bool,
    pub band_distance_m: Real,
    pub gradient_sign: Real,
    pub range_boundary_offset: (i64, i64, i64),
    pub verbose: bool,
    /// Restrict BFS propagate expansion to the directional-guide subset
    /// (§4.2). Always correctness-preserving; disable only to A/B it against
    /// the full neighborhood in tests.
    pub use_directional_guide: bool,
    /// Voxfield occupancy test: a TSDF voxel counts as a surface voxel when
    /// `|distance| < voxel_size * occupancy_ratio`.
    pub occupancy_ratio: Real,
}

impl Default for EsdfConfig {
    fn default() -> Self {
        Self {
            max_distance_m: 10.0,
            default_distance_m: 10.0,
            max_behind_surface_m: 1.0,
            num_buckets: 20,
            connectivity: Connectivity::TwentyFour,
            patch_on: true,
            early_break: true,
            finer_esdf_on: true,
            fixed_band_esdf_on: true,
            band_distance_m: 0.2,
            gradient_sign: 1.0,
            range_boundary_offset: (10, 10, 5),
            verbose: false,
            use_directional_guide: true,
            occupancy_ratio: 1.0,
        }
    }
}

impl EsdfConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_buckets < 2 {
            return Err(ConfigError::TooFewBuckets(self.num_buckets));
        }
        if self.max_distance_m > self.default_distance_m {
            return Err(ConfigError::MaxExceedsDefault {
                max: self.max_distance_m,
                default: self.default_distance_m,
            });
        }
        if self.max_behind_surface_m < 0.0 {
            return Err(ConfigError::NegativeMaxBehindSurface(
                self.max_behind_surface_m,
            ));
        }
        Ok(())
    }
}

/// Runtime companion to the const-generic `VPS` check: every engine
/// constructor calls this with `VPS` so a bad compile-time value still fails
/// loudly instead of silently misbehaving, and a dynamically configured
/// `VPS` (e.g. loaded from a deserialized map header) can be checked too.
pub fn validate_voxels_per_side(voxels_per_side: usize) -> Result<(), ConfigError> {
    if voxels_per_side == 0 || !voxels_per_side.is_power_of_two() {
        return Err(ConfigError::VoxelsPerSideNotPowerOfTwo(voxels_per_side));
    }
    Ok(())
}
