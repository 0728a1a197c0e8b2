use std::fmt::Debug;

use bitflags::bitflags;

use super::index::GlobalIndex;
use super::prelude::*;

pub trait Voxel: Default + Clone + Copy + Debug {}

bitflags! {
    /// Per-block "something changed" bits, one per voxel kind sharing the volume.
    /// A producer sets its bit after writing a block; a consumer clears it once it
    /// has re-derived whatever it caches from that block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UpdateFlags: u8 {
        const TSDF_UPDATED = 1 << 0;
        const ESDF_UPDATED = 1 << 1;
        const MESH_UPDATED = 1 << 2;
    }
}

/// Occupancy Voxel. Source-of-truth for the insert/delete list classification
/// consumed by the FIESTA and EDT integrators.
#[derive(Debug, Default, Clone, Copy)]
pub struct OccupancyVoxel {
    pub observed: bool,
    pub occupied: bool,
    pub behind: bool,
    pub probability: Real,
}

impl Voxel for OccupancyVoxel {}

/// Tsdf Voxel. Source-of-truth for the Voxfield integrator; `occupied` caches the
/// last classification so updates can be diffed into insert/delete transitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct TsdfVoxel {
    pub distance: Real,
    pub weight: Real,
    pub gradient: Vector3<Real>,
    pub occupied: bool,
}

impl Voxel for TsdfVoxel {}

/// Esdf Voxel. Holds the relaxed distance field plus all bookkeeping the
/// bucket-queue integrators need: the closest-obstacle-cell (coc) back-pointer,
/// the raise/lower state machine fields, and the intrusive dependent-list
/// links (`prev_idx`/`next_idx`/`head_idx`) that let a COC track every voxel
/// currently depending on it without a secondary collection.
#[derive(Debug, Clone, Copy)]
pub struct EsdfVoxel<const VPS: usize> {
    pub observed: bool,
    /// This voxel's own global index. Set once, on first observation.
    pub self_idx: GlobalIndex<VPS>,
    /// The occupied voxel this voxel's distance is relaxed from, or `UNDEF`.
    pub coc_idx: GlobalIndex<VPS>,
    pub distance: Real,
    /// Distance before sub-voxel gradient correction (Voxfield only; equal to
    /// `distance` for FIESTA/EDT).
    pub raw_distance: Real,
    /// True if this voxel lies behind a surface (negative side of the field).
    pub behind: bool,
    /// True once a sub-voxel-corrected distance is locked in from the TSDF
    /// fixed band and should not be relaxed further (Voxfield only).
    pub fixed: bool,
    /// EDT raise/lower state machine: `< 0.0` means "lowering", `>= 0.0` is the
    /// priority at which this voxel was pushed while searching for a
    /// replacement coc after its old one was deleted.
    pub raise: Real,
    pub in_queue: bool,
    /// True for one tick after this voxel was (re)seeded, enabling the patch
    /// step to re-examine it before it propagates to neighbors.
    pub newly: bool,
    pub prev_idx: GlobalIndex<VPS>,
    pub next_idx: GlobalIndex<VPS>,
    /// Head of the dependent list rooted at this voxel when it is itself a coc.
    pub head_idx: GlobalIndex<VPS>,
    /// Free-form diagnostic value, set only via `assign_error`. Never read by
    /// any integrator; purely a hook for callers instrumenting their own runs.
    pub error: Real,
}

impl<const VPS: usize> Default for EsdfVoxel<VPS> {
    fn default() -> Self {
        Self {
            observed: false,
            self_idx: GlobalIndex::UNDEF,
            coc_idx: GlobalIndex::UNDEF,
            distance: 0.0,
            raw_distance: 0.0,
            behind: false,
            fixed: false,
            raise: -1.0,
            in_queue: false,
            newly: false,
            prev_idx: GlobalIndex::UNDEF,
            next_idx: GlobalIndex::UNDEF,
            head_idx: GlobalIndex::UNDEF,
            error: 0.0,
        }
    }
}

impl<const VPS: usize> Voxel for EsdfVoxel<VPS> {}
