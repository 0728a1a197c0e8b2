//! Shared helpers used by all three `EsdfEngine` variants. Free functions,
//! not a trait hierarchy: FIESTA, EDT and Voxfield each own their
//! `update_esdf` loop and call into these for the bits that are identical.

use crate::core::index::GlobalIndex;
use crate::core::prelude::Real;
use crate::core::voxel::EsdfVoxel;

/// A voxel's occupancy classification changed since the last tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Became occupied: feeds the insert list.
    Insert,
    /// Became free: feeds the delete list.
    Delete,
}

/// Diffs `currently_occupied` against whether the ESDF voxel is *already* its
/// own seed (`coc_idx == self_idx`). For FIESTA/EDT this is the only signal
/// available — `OccupancyVoxel` carries no separate "last tick" cache — so a
/// voxel transitions to `Insert` exactly when it's newly occupied and not yet
/// a seed, and to `Delete` when it's newly free but still recorded as one.
pub fn classify_against_seed_state<const VPS: usize>(
    currently_occupied: bool,
    esdf_vox: &EsdfVoxel<VPS>,
    g: &GlobalIndex<VPS>,
) -> Option<Transition> {
    let is_seed = !esdf_vox.coc_idx.is_undef() && esdf_vox.coc_idx == *g;
    match (currently_occupied, is_seed) {
        (true, false) => Some(Transition::Insert),
        (false, true) => Some(Transition::Delete),
        _ => None,
    }
}

/// First-time initialization of an `EsdfVoxel`: identity, no coc, sentinel
/// distance. A no-op on every call after the first (guarded by `self_idx`).
pub fn ensure_initialized<const VPS: usize>(
    v: &mut EsdfVoxel<VPS>,
    g: &GlobalIndex<VPS>,
    behind: bool,
    default_distance_m: Real,
) {
    if v.self_idx.is_undef() {
        v.self_idx = *g;
        v.coc_idx = GlobalIndex::UNDEF;
        v.behind = behind;
        v.distance = if behind {
            -default_distance_m
        } else {
            default_distance_m
        };
        v.observed = true;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UpdateStats {
    pub updated: usize,
    pub patched: usize,
    pub raised: usize,
    pub lowered: usize,
}

impl UpdateStats {
    /// Mirrors the source's `config_.verbose`-gated `LOG(INFO)` lines: silent
    /// unless verbose is on, and purely observational even then.
    pub fn log(&self, verbose: bool, variant: &str) {
        if verbose {
            log::info!(
                "{variant} esdf update: updated={} patched={} raised={} lowered={}",
                self.updated,
                self.patched,
                self.raised,
                self.lowered
            );
        }
        log::debug!(
            "{variant} esdf update: updated={} patched={} raised={} lowered={}",
            self.updated,
            self.patched,
            self.raised,
            self.lowered
        );
    }
}
