//! Voxfield: same FIESTA-style bucket-queue/dependent-list/patch-step
//! skeleton, but sourced from TSDF voxels instead of raw occupancy, with two
//! additions — a fixed truncation band that skips relaxation entirely, and a
//! post-pass sub-voxel correction using the seed's cached TSDF gradient.

use crate::config::EsdfConfig;
use crate::core::bucket_queue::BucketQueue;
use crate::core::dependent_list;
use crate::core::error::ConfigError;
use crate::core::index::GlobalIndex;
use crate::core::neighborhood;
use crate::core::prelude::Real;
use crate::core::range_tracker::RangeTracker;
use crate::core::voxel::{TsdfVoxel, UpdateFlags};

use super::common::{self, UpdateStats};
use super::{EsdfVolume, TsdfVolume};

pub struct VoxfieldEngine<const VPS: usize> {
    config: EsdfConfig,
    queue: BucketQueue<VPS>,
    range: RangeTracker,
    insert_list: Vec<GlobalIndex<VPS>>,
    delete_list: Vec<GlobalIndex<VPS>>,
    touched: Vec<GlobalIndex<VPS>>,
    stats: UpdateStats,
}

/// `is_occupied` per §4.8: within the truncation band scaled by
/// `occupancy_ratio`, and — when `finer_esdf_on` — backed by a usable
/// (non-degenerate) gradient, since the sub-voxel correction this variant
/// exists for cannot run without one.
fn is_occupied(tsdf: &TsdfVoxel, voxel_size: Real, config: &EsdfConfig) -> bool {
    let within_band = tsdf.distance.abs() < voxel_size * config.occupancy_ratio;
    within_band && (!config.finer_esdf_on || tsdf.gradient.norm() > 1e-6)
}

impl<const VPS: usize> VoxfieldEngine<VPS> {
    pub fn new(config: EsdfConfig) -> Result<Self, ConfigError> {
        crate::config::validate_voxels_per_side(VPS)?;
        config.validate()?;
        Ok(Self {
            queue: BucketQueue::new(config.num_buckets, config.default_distance_m),
            range: RangeTracker::new(config.range_boundary_offset),
            insert_list: Vec::new(),
            delete_list: Vec::new(),
            touched: Vec::new(),
            stats: UpdateStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &EsdfConfig {
        &self.config
    }

    pub fn set_max_distance(&mut self, d: Real) {
        self.config.max_distance_m = d;
    }

    pub fn get_max_distance(&self) -> Real {
        self.config.max_distance_m
    }

    pub fn load_insert_list(&mut self, list: Vec<GlobalIndex<VPS>>) {
        self.insert_list = list;
    }

    pub fn load_delete_list(&mut self, list: Vec<GlobalIndex<VPS>>) {
        self.delete_list = list;
    }

    pub fn assign_error(&self, esdf: &EsdfVolume<VPS>, idx: &GlobalIndex<VPS>, value: Real) {
        esdf.with_voxel_mut(idx, |v| v.error = value);
    }

    /// Scans `tsdf`'s updated blocks, classifies against each voxel's own
    /// cached `occupied` flag (not the ESDF seed state — §4.8 transition #3),
    /// and runs the update.
    pub fn update_from_layer(
        &mut self,
        tsdf: &mut TsdfVolume<VPS>,
        esdf: &mut EsdfVolume<VPS>,
        clear_updated_flag: bool,
    ) {
        self.insert_list.clear();
        self.delete_list.clear();

        let updated_blocks = tsdf.get_updated_blocks(UpdateFlags::TSDF_UPDATED);
        for block_idx in &updated_blocks {
            for lin in 0..VPS * VPS * VPS {
                let g = GlobalIndex::from_block_and_local_lin_index(block_idx, lin);
                let Some(tsdf_vox) = tsdf.voxel_at(&g) else {
                    continue;
                };
                if tsdf_vox.weight <= 0.0 {
                    continue; // never observed
                }

                esdf.with_voxel_mut_allocate(&g, |v| {
                    common::ensure_initialized(v, &g, tsdf_vox.distance < 0.0, self.config.default_distance_m)
                });

                let now_occupied = is_occupied(&tsdf_vox, tsdf.voxel_size(), &self.config);
                match (tsdf_vox.occupied, now_occupied) {
                    (false, true) => self.insert_list.push(g),
                    (true, false) => self.delete_list.push(g),
                    _ => {}
                }
                tsdf.with_voxel_mut(&g, |v| v.occupied = now_occupied);
            }
            if clear_updated_flag {
                tsdf.clear_updated(block_idx, UpdateFlags::TSDF_UPDATED);
            }
        }

        self.run(tsdf, esdf);
    }

    pub fn run(&mut self, tsdf: &TsdfVolume<VPS>, esdf: &mut EsdfVolume<VPS>) {
        self.run_with_deadline(tsdf, esdf, None);
    }

    /// Same as `run`, but checks `deadline` (if given) at the top of every
    /// pop in phase C; once it returns `true` the BFS stops early, leaving
    /// whatever remains in the bucket queue for the next tick. The sub-voxel
    /// correction pass only runs over voxels actually touched before the
    /// deadline hit.
    pub fn run_with_deadline(
        &mut self,
        tsdf: &TsdfVolume<VPS>,
        esdf: &mut EsdfVolume<VPS>,
        deadline: Option<&dyn Fn() -> bool>,
    ) {
        self.range.update_range(&self.insert_list, &self.delete_list);
        if self.range.is_empty() {
            return;
        }
        self.range.set_local_range(esdf);
        self.stats = UpdateStats::default();
        self.touched.clear();

        self.phase_fixed_band(tsdf, esdf);
        self.phase_a_seed(esdf);
        self.phase_b_raise(esdf);
        self.phase_c_lower(esdf, deadline);
        if self.config.finer_esdf_on {
            self.phase_sub_voxel_correction(tsdf, esdf);
        }

        self.insert_list.clear();
        self.delete_list.clear();
        self.stats.log(self.config.verbose, "voxfield");
    }

    /// Voxels within `band_distance_m` of the surface trust the TSDF directly
    /// and are excluded from relaxation (`fixed = true`). A voxel that moves
    /// back out of the band has its `fixed` flag cleared and its distance
    /// reset to the unseeded baseline (`coc_idx = UNDEF`, `distance =
    /// ±default_distance_m`) so it re-enters `phase_a_seed`/`phase_b_raise`
    /// normally instead of staying pinned to a stale band distance forever.
    fn phase_fixed_band(&mut self, tsdf: &TsdfVolume<VPS>, esdf: &mut EsdfVolume<VPS>) {
        if !self.config.fixed_band_esdf_on {
            return;
        }
        for g in self.insert_list.iter().chain(self.delete_list.iter()).copied().collect::<Vec<_>>() {
            let Some(tsdf_vox) = tsdf.voxel_at(&g) else {
                continue;
            };
            if tsdf_vox.distance.abs() < self.config.band_distance_m {
                esdf.with_voxel_mut(&g, |v| {
                    v.distance = tsdf_vox.distance;
                    v.raw_distance = tsdf_vox.distance;
                    v.fixed = true;
                });
            } else if esdf.voxel_at(&g).is_some_and(|v| v.fixed) {
                esdf.with_voxel_mut(&g, |v| {
                    v.fixed = false;
                    v.coc_idx = GlobalIndex::UNDEF;
                    v.distance = if v.behind {
                        -self.config.default_distance_m
                    } else {
                        self.config.default_distance_m
                    };
                    v.raw_distance = v.distance;
                });
            }
        }
    }

    fn phase_a_seed(&mut self, esdf: &mut EsdfVolume<VPS>) {
        let insert_list = self.insert_list.clone();
        for g in insert_list {
            let vox = esdf.voxel_at(&g).expect("seeded voxel must be allocated");
            if vox.fixed {
                continue; // fixed-band voxels never enter the BFS
            }
            let old_coc = vox.coc_idx;
            if !old_coc.is_undef() {
                dependent_list::delete(esdf, &old_coc, &g);
            }
            esdf.with_voxel_mut(&g, |v| {
                v.distance = 0.0;
                v.raw_distance = 0.0;
                v.coc_idx = g;
                v.newly = true;
                v.in_queue = true;
            });
            dependent_list::insert(esdf, &g, &g);
            self.queue.push(g, 0.0);
            self.stats.updated += 1;
        }
    }

    fn phase_b_raise(&mut self, esdf: &mut EsdfVolume<VPS>) {
        let delete_list = self.delete_list.clone();
        let raised_seeds: std::collections::HashSet<GlobalIndex<VPS>> =
            delete_list.iter().copied().collect();
        for g in delete_list {
            let members = dependent_list::members(esdf, &g);
            for t in members {
                // fixed-band voxels never join a dependent list (phase_a_seed
                // and phase_c_lower both skip them), so every member here is
                // a genuine relaxation dependent.
                dependent_list::delete(esdf, &g, &t);

                esdf.with_voxel_mut(&t, |v| {
                    v.coc_idx = GlobalIndex::UNDEF;
                    v.distance = if v.behind {
                        -self.config.default_distance_m
                    } else {
                        self.config.default_distance_m
                    };
                });

                let mut best: Option<(GlobalIndex<VPS>, Real)> = None;
                for n in neighborhood::neighbors(&t, self.config.connectivity) {
                    let Some(nv) = esdf.voxel_at(&n.index) else {
                        continue;
                    };
                    if nv.coc_idx.is_undef() || raised_seeds.contains(&nv.coc_idx) {
                        continue;
                    }
                    let d = t.dist(&nv.coc_idx, esdf.voxel_size()).min(self.config.max_distance_m);
                    if best.map_or(true, |(_, bd)| d < bd) {
                        best = Some((nv.coc_idx, d));
                        if self.config.early_break {
                            break;
                        }
                    }
                }

                if let Some((new_coc, d)) = best {
                    esdf.with_voxel_mut(&t, |v| {
                        v.coc_idx = new_coc;
                        v.distance = if v.behind { -d } else { d };
                        v.newly = self.config.early_break;
                        v.in_queue = true;
                    });
                    dependent_list::insert(esdf, &new_coc, &t);
                    self.queue.push(t, d);
                    self.stats.raised += 1;
                    self.touched.push(t);
                }
            }
        }
    }

    fn phase_c_lower(&mut self, esdf: &mut EsdfVolume<VPS>, deadline: Option<&dyn Fn() -> bool>) {
        while !deadline.is_some_and(|exceeded| exceeded()) {
            let Some(c) = self.queue.pop() else {
                break;
            };
            let Some(mut cv) = esdf.voxel_at(&c) else {
                continue;
            };
            if !cv.in_queue {
                continue;
            }
            esdf.with_voxel_mut(&c, |v| v.in_queue = false);

            if self.config.patch_on && cv.newly {
                esdf.with_voxel_mut(&c, |v| v.newly = false);

                if let Some((new_coc, d)) = self.best_patch_candidate(esdf, &c, cv.distance.abs()) {
                    if !cv.coc_idx.is_undef() {
                        dependent_list::delete(esdf, &cv.coc_idx, &c);
                    }
                    dependent_list::insert(esdf, &new_coc, &c);
                    esdf.with_voxel_mut(&c, |v| {
                        v.coc_idx = new_coc;
                        v.distance = if v.behind { -d } else { d };
                        v.raw_distance = v.distance;
                        v.newly = true;
                        v.in_queue = true;
                    });
                    self.queue.push(c, d);
                    self.stats.patched += 1;
                    self.touched.push(c);
                    continue;
                }
                cv = esdf.voxel_at(&c).expect("still allocated");
            }

            if cv.coc_idx.is_undef() {
                continue;
            }

            let candidates: Vec<_> = if self.config.use_directional_guide {
                neighborhood::directional_subset(&c, &cv.coc_idx, self.config.connectivity)
            } else {
                neighborhood::neighbors(&c, self.config.connectivity).collect()
            };

            for n in candidates {
                if !self.range.in_range(&n.index) {
                    continue;
                }
                let Some(nv) = esdf.voxel_at(&n.index) else {
                    continue;
                };
                if !nv.observed || nv.fixed || nv.distance == 0.0 {
                    continue;
                }
                let td = cv
                    .coc_idx
                    .dist(&n.index, esdf.voxel_size())
                    .min(self.config.max_distance_m);
                if td < nv.distance.abs() {
                    if !nv.coc_idx.is_undef() {
                        dependent_list::delete(esdf, &nv.coc_idx, &n.index);
                    }
                    dependent_list::insert(esdf, &cv.coc_idx, &n.index);
                    esdf.with_voxel_mut(&n.index, |v| {
                        v.coc_idx = cv.coc_idx;
                        v.distance = if v.behind { -td } else { td };
                        v.raw_distance = v.distance;
                        v.newly = true;
                        v.in_queue = true;
                    });
                    self.queue.push(n.index, td);
                    self.stats.lowered += 1;
                    self.touched.push(n.index);
                }
            }
        }
    }

    fn best_patch_candidate(
        &self,
        esdf: &EsdfVolume<VPS>,
        c: &GlobalIndex<VPS>,
        current_abs_distance: Real,
    ) -> Option<(GlobalIndex<VPS>, Real)> {
        let mut best: Option<(GlobalIndex<VPS>, Real)> = None;
        for n in neighborhood::neighbors(c, self.config.connectivity) {
            let Some(nv) = esdf.voxel_at(&n.index) else {
                continue;
            };
            if nv.coc_idx.is_undef() {
                continue;
            }
            let d = c.dist(&nv.coc_idx, esdf.voxel_size()).min(self.config.max_distance_m);
            if d < current_abs_distance && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((nv.coc_idx, d));
            }
        }
        best
    }

    /// §4.8 point 2: replace each touched, non-fixed voxel's center-to-center
    /// `raw_distance` with the distance to the coc's actual sub-voxel surface
    /// point, reconstructed from the coc's TSDF gradient. Falls back to
    /// `raw_distance` when the gradient is unusable.
    fn phase_sub_voxel_correction(&mut self, tsdf: &TsdfVolume<VPS>, esdf: &mut EsdfVolume<VPS>) {
        let voxel_size = esdf.voxel_size();
        for g in self.touched.drain(..).collect::<Vec<_>>() {
            let Some(v) = esdf.voxel_at(&g) else {
                continue;
            };
            if v.fixed || v.coc_idx.is_undef() {
                continue;
            }
            let Some(coc_tsdf) = tsdf.voxel_at(&v.coc_idx) else {
                continue;
            };
            let grad_norm = coc_tsdf.gradient.norm();
            if grad_norm < 1e-6 {
                continue; // no usable gradient: keep raw_distance
            }
            let unit_gradient = coc_tsdf.gradient / grad_norm;
            let coc_center = v.coc_idx.center(voxel_size);
            let surface_point = coc_center + unit_gradient * (self.config.gradient_sign * coc_tsdf.distance);
            let cur_center = g.center(voxel_size);
            let corrected = (cur_center - surface_point).norm().min(self.config.max_distance_m);

            esdf.with_voxel_mut(&g, |v| {
                v.distance = if v.behind { -corrected } else { corrected };
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::prelude::*;
    use crate::core::voxel::EsdfVoxel;
    use crate::core::volume::VoxelVolume;

    fn idx<const VPS: usize>(x: i64, y: i64, z: i64) -> GlobalIndex<VPS> {
        GlobalIndex(Point3::new(x, y, z))
    }

    fn new_engine() -> (
        VoxfieldEngine<8>,
        VoxelVolume<TsdfVoxel, 8>,
        VoxelVolume<EsdfVoxel<8>, 8>,
    ) {
        let engine = VoxfieldEngine::new(EsdfConfig::default()).unwrap();
        let tsdf: VoxelVolume<TsdfVoxel, 8> = VoxelVolume::new(1.0);
        let esdf: VoxelVolume<EsdfVoxel<8>, 8> = VoxelVolume::new(1.0);
        (engine, tsdf, esdf)
    }

    #[test]
    fn test_s1_single_obstacle_away_from_band() {
        let (mut engine, tsdf, mut esdf) = new_engine();
        let seed = idx(2, 2, 0);
        for x in -5..=7 {
            for y in -5..=7 {
                esdf.with_voxel_mut_allocate(&idx(x, y, 0), |v| v.observed = true);
            }
        }
        engine.load_insert_list(vec![seed]);
        engine.run(&tsdf, &mut esdf);

        let far = esdf.voxel_at(&idx(0, 0, 0)).unwrap();
        assert!((far.distance - 2.0 * std::f32::consts::SQRT_2).abs() < 1e-4);
        assert_eq!(far.coc_idx, seed);
    }

    /// S5: sub-voxel correction. Seed at (2,0,0) carries a TSDF distance of
    /// 0.3 and a gradient pointing back toward (0,0,0); the query voxel's
    /// center-to-center `raw_distance` (2.0) must be corrected to the
    /// distance to the reconstructed surface point (1.7).
    #[test]
    fn test_s5_sub_voxel_correction_matches_spec_value() {
        let (mut engine, mut tsdf, mut esdf) = new_engine();
        let seed = idx(2, 0, 0);
        for x in -5..=7 {
            for y in -5..=7 {
                esdf.with_voxel_mut_allocate(&idx(x, y, 0), |v| v.observed = true);
            }
        }
        tsdf.with_voxel_mut_allocate(&seed, |v| {
            v.distance = 0.3;
            v.gradient = Vector3::new(-1.0, 0.0, 0.0);
            v.weight = 1.0;
        });
        engine.load_insert_list(vec![seed]);
        engine.run(&tsdf, &mut esdf);

        let query = esdf.voxel_at(&idx(0, 0, 0)).unwrap();
        assert!(!query.fixed);
        assert_eq!(query.coc_idx, seed);
        assert!((query.raw_distance - 2.0).abs() < 1e-4);
        assert!((query.distance - 1.7).abs() < 1e-4);
    }

    /// S5: a voxel in the TSDF truncation band is fixed directly from the
    /// TSDF and skips relaxation.
    #[test]
    fn test_s5_fixed_band_bypasses_bfs() {
        let (mut engine, mut tsdf, mut esdf) = new_engine();
        let seed = idx(2, 2, 0);
        for x in -2..=6 {
            for y in -2..=6 {
                esdf.with_voxel_mut_allocate(&idx(x, y, 0), |v| v.observed = true);
            }
        }
        tsdf.with_voxel_mut_allocate(&seed, |v| {
            v.distance = 0.05;
            v.weight = 1.0;
        });
        engine.load_insert_list(vec![seed]);
        engine.run(&tsdf, &mut esdf);

        let v = esdf.voxel_at(&seed).unwrap();
        assert!(v.fixed);
        assert_eq!(v.distance, 0.05);
    }

    /// S6 (gradient fallback half): a zero gradient on the coc falls back to
    /// the plain center-to-center `raw_distance` rather than panicking or
    /// producing nonsense.
    #[test]
    fn test_s6_zero_gradient_falls_back_to_raw_distance() {
        let (mut engine, tsdf, mut esdf) = new_engine();
        let seed = idx(2, 2, 0);
        for x in -5..=7 {
            for y in -5..=7 {
                esdf.with_voxel_mut_allocate(&idx(x, y, 0), |v| v.observed = true);
            }
        }
        // `tsdf` at `seed` is never allocated, so `voxel_at` returns None and
        // the correction pass must leave `raw_distance` untouched.
        engine.load_insert_list(vec![seed]);
        engine.run(&tsdf, &mut esdf);

        let far = esdf.voxel_at(&idx(0, 0, 0)).unwrap();
        assert_eq!(far.distance, far.raw_distance);
    }

    #[test]
    fn test_idempotent_on_empty_lists() {
        let (mut engine, tsdf, mut esdf) = new_engine();
        engine.load_insert_list(vec![]);
        engine.load_delete_list(vec![]);
        engine.run(&tsdf, &mut esdf);
        assert_eq!(esdf.allocated_blocks_iter().count(), 0);
    }
}
