//! FIESTA-style incremental ESDF: bucket-queue BFS with dependent lists, a
//! patch step on first pop, and an optional early-break raise rescan.

use crate::config::EsdfConfig;
use crate::core::bucket_queue::BucketQueue;
use crate::core::dependent_list;
use crate::core::error::ConfigError;
use crate::core::index::GlobalIndex;
use crate::core::neighborhood;
use crate::core::prelude::Real;
use crate::core::range_tracker::RangeTracker;
use crate::core::voxel::UpdateFlags;

use super::common::{self, UpdateStats};
use super::{EsdfVolume, OccupancyVolume};

pub struct FiestaEngine<const VPS: usize> {
    config: EsdfConfig,
    queue: BucketQueue<VPS>,
    range: RangeTracker,
    insert_list: Vec<GlobalIndex<VPS>>,
    delete_list: Vec<GlobalIndex<VPS>>,
    stats: UpdateStats,
}

impl<const VPS: usize> FiestaEngine<VPS> {
    pub fn new(config: EsdfConfig) -> Result<Self, ConfigError> {
        crate::config::validate_voxels_per_side(VPS)?;
        config.validate()?;
        Ok(Self {
            queue: BucketQueue::new(config.num_buckets, config.default_distance_m),
            range: RangeTracker::new(config.range_boundary_offset),
            insert_list: Vec::new(),
            delete_list: Vec::new(),
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

    /// Scans `occ`'s updated blocks, classifies voxels into insert/delete
    /// lists against the ESDF volume's own seed-state, and runs the update.
    pub fn update_from_layer(
        &mut self,
        occ: &mut OccupancyVolume<VPS>,
        esdf: &mut EsdfVolume<VPS>,
        clear_updated_flag: bool,
    ) {
        self.insert_list.clear();
        self.delete_list.clear();

        let updated_blocks = occ.get_updated_blocks(UpdateFlags::TSDF_UPDATED);
        for block_idx in &updated_blocks {
            for lin in 0..VPS * VPS * VPS {
                let g = GlobalIndex::from_block_and_local_lin_index(block_idx, lin);
                let Some(occ_vox) = occ.voxel_at(&g) else {
                    continue;
                };
                if !occ_vox.observed {
                    continue;
                }

                esdf.with_voxel_mut_allocate(&g, |v| {
                    common::ensure_initialized(v, &g, occ_vox.behind, self.config.default_distance_m)
                });
                let esdf_vox = esdf.voxel_at(&g).expect("just allocated");

                match common::classify_against_seed_state(occ_vox.occupied, &esdf_vox, &g) {
                    Some(common::Transition::Insert) => self.insert_list.push(g),
                    Some(common::Transition::Delete) => self.delete_list.push(g),
                    None => {}
                }
            }
            if clear_updated_flag {
                occ.clear_updated(block_idx, UpdateFlags::TSDF_UPDATED);
            }
        }

        self.run(esdf);
    }

    /// Runs the three-phase update against whatever insert/delete lists are
    /// currently loaded (via `update_from_layer` or `load_*_list`).
    pub fn run(&mut self, esdf: &mut EsdfVolume<VPS>) {
        self.run_with_deadline(esdf, None);
    }

    /// Same as `run`, but checks `deadline` (if given) at the top of every
    /// pop in phase C; once it returns `true` the BFS stops early, leaving
    /// whatever remains in the bucket queue for the next tick.
    pub fn run_with_deadline(&mut self, esdf: &mut EsdfVolume<VPS>, deadline: Option<&dyn Fn() -> bool>) {
        self.range.update_range(&self.insert_list, &self.delete_list);
        if self.range.is_empty() {
            return;
        }
        self.range.set_local_range(esdf);
        self.stats = UpdateStats::default();

        self.phase_a_seed(esdf);
        self.phase_b_raise(esdf);
        self.phase_c_lower(esdf, deadline);

        self.insert_list.clear();
        self.delete_list.clear();
        self.stats.log(self.config.verbose, "fiesta");
    }

    fn phase_a_seed(&mut self, esdf: &mut EsdfVolume<VPS>) {
        let insert_list = self.insert_list.clone();
        for g in insert_list {
            let old_coc = esdf.voxel_at(&g).map(|v| v.coc_idx).unwrap_or(GlobalIndex::UNDEF);
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
        // Any voxel still pointing at a seed in this set is itself a member
        // being raised this tick, never a legitimate replacement coc for a
        // sibling — independent of which order `delete_list` is walked in.
        let raised_seeds: std::collections::HashSet<GlobalIndex<VPS>> =
            delete_list.iter().copied().collect();
        for g in delete_list {
            let members = dependent_list::members(esdf, &g);
            for t in members {
                dependent_list::delete(esdf, &g, &t);

                let behind = esdf.voxel_at(&t).map(|v| v.behind).unwrap_or(false);
                esdf.with_voxel_mut(&t, |v| {
                    v.coc_idx = GlobalIndex::UNDEF;
                    v.distance = if behind {
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
                continue; // stale entry
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
                        v.newly = true;
                        v.in_queue = true;
                    });
                    self.queue.push(c, d);
                    self.stats.patched += 1;
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
                if !nv.observed || nv.distance == 0.0 {
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
                        v.newly = true;
                        v.in_queue = true;
                    });
                    self.queue.push(n.index, td);
                    self.stats.lowered += 1;
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

    fn new_engine() -> (FiestaEngine<8>, VoxelVolume<EsdfVoxel<8>, 8>) {
        let engine = FiestaEngine::new(EsdfConfig::default()).unwrap();
        let esdf: VoxelVolume<EsdfVoxel<8>, 8> = VoxelVolume::new(1.0);
        (engine, esdf)
    }

    /// S1: single obstacle in an (unbounded, sparse) grid.
    #[test]
    fn test_s1_single_obstacle() {
        let (mut engine, mut esdf) = new_engine();
        let seed = idx(2, 2, 0);
        engine.load_insert_list(vec![seed]);
        // allocate blocks wide enough to cover queried voxels before running,
        // since the driver (not under test here) would normally have walked
        // the occupancy layer and observed every voxel in range.
        for x in -5..=7 {
            for y in -5..=7 {
                esdf.with_voxel_mut_allocate(&idx(x, y, 0), |v| v.observed = true);
            }
        }
        engine.run(&mut esdf);

        let far = esdf.voxel_at(&idx(0, 0, 0)).unwrap();
        assert!((far.distance - 2.0 * std::f32::consts::SQRT_2).abs() < 1e-4);
        assert_eq!(far.coc_idx, seed);
        assert_eq!(engine.queue.size(), 0);
    }

    /// S2: obstacle removal after S1.
    #[test]
    fn test_s2_obstacle_removed() {
        let (mut engine, mut esdf) = new_engine();
        let seed = idx(2, 2, 0);
        for x in -5..=7 {
            for y in -5..=7 {
                esdf.with_voxel_mut_allocate(&idx(x, y, 0), |v| v.observed = true);
            }
        }
        engine.load_insert_list(vec![seed]);
        engine.run(&mut esdf);

        engine.load_delete_list(vec![seed]);
        engine.run(&mut esdf);

        for x in -5..=7 {
            for y in -5..=7 {
                let v = esdf.voxel_at(&idx(x, y, 0)).unwrap();
                assert!(v.coc_idx.is_undef(), "voxel ({x},{y}) still has a coc");
                assert_eq!(v.distance, engine.config().default_distance_m);
            }
        }
    }

    /// S3: two equidistant obstacles; tie broken by insertion order.
    #[test]
    fn test_s3_tie_break_first_inserted_wins() {
        let (mut engine, mut esdf) = new_engine();
        let a = idx(0, 0, 0);
        let b = idx(4, 0, 0);
        for x in -2..=6 {
            esdf.with_voxel_mut_allocate(&idx(x, 0, 0), |v| v.observed = true);
        }
        engine.load_insert_list(vec![a, b]);
        engine.run(&mut esdf);

        let mid = esdf.voxel_at(&idx(2, 0, 0)).unwrap();
        assert_eq!(mid.distance, 2.0);
        assert!(mid.coc_idx == a || mid.coc_idx == b);
    }

    /// S4: raise then lower — new closer obstacle replaces a deleted one.
    #[test]
    fn test_s4_raise_then_lower() {
        let (mut engine, mut esdf) = new_engine();
        for x in -2..=6 {
            for y in -2..=6 {
                esdf.with_voxel_mut_allocate(&idx(x, y, 0), |v| v.observed = true);
            }
        }

        engine.load_insert_list(vec![idx(2, 2, 0)]);
        engine.run(&mut esdf);
        engine.load_insert_list(vec![idx(3, 2, 0)]);
        engine.run(&mut esdf);
        engine.load_delete_list(vec![idx(2, 2, 0)]);
        engine.run(&mut esdf);

        let probe = esdf.voxel_at(&idx(0, 2, 0)).unwrap();
        assert_eq!(probe.coc_idx, idx(3, 2, 0));
        assert_eq!(probe.distance, 3.0);
    }

    #[test]
    fn test_idempotent_on_empty_lists() {
        let (mut engine, mut esdf) = new_engine();
        engine.load_insert_list(vec![]);
        engine.load_delete_list(vec![]);
        engine.run(&mut esdf); // must not panic / touch anything
        assert_eq!(esdf.allocated_blocks_iter().count(), 0);
    }
}
