//! Classic incremental EDT: bucket-queue BFS with a `raise`/`lower` state
//! machine carried per-voxel instead of dependent lists. A deleted seed
//! pushes itself into `raise` state; raise propagation floods the grid along
//! whichever neighbors still point at the *same* stale `coc_idx` (since
//! `propagate` only ever copies a `coc_idx` onto an adjacent voxel, that
//! flood is guaranteed to reach every dependent without needing a list). Any
//! neighbor found along the way whose `coc_idx` is still valid becomes a
//! lower candidate for the raising voxel itself.

use std::collections::HashSet;

use crate::config::EsdfConfig;
use crate::core::bucket_queue::BucketQueue;
use crate::core::error::ConfigError;
use crate::core::index::GlobalIndex;
use crate::core::neighborhood::{self, Connectivity};
use crate::core::prelude::Real;
use crate::core::range_tracker::RangeTracker;
use crate::core::voxel::UpdateFlags;

use super::common::{self, UpdateStats};
use super::{EsdfVolume, OccupancyVolume};

pub struct EdtEngine<const VPS: usize> {
    config: EsdfConfig,
    queue: BucketQueue<VPS>,
    range: RangeTracker,
    insert_list: Vec<GlobalIndex<VPS>>,
    delete_list: Vec<GlobalIndex<VPS>>,
    stats: UpdateStats,
}

impl<const VPS: usize> EdtEngine<VPS> {
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

    pub fn run(&mut self, esdf: &mut EsdfVolume<VPS>) {
        self.run_with_deadline(esdf, None);
    }

    /// Same as `run`, but checks `deadline` (if given) at the top of every
    /// pop; once it returns `true` the BFS stops early, leaving whatever
    /// remains in the bucket queue for the next tick.
    pub fn run_with_deadline(&mut self, esdf: &mut EsdfVolume<VPS>, deadline: Option<&dyn Fn() -> bool>) {
        self.range.update_range(&self.insert_list, &self.delete_list);
        if self.range.is_empty() {
            return;
        }
        self.range.set_local_range(esdf);
        self.stats = UpdateStats::default();

        self.phase_a_seed(esdf);
        self.phase_b_raise(esdf);
        self.run_queue(esdf, deadline);

        self.insert_list.clear();
        self.delete_list.clear();
        self.stats.log(self.config.verbose, "edt");
    }

    fn phase_a_seed(&mut self, esdf: &mut EsdfVolume<VPS>) {
        let insert_list = self.insert_list.clone();
        for g in insert_list {
            esdf.with_voxel_mut(&g, |v| {
                v.distance = 0.0;
                v.raw_distance = 0.0;
                v.coc_idx = g;
                v.raise = -1.0;
                v.newly = true;
                v.in_queue = true;
            });
            self.queue.push(g, 0.0);
            self.stats.updated += 1;
        }
    }

    /// Marks every deleted seed as `raise`-pending at its own (zero) priority.
    /// `run_queue` does the actual flood; no neighbor is touched here.
    fn phase_b_raise(&mut self, esdf: &mut EsdfVolume<VPS>) {
        let delete_list = self.delete_list.clone();
        // Guard against a voxel appearing twice in the same tick's delete list.
        let mut seen: HashSet<GlobalIndex<VPS>> = HashSet::new();
        for g in delete_list {
            if !seen.insert(g) {
                continue;
            }
            esdf.with_voxel_mut(&g, |v| {
                v.raise = v.distance.abs();
                v.in_queue = true;
            });
            self.queue.push(g, 0.0);
        }
    }

    fn run_queue(&mut self, esdf: &mut EsdfVolume<VPS>, deadline: Option<&dyn Fn() -> bool>) {
        while !deadline.is_some_and(|exceeded| exceeded()) {
            let Some(c) = self.queue.pop() else {
                break;
            };
            let Some(cv) = esdf.voxel_at(&c) else {
                continue;
            };
            if !cv.in_queue {
                continue; // stale entry
            }
            esdf.with_voxel_mut(&c, |v| v.in_queue = false);

            if cv.raise >= 0.0 {
                self.process_raise(esdf, &c, &cv);
            } else {
                self.process_lower(esdf, &c, &cv);
            }
        }
    }

    /// `c` lost its coc (either it was a deleted seed, or it inherited the
    /// raise from a neighbor). Cascades the raise to every neighbor still
    /// pointing at the same stale `coc_idx`, and collects the best still-valid
    /// neighbor coc as a replacement candidate for `c` itself.
    fn process_raise(
        &mut self,
        esdf: &mut EsdfVolume<VPS>,
        c: &GlobalIndex<VPS>,
        cv: &crate::core::voxel::EsdfVoxel<VPS>,
    ) {
        let stale_coc = cv.coc_idx;
        let behind = cv.behind;

        esdf.with_voxel_mut(c, |v| {
            v.coc_idx = GlobalIndex::UNDEF;
            v.distance = if v.behind {
                -self.config.default_distance_m
            } else {
                self.config.default_distance_m
            };
        });

        let mut best: Option<(GlobalIndex<VPS>, Real)> = None;
        for n in neighborhood::neighbors(c, Connectivity::TwentySix) {
            let Some(nv) = esdf.voxel_at(&n.index) else {
                continue;
            };
            if !nv.observed {
                continue;
            }

            let depends_on_c = !stale_coc.is_undef() && nv.coc_idx == stale_coc;
            if depends_on_c {
                if !nv.in_queue {
                    let priority = nv.distance.abs();
                    esdf.with_voxel_mut(&n.index, |v| {
                        v.raise = priority;
                        v.in_queue = true;
                    });
                    self.queue.push(n.index, priority);
                }
                continue;
            }

            if nv.coc_idx.is_undef() || nv.raise >= 0.0 {
                continue; // no usable coc yet, or itself mid-raise
            }
            let d = c.dist(&nv.coc_idx, esdf.voxel_size()).min(self.config.max_distance_m);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((nv.coc_idx, d));
            }
        }

        match best {
            Some((new_coc, d)) => {
                esdf.with_voxel_mut(c, |v| {
                    v.coc_idx = new_coc;
                    v.distance = if behind { -d } else { d };
                    v.raise = -1.0;
                    v.newly = true;
                    v.in_queue = true;
                });
                self.queue.push(*c, d);
            }
            None => {
                esdf.with_voxel_mut(c, |v| v.raise = -1.0);
            }
        }
        self.stats.raised += 1;
    }

    /// Structurally `phase_c_lower` without the patch step: propagate `c`'s
    /// coc to every observed, in-range neighbor it can improve.
    fn process_lower(
        &mut self,
        esdf: &mut EsdfVolume<VPS>,
        c: &GlobalIndex<VPS>,
        cv: &crate::core::voxel::EsdfVoxel<VPS>,
    ) {
        if cv.coc_idx.is_undef() {
            return;
        }

        let candidates: Vec<_> = if self.config.use_directional_guide {
            neighborhood::directional_subset(c, &cv.coc_idx, self.config.connectivity)
        } else {
            neighborhood::neighbors(c, self.config.connectivity).collect()
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
                esdf.with_voxel_mut(&n.index, |v| {
                    v.coc_idx = cv.coc_idx;
                    v.distance = if v.behind { -td } else { td };
                    v.raise = -1.0;
                    v.newly = true;
                    v.in_queue = true;
                });
                self.queue.push(n.index, td);
                self.stats.lowered += 1;
            }
        }
    }
}
