//! Bounds the region a single tick needs to touch, so the BFS can read and
//! write every neighbor of every affected voxel without a null check.

use super::index::{BlockIndex, GlobalIndex};
use super::prelude::*;
use super::voxel::Voxel;
use super::volume::VoxelVolume;

#[derive(Debug, Clone, Copy)]
pub struct RangeTracker {
    min: Option<Point3<i64>>,
    max: Option<Point3<i64>>,
    boundary_offset: (i64, i64, i64),
}

impl RangeTracker {
    pub fn new(boundary_offset: (i64, i64, i64)) -> Self {
        Self {
            min: None,
            max: None,
            boundary_offset,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none()
    }

    fn expand(&mut self, p: Point3<i64>) {
        self.min = Some(match self.min {
            Some(m) => Point3::new(m.x.min(p.x), m.y.min(p.y), m.z.min(p.z)),
            None => p,
        });
        self.max = Some(match self.max {
            Some(m) => Point3::new(m.x.max(p.x), m.y.max(p.y), m.z.max(p.z)),
            None => p,
        });
    }

    /// Computes `update_range` as the bounding box of `insert_list ∪ delete_list`.
    pub fn update_range<const VPS: usize>(
        &mut self,
        insert_list: &[GlobalIndex<VPS>],
        delete_list: &[GlobalIndex<VPS>],
    ) {
        self.min = None;
        self.max = None;
        for idx in insert_list.iter().chain(delete_list.iter()) {
            self.expand(idx.0);
        }
    }

    /// `update_range` padded by `boundary_offset` per axis; `None` if no
    /// changes were tracked.
    pub fn local_range(&self) -> Option<(Point3<i64>, Point3<i64>)> {
        let (min, max) = (self.min?, self.max?);
        let (px, py, pz) = self.boundary_offset;
        Some((
            Point3::new(min.x - px, min.y - py, min.z - pz),
            Point3::new(max.x + px, max.y + py, max.z + pz),
        ))
    }

    /// Inclusive axis-aligned containment test against the padded range.
    pub fn in_range<const VPS: usize>(&self, idx: &GlobalIndex<VPS>) -> bool {
        match self.local_range() {
            Some((min, max)) => {
                idx.x >= min.x
                    && idx.x <= max.x
                    && idx.y >= min.y
                    && idx.y <= max.y
                    && idx.z >= min.z
                    && idx.z <= max.z
            }
            None => false,
        }
    }

    /// Allocates every block intersecting `local_range` in `volume`, so the
    /// BFS can subsequently read/write all neighbors without null checks.
    pub fn set_local_range<V: Voxel + Copy, const VPS: usize>(
        &self,
        volume: &mut VoxelVolume<V, VPS>,
    ) {
        let Some((min, max)) = self.local_range() else {
            return;
        };

        let min_block = GlobalIndex::<VPS>::from(min).block_index();
        let max_block = GlobalIndex::<VPS>::from(max).block_index();

        for bx in min_block.x..=max_block.x {
            for by in min_block.y..=max_block.y {
                for bz in min_block.z..=max_block.z {
                    volume.allocate_block_by_index(&BlockIndex::new(bx, by, bz));
                }
            }
        }
    }
}
