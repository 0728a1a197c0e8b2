//! Intrusive doubly-linked lists threaded through `EsdfVoxel::prev_idx` /
//! `next_idx` / `head_idx`. No separate allocation: the volume already owns
//! every voxel, so a list is just index handles addressed through the same
//! block lookup as everything else. A seed's own `head_idx` may equal its
//! `self_idx` (a voxel depending on itself is never constructed by the
//! integrators, but a seed's list containing no one but itself is valid).

use super::index::GlobalIndex;
use super::volume::VoxelVolume;
use super::voxel::EsdfVoxel;

type EsdfVolume<const VPS: usize> = VoxelVolume<EsdfVoxel<VPS>, VPS>;

/// Prepends `dep_idx` to the list headed at `seed_idx`'s `head_idx`.
pub fn insert<const VPS: usize>(
    volume: &EsdfVolume<VPS>,
    seed_idx: &GlobalIndex<VPS>,
    dep_idx: &GlobalIndex<VPS>,
) {
    let old_head = volume
        .with_voxel_mut(seed_idx, |seed| {
            let old_head = seed.head_idx;
            seed.head_idx = *dep_idx;
            old_head
        })
        .unwrap_or_else(|| panic!("dependent_list::insert: seed voxel {:?} missing", **seed_idx));

    volume.with_voxel_mut(dep_idx, |dep| {
        dep.prev_idx = GlobalIndex::UNDEF;
        dep.next_idx = old_head;
    });

    if !old_head.is_undef() {
        volume.with_voxel_mut(&old_head, |old_head_vox| {
            old_head_vox.prev_idx = *dep_idx;
        });
    }
}

/// Unlinks `dep_idx` from the list headed at `seed_idx`, fixing up its
/// neighbors' links and `seed_idx`'s `head_idx` if `dep_idx` was first.
pub fn delete<const VPS: usize>(
    volume: &EsdfVolume<VPS>,
    seed_idx: &GlobalIndex<VPS>,
    dep_idx: &GlobalIndex<VPS>,
) {
    let (prev, next) = volume
        .with_voxel_mut(dep_idx, |dep| {
            let links = (dep.prev_idx, dep.next_idx);
            dep.prev_idx = GlobalIndex::UNDEF;
            dep.next_idx = GlobalIndex::UNDEF;
            links
        })
        .unwrap_or_else(|| panic!("dependent_list::delete: dependent voxel {:?} missing", **dep_idx));

    if !prev.is_undef() {
        volume.with_voxel_mut(&prev, |p| p.next_idx = next);
    } else {
        volume.with_voxel_mut(seed_idx, |seed| seed.head_idx = next);
    }

    if !next.is_undef() {
        volume.with_voxel_mut(&next, |n| n.prev_idx = prev);
    }
}

/// Collects every member of the list headed at `seed_idx` (for tests and the
/// delete-phase rescan), walking `head_idx -> next_idx*`.
pub fn members<const VPS: usize>(
    volume: &EsdfVolume<VPS>,
    seed_idx: &GlobalIndex<VPS>,
) -> Vec<GlobalIndex<VPS>> {
    let mut out = Vec::new();
    let Some(head) = volume.voxel_at(seed_idx).map(|v| v.head_idx) else {
        return out;
    };
    let mut cur = head;
    while !cur.is_undef() {
        out.push(cur);
        cur = volume
            .voxel_at(&cur)
            .unwrap_or_else(|| panic!("dependent_list::members: voxel {:?} missing", *cur))
            .next_idx;
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::prelude::*;

    fn idx<const VPS: usize>(x: i64, y: i64, z: i64) -> GlobalIndex<VPS> {
        GlobalIndex(Point3::new(x, y, z))
    }

    #[test]
    fn test_insert_prepends_and_members_reflect_order() {
        let mut volume: VoxelVolume<EsdfVoxel<8>, 8> = VoxelVolume::new(1.0);
        let seed = idx(0, 0, 0);
        let a = idx(1, 0, 0);
        let b = idx(2, 0, 0);

        volume.with_voxel_mut_allocate(&seed, |_| {});
        volume.with_voxel_mut_allocate(&a, |_| {});
        volume.with_voxel_mut_allocate(&b, |_| {});

        insert(&volume, &seed, &a);
        insert(&volume, &seed, &b);

        assert_eq!(members(&volume, &seed), vec![b, a]);
    }

    #[test]
    fn test_delete_unlinks_middle_and_head() {
        let mut volume: VoxelVolume<EsdfVoxel<8>, 8> = VoxelVolume::new(1.0);
        let seed = idx(0, 0, 0);
        let a = idx(1, 0, 0);
        let b = idx(2, 0, 0);
        let c = idx(3, 0, 0);

        for i in [seed, a, b, c] {
            volume.with_voxel_mut_allocate(&i, |_| {});
        }

        insert(&volume, &seed, &a);
        insert(&volume, &seed, &b);
        insert(&volume, &seed, &c);
        // list: c, b, a

        delete(&volume, &seed, &b);
        assert_eq!(members(&volume, &seed), vec![c, a]);

        delete(&volume, &seed, &c);
        assert_eq!(members(&volume, &seed), vec![a]);

        delete(&volume, &seed, &a);
        assert_eq!(members(&volume, &seed), Vec::<GlobalIndex<8>>::new());
    }

    #[test]
    fn test_self_link_is_valid() {
        let mut volume: VoxelVolume<EsdfVoxel<8>, 8> = VoxelVolume::new(1.0);
        let seed = idx(0, 0, 0);
        volume.with_voxel_mut_allocate(&seed, |_| {});
        insert(&volume, &seed, &seed);
        assert_eq!(members(&volume, &seed), vec![seed]);
    }
}
