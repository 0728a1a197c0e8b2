use super::index::GlobalIndex;
use super::prelude::*;

/// How many of a voxel's neighbors a connectivity graph considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Six = 6,
    Eighteen = 18,
    TwentyFour = 24,
    TwentySix = 26,
}

impl Connectivity {
    pub fn count(self) -> usize {
        self as usize
    }
}

const SQRT_2: Real = std::f32::consts::SQRT_2;
const SQRT_3: Real = 1.732_050_8;

/// Offsets ordered face (6) + edge (12, reaches 18) + corner (8, reaches 26),
/// matching the reference integrators' `kOffsets` table. Index `i` in
/// `OFFSETS` corresponds to distance `DISTANCES[i]`.
const OFFSETS: [(i64, i64, i64); 26] = [
    // 6: faces
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
    // 12: edges (reach 18)
    (1, 1, 0),
    (-1, 1, 0),
    (1, -1, 0),
    (-1, -1, 0),
    (1, 0, 1),
    (-1, 0, 1),
    (1, 0, -1),
    (-1, 0, -1),
    (0, 1, 1),
    (0, -1, 1),
    (0, 1, -1),
    (0, -1, -1),
    // 8: corners (reach 26)
    (1, 1, 1),
    (-1, 1, 1),
    (1, -1, 1),
    (-1, -1, 1),
    (1, 1, -1),
    (-1, 1, -1),
    (1, -1, -1),
    (-1, -1, -1),
];

const DISTANCES: [Real; 26] = [
    1.0, 1.0, 1.0, 1.0, 1.0, 1.0, SQRT_2, SQRT_2, SQRT_2, SQRT_2, SQRT_2, SQRT_2, SQRT_2, SQRT_2,
    SQRT_2, SQRT_2, SQRT_2, SQRT_2, SQRT_3, SQRT_3, SQRT_3, SQRT_3, SQRT_3, SQRT_3, SQRT_3, SQRT_3,
];

/// Offset plus the unit distance (before voxel-size scaling) to a neighbor.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<const VPS: usize> {
    pub index: GlobalIndex<VPS>,
    pub distance: Real,
}

/// All neighbors of `center` under `connectivity`.
pub fn neighbors<const VPS: usize>(
    center: &GlobalIndex<VPS>,
    connectivity: Connectivity,
) -> impl Iterator<Item = Neighbor<VPS>> + '_ {
    let n = connectivity.count();
    OFFSETS
        .iter()
        .zip(DISTANCES.iter())
        .take(n)
        .map(move |(offset, dist)| Neighbor {
            index: GlobalIndex(Point3::new(
                center.x + offset.0,
                center.y + offset.1,
                center.z + offset.2,
            )),
            distance: *dist,
        })
}

/// The strict-superset subset of `neighbors(center, connectivity)` lying on
/// the far side of `center` from `coc` along each axis where `coc` and
/// `center` differ. Ported from `getFromGlobalIndexAndObstacle`: used to
/// restrict BFS expansion in the propagate step without ever excluding a
/// candidate that could legitimately improve a neighbor's distance, since a
/// shorter path through `center` can only come from the direction away from
/// the obstacle `center` was relaxed from.
pub fn directional_subset<const VPS: usize>(
    center: &GlobalIndex<VPS>,
    coc: &GlobalIndex<VPS>,
    connectivity: Connectivity,
) -> Vec<Neighbor<VPS>> {
    let dx = sign(center.x - coc.x);
    let dy = sign(center.y - coc.y);
    let dz = sign(center.z - coc.z);

    neighbors(center, connectivity)
        .filter(|n| {
            let offset = (n.index.x - center.x, n.index.y - center.y, n.index.z - center.z);
            (dx == 0 || sign(offset.0) != -dx)
                && (dy == 0 || sign(offset.1) != -dy)
                && (dz == 0 || sign(offset.2) != -dz)
        })
        .collect()
}

fn sign(v: i64) -> i64 {
    if v > 0 {
        1
    } else if v < 0 {
        -1
    } else {
        0
    }
}
