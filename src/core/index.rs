use std::ops::{Add, Deref, Sub};

use super::{prelude::*, utils::grid_index_from_point};

/// Sentinel marking "no index". Only the x-component is checked by convention
/// (matching the reference integrators), but constructors always set all three.
pub const UNDEF: i64 = i64::MAX;

pub trait GridIndex: From<Point3<i64>> {}

impl<const VPS: usize> GridIndex for GlobalIndex<VPS> {}
impl<const VPS: usize> GridIndex for BlockIndex<VPS> {}

/// Global Index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalIndex<const VPS: usize>(pub Point3<i64>);

impl<const VPS: usize> Deref for GlobalIndex<VPS> {
    type Target = Point3<i64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const VPS: usize> Sub for GlobalIndex<VPS> {
    type Output = GlobalIndex<VPS>;

    fn sub(self, rhs: Self) -> Self::Output {
        GlobalIndex((self.0 - rhs.0).into())
    }
}

impl<const VPS: usize> Add for GlobalIndex<VPS> {
    type Output = GlobalIndex<VPS>;

    fn add(self, rhs: Self) -> Self::Output {
        GlobalIndex((self.0.coords + rhs.0.coords).into())
    }
}

impl<const VPS: usize> GlobalIndex<VPS> {
    pub const UNDEF: GlobalIndex<VPS> = GlobalIndex(Point3::new(UNDEF, UNDEF, UNDEF));

    /// Only the x-component is checked, matching the reference integrators' convention.
    #[inline]
    pub fn is_undef(&self) -> bool {
        self.0.x == UNDEF
    }

    pub fn from_point(p: &Point3<Real>, grid_size_inv: Real) -> Self {
        Self::from(grid_index_from_point(p, grid_size_inv))
    }

    pub fn from_block_and_local_lin_index(
        block_index: &BlockIndex<VPS>,
        local_lin_index: usize,
    ) -> Self {
        assert!(local_lin_index < VPS * VPS * VPS);

        let mut p = block_index.0 * VPS as i32;

        let (q, rem) = num_integer::div_rem(local_lin_index, VPS * VPS);
        p.z += q as i32;
        let (q, rem) = num_integer::div_rem(rem, VPS);
        p.y += q as i32;
        p.x += rem as i32;

        GlobalIndex(p.cast())
    }

    pub fn from_block_and_voxel_index(
        block_index: &BlockIndex<VPS>,
        voxel_index: &VoxelIndex<VPS>,
    ) -> Self {
        Self(
            (block_index.0.cast::<i64>().coords * VPS as i64 + voxel_index.0.cast::<i64>().coords)
                .into(),
        )
    }

    pub fn block_voxel_index(&self) -> (BlockIndex<VPS>, VoxelIndex<VPS>) {
        (self.block_index(), self.local_voxel_index())
    }

    pub fn block_index(&self) -> BlockIndex<VPS> {
        BlockIndex(Point3::new(
            self.x.div_euclid(VPS as i64) as i32,
            self.y.div_euclid(VPS as i64) as i32,
            self.z.div_euclid(VPS as i64) as i32,
        ))
    }

    pub fn local_voxel_index(&self) -> VoxelIndex<VPS> {
        VoxelIndex(Point3::new(
            self.x.rem_euclid(VPS as i64) as usize,
            self.y.rem_euclid(VPS as i64) as usize,
            self.z.rem_euclid(VPS as i64) as usize,
        ))
    }

    pub fn center(&self, voxel_size: Real) -> Point3<Real> {
        Point3::new(
            ((self.x as Real) + 0.5) * voxel_size,
            ((self.y as Real) + 0.5) * voxel_size,
            ((self.z as Real) + 0.5) * voxel_size,
        )
    }

    /// Euclidean distance between two voxel centers, scaled by `voxel_size`.
    pub fn dist(&self, other: &GlobalIndex<VPS>, voxel_size: Real) -> Real {
        let d = self.0 - other.0;
        ((d.x * d.x + d.y * d.y + d.z * d.z) as Real).sqrt() * voxel_size
    }
}

impl<const VPS: usize> From<Point3<i64>> for GlobalIndex<VPS> {
    fn from(value: Point3<i64>) -> Self {
        Self(value.cast())
    }
}

/// Voxel Index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoxelIndex<const VPS: usize>(pub Point3<usize>);

impl<const VPS: usize> Deref for VoxelIndex<VPS> {
    type Target = Point3<usize>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const VPS: usize> VoxelIndex<VPS> {
    pub fn linear_index(&self) -> usize {
        self.x + VPS * (self.y + self.z * VPS)
    }
}

/// Block Index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockIndex<const VPS: usize>(pub Point3<i32>);

impl<const VPS: usize> Deref for BlockIndex<VPS> {
    type Target = Point3<i32>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const VPS: usize> BlockIndex<VPS> {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self(Point3::new(x, y, z))
    }
}

impl<const VPS: usize> From<Point3<i64>> for BlockIndex<VPS> {
    fn from(value: Point3<i64>) -> Self {
        Self(value.cast())
    }
}

impl<const VPS: usize> BlockIndex<VPS> {
    fn hash(&self) -> i32 {
        (self.x * 18397) + (self.y * 20483) + (self.z * 29303)
    }
}

impl<const VPS: usize> Ord for BlockIndex<VPS> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.hash().cmp(&other.hash())
    }
}

impl<const VPS: usize> PartialOrd for BlockIndex<VPS> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
