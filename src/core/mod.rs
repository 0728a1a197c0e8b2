pub mod block;
pub mod bucket_queue;
pub mod dependent_list;
pub mod error;
pub mod index;
pub mod neighborhood;
pub mod range_tracker;
pub mod storage;
pub mod utils;
pub mod voxel;
pub mod volume;

pub mod prelude {
    pub type Real = f32;

    pub use nalgebra::Point3;

    pub use nalgebra::Vector3;
}
