//! The adaptive octree hierarchy builder (§4.3): recursive box subdivision
//! from source/target points and the per-box U/V/W/X/E near-field lists.

pub mod builder;
pub mod data;

pub use builder::Hierarchy;
pub use data::{BoxData, BoxDirData, FftCache, NearFieldLists};
