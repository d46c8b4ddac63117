//! Translation passes (§4.5, §4.6) and the local evaluation sequencing
//! that drives them (§4.8).

pub mod driver;
pub mod high_frequency;
pub mod low_frequency;
pub mod mlib_impl;
pub mod surfaces;

pub use driver::Evaluator;
pub use mlib_impl::SurfaceMlib;
