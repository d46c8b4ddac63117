//! Contracts for the pieces the core treats as external collaborators:
//! the kernel, dense linear algebra (`gemv`), the FFT, the distributed
//! sort, the translation matrix library (Mlib), and the option-map
//! configuration consumed once at setup.

pub mod config;
pub mod fft;
pub mod kernel;
pub mod linalg;
pub mod mlib;
pub mod sort;

pub use config::Config;
pub use fft::Fft;
pub use kernel::Kernel;
pub use linalg::{Gemv, ThreeFactor};
pub use mlib::{Mlib, TranslationOperators};
pub use sort::Sort;

/// Complex scalar used throughout the translation passes.
pub type Complex64 = num::complex::Complex<f64>;

/// Errors raised by the core per §7: invariant violations and missing
/// resident data are fatal and carry a diagnostic identifying the check.
#[derive(thiserror::Error, Debug)]
pub enum DdfmmError {
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("key not resident at access: {0:?}")]
    MissingData(String),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DdfmmError>;
