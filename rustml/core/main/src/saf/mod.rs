//! Facade re-exports for rustml-core

pub use crate::api::types::*;
pub use crate::api::error::*;
pub use crate::core::shape::Shape;
pub use crate::core::runtime::{packed_gemm_par_threshold, OptProfile, RuntimeConfig, SimdLevel};
