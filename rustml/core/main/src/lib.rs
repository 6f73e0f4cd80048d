//! # RustML Core
//!
//! Shared building blocks for the RustML kernels.
//!
//! This crate provides the [`Shape`] descriptor that describes a logical
//! matrix or tensor, the element [`DType`]s understood by the kernels, and
//! the process-wide [`RuntimeConfig`] that controls rayon threading and the
//! parallel thresholds read by the compute crates.
//!
//! ## Example
//!
//! ```rust
//! use rustml_core::Shape;
//!
//! let shape = Shape::new([2, 3, 4]);
//! // Leading dims are flattened into rows.
//! assert_eq!(shape.as_matrix().unwrap(), (6, 4));
//! ```

pub mod api;
mod core;
mod saf;

pub use saf::*;
