//! # RustML GEMM
//!
//! Packed matrix multiplication for static weights.
//!
//! A weight matrix B is packed once into a cache-blocked buffer and then
//! multiplied against many activation matrices:
//! - FP16: B is stored as half floats, products accumulate in f32
//! - INT8: B is quantized per column, each activation row is quantized on
//!   the fly and products accumulate in i32 before dequantization
//!
//! Packed buffers start with a [`PackedHeader`] recording the block geometry,
//! so a kernel rejects a buffer of the wrong family or shape instead of
//! reading out of bounds.
//!
//! ## Example
//!
//! ```rust
//! use rustml_core::Shape;
//! use rustml_gemm::{fp16_pack_info, gemm_fp16_packed, pack_fp16};
//!
//! // B is 3x2, A is 1x3.
//! let b = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
//! let info = fp16_pack_info(&Shape::new([3, 2]), false).unwrap();
//! let mut packed = vec![0u8; info.packsize as usize];
//! pack_fp16(&mut packed, &b, false, &info).unwrap();
//!
//! let mut c = [0.0f32; 2];
//! gemm_fp16_packed(&mut c, &[1.0, 1.0, 1.0], &packed, Some(&[0.5, 0.5]), 1, 2, false).unwrap();
//! assert_eq!(c, [9.5, 12.5]);
//! ```

pub mod api;
mod core;
mod saf;

pub use saf::*;
