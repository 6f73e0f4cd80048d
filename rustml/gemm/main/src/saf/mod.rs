//! Facade re-exports for rustml-gemm

pub use crate::api::error::*;
pub use crate::api::types::*;
pub use crate::core::fp16::{gemm_fp16_packed, pack_fp16, unpack_fp16};
pub use crate::core::header::PackedHeader;
pub use crate::core::int8::{gemm_int8_packed, int8_quant_params, pack_int8, pack_int8_with_config, unpack_int8};
pub use crate::core::pack_info::{fp16_pack_info, fp16_pack_size, int8_pack_info};
pub use crate::core::packed_matrix::PackedMatrix;
pub use crate::core::quantize::min_max;
pub use crate::core::simd;
