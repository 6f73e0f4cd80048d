pub(crate) mod fp16;
pub(crate) mod header;
pub(crate) mod int8;
pub(crate) mod pack_info;
pub(crate) mod packed_matrix;
pub(crate) mod quantize;
pub mod simd;
