/// f32 lanes in one SIMD register of the target kernels (AVX2).
pub const SIMD_WIDTH: usize = 8;

/// Rows of B per block, shared by the fp16 and int8 layouts.
pub const BLOCK_ROWS: usize = 512;

/// Kernel column groups per fp16 block: a block row holds
/// `FP16_KERNEL_NCOL_BLOCKS * SIMD_WIDTH` contiguous halves.
pub const FP16_KERNEL_NCOL_BLOCKS: usize = 2;

/// Kernel column groups per int8 block.
pub const INT8_KERNEL_NCOL_BLOCKS: usize = 4;

/// Tail padding after fp16 data, required by pipelined kernels (bytes).
pub const FP16_PACK_PADDING: usize = 1024;

/// Scratch region in front of fp16 data; holds the packed header (bytes).
pub const FP16_PACK_SCRATCH: usize = 256;

/// Byte offset of the fp16 element data inside a packed buffer.
pub const FP16_DATA_OFFSET: usize = FP16_PACK_SCRATCH;

/// Size of the header at the start of every packed buffer (bytes).
pub const PACKED_HEADER_BYTES: usize = 64;

/// Trailer bytes per logical column of an int8 packed buffer:
/// f32 scale + i32 zero point + f32 offset + i32 column sum.
pub const INT8_COLUMN_META_BYTES: usize = 16;

/// Largest nrow / ncol accepted by the packers (stored as u32 in the header).
pub const MAX_PACK_DIM: usize = u32::MAX as usize;

/// Largest k for the int8 kernel: `255 * 128 * k` must fit an i32 accumulator.
pub const MAX_INT8_K: usize = 1 << 16;

/// Block partition of a logical `nrow x ncol` B matrix.
///
/// `nrow` is the shared (k) dimension, `ncol` the output (n) dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    pub nrow: usize,
    pub ncol: usize,
    pub kernel_ncol_blocks: usize,
    /// Rows per block.
    pub brow: usize,
    /// Columns per block (`kernel_ncol_blocks * SIMD_WIDTH`).
    pub bcol: usize,
    /// Rows in the final block row (`brow` when `nrow` divides evenly).
    pub last_brow: usize,
    /// Number of block rows.
    pub nbrow: usize,
    /// Number of block columns.
    pub nbcol: usize,
}

/// Detailed fp16 sizing result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fp16PackInfo {
    pub geometry: BlockGeometry,
    /// Bytes the caller must allocate: padded halves + padding + scratch.
    pub packsize: u64,
}

/// Int8 sizing result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Int8PackInfo {
    pub nrow: usize,
    pub ncol: usize,
    pub packsize: u64,
}

/// Affine quantization parameters: `x ~= (q - zero_point) * scale = q * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationParams {
    pub scale: f32,
    pub zero_point: i32,
    /// Real value represented by `q = 0`, i.e. `-zero_point * scale`.
    pub offset: f32,
}

/// Range over which int8 parameters for B are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantGranularity {
    /// One parameter set for the whole matrix.
    PerTensor,
    /// One parameter set per output column of logical B.
    #[default]
    PerColumn,
}

impl QuantGranularity {
    pub(crate) fn to_raw(self) -> u32 {
        match self {
            QuantGranularity::PerTensor => 0,
            QuantGranularity::PerColumn => 1,
        }
    }

    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(QuantGranularity::PerTensor),
            1 => Some(QuantGranularity::PerColumn),
            _ => None,
        }
    }
}

/// Options for the int8 quantizing packer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Int8PackConfig {
    pub granularity: QuantGranularity,
}

/// Numeric family of a packed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedKind {
    Fp16,
    Int8,
}

impl std::fmt::Display for PackedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackedKind::Fp16 => write!(f, "fp16"),
            PackedKind::Int8 => write!(f, "int8"),
        }
    }
}
