//! Self-describing header at the start of every packed buffer.

use crate::api::error::{GemmError, GemmResult};
use crate::api::types::*;
use bytemuck::{Pod, Zeroable};

const PACKED_MAGIC: [u8; 4] = *b"RMPK";
const PACKED_VERSION: u32 = 1;

const KIND_FP16: u32 = 1;
const KIND_INT8: u32 = 2;

/// Geometry and numeric family recorded by the packer.
///
/// Stored in host byte order; packed buffers are in-memory artifacts, not a
/// file format.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PackedHeader {
    magic: [u8; 4],
    version: u32,
    kind: u32,
    transposed: u32,
    nrow: u32,
    ncol: u32,
    kernel_ncol_blocks: u32,
    brow: u32,
    bcol: u32,
    last_brow: u32,
    nbrow: u32,
    nbcol: u32,
    granularity: u32,
    reserved: [u32; 3],
}

const _: () = assert!(std::mem::size_of::<PackedHeader>() == PACKED_HEADER_BYTES);

impl PackedHeader {
    /// Callers guarantee every geometry field fits u32 (dims are bounded by
    /// `MAX_PACK_DIM`).
    pub(crate) fn new(
        kind: PackedKind,
        transposed: bool,
        geometry: &BlockGeometry,
        granularity: Option<QuantGranularity>,
    ) -> Self {
        Self {
            magic: PACKED_MAGIC,
            version: PACKED_VERSION,
            kind: match kind {
                PackedKind::Fp16 => KIND_FP16,
                PackedKind::Int8 => KIND_INT8,
            },
            transposed: transposed as u32,
            nrow: geometry.nrow as u32,
            ncol: geometry.ncol as u32,
            kernel_ncol_blocks: geometry.kernel_ncol_blocks as u32,
            brow: geometry.brow as u32,
            bcol: geometry.bcol as u32,
            last_brow: geometry.last_brow as u32,
            nbrow: geometry.nbrow as u32,
            nbcol: geometry.nbcol as u32,
            granularity: granularity.map_or(u32::MAX, QuantGranularity::to_raw),
            reserved: [0; 3],
        }
    }

    /// Write the header into the first `PACKED_HEADER_BYTES` of `dest`.
    pub(crate) fn write(&self, dest: &mut [u8]) {
        dest[..PACKED_HEADER_BYTES].copy_from_slice(bytemuck::bytes_of(self));
    }

    /// Parse and validate the header of a packed buffer.
    pub fn read(bytes: &[u8]) -> GemmResult<Self> {
        if bytes.len() < PACKED_HEADER_BYTES {
            return Err(GemmError::BufferTooSmall {
                what: "packed header",
                required: PACKED_HEADER_BYTES,
                actual: bytes.len(),
            });
        }
        let header: Self = bytemuck::pod_read_unaligned(&bytes[..PACKED_HEADER_BYTES]);
        if header.magic != PACKED_MAGIC {
            return Err(GemmError::PackedLayout("buffer was not written by a packer".to_string()));
        }
        if header.version != PACKED_VERSION {
            return Err(GemmError::PackedLayout(format!(
                "unsupported packed version {}", header.version
            )));
        }
        if header.kind != KIND_FP16 && header.kind != KIND_INT8 {
            return Err(GemmError::PackedLayout(format!("unknown packed kind {}", header.kind)));
        }

        let geometry = header.geometry();
        let consistent = geometry.brow > 0
            && geometry.kernel_ncol_blocks > 0
            && geometry.nrow > 0
            && geometry.ncol > 0
            && geometry
                == BlockGeometry::new(
                    geometry.nrow,
                    geometry.ncol,
                    geometry.kernel_ncol_blocks,
                    geometry.brow,
                );
        if !consistent {
            return Err(GemmError::PackedLayout(format!(
                "inconsistent block geometry {:?}", geometry
            )));
        }
        Ok(header)
    }

    /// Read the header and require a specific numeric family.
    pub(crate) fn read_kind(bytes: &[u8], kind: PackedKind) -> GemmResult<Self> {
        let header = Self::read(bytes)?;
        if header.kind() != kind {
            return Err(GemmError::PackedLayout(format!(
                "expected a {} packed buffer, got {}", kind, header.kind()
            )));
        }
        Ok(header)
    }

    pub fn kind(&self) -> PackedKind {
        if self.kind == KIND_FP16 { PackedKind::Fp16 } else { PackedKind::Int8 }
    }

    pub fn is_transposed(&self) -> bool {
        self.transposed != 0
    }

    /// Quantization granularity (int8 buffers only).
    pub fn granularity(&self) -> Option<QuantGranularity> {
        QuantGranularity::from_raw(self.granularity)
    }

    pub fn geometry(&self) -> BlockGeometry {
        BlockGeometry {
            nrow: self.nrow as usize,
            ncol: self.ncol as usize,
            kernel_ncol_blocks: self.kernel_ncol_blocks as usize,
            brow: self.brow as usize,
            bcol: self.bcol as usize,
            last_brow: self.last_brow as usize,
            nbrow: self.nbrow as usize,
            nbcol: self.nbcol as usize,
        }
    }
}
