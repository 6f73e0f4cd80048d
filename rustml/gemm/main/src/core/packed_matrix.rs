//! Owning wrapper for a packed weight matrix: pack once, multiply many times.

use crate::api::error::{GemmError, GemmResult};
use crate::api::types::*;
use crate::core::fp16::{gemm_fp16_packed, pack_fp16, read_fp16_header, unpack_fp16};
use crate::core::header::PackedHeader;
use crate::core::int8::{gemm_int8_packed, pack_int8_with_config, read_int8_header, unpack_int8};
use crate::core::pack_info::{check_len, fp16_pack_info, int8_pack_info, packsize_to_usize};
use rustml_core::Shape;

/// A packed B operand together with its logical dims.
#[derive(Debug, Clone)]
pub struct PackedMatrix {
    kind: PackedKind,
    k: usize,
    n: usize,
    transposed: bool,
    data: Vec<u8>,
}

impl PackedMatrix {
    /// Pack `src` (2-D `shape`, row-major) in the fp16 layout.
    pub fn fp16(src: &[f32], shape: &Shape, transpose: bool) -> GemmResult<Self> {
        let info = fp16_pack_info(shape, transpose)?;
        let mut data = vec![0u8; packsize_to_usize(info.packsize)?];
        pack_fp16(&mut data, src, transpose, &info)?;
        Ok(Self {
            kind: PackedKind::Fp16,
            k: info.geometry.nrow,
            n: info.geometry.ncol,
            transposed: transpose,
            data,
        })
    }

    /// Quantize and pack `src` in the int8 layout.
    pub fn int8(src: &[f32], shape: &Shape, transpose: bool, config: &Int8PackConfig) -> GemmResult<Self> {
        let info = int8_pack_info(shape, transpose)?;
        let mut data = vec![0u8; packsize_to_usize(info.packsize)?];
        pack_int8_with_config(&mut data, src, transpose, info.nrow, info.ncol, info.packsize, config)?;
        Ok(Self {
            kind: PackedKind::Int8,
            k: info.nrow,
            n: info.ncol,
            transposed: transpose,
            data,
        })
    }

    /// Adopt a buffer produced by one of the packers.
    pub fn from_bytes(data: Vec<u8>) -> GemmResult<Self> {
        let header = match PackedHeader::read(&data)?.kind() {
            PackedKind::Fp16 => read_fp16_header(&data)?.0,
            PackedKind::Int8 => read_int8_header(&data)?,
        };
        let g = header.geometry();
        let matrix = Self {
            kind: header.kind(),
            k: g.nrow,
            n: g.ncol,
            transposed: header.is_transposed(),
            data,
        };
        log::debug!(
            "[packed] adopted {} buffer k={} n={} ({} elements)",
            matrix.kind, matrix.k, matrix.n, matrix.kind.element_dtype()
        );
        Ok(matrix)
    }

    /// `A x B + bias` for `m` rows of A, returned as `m x n` row-major.
    pub fn matmul(&self, a: &[f32], m: usize, trans_a: bool, bias: Option<&[f32]>) -> GemmResult<Vec<f32>> {
        let mut c = vec![0.0f32; m * self.n];
        match self.kind {
            PackedKind::Fp16 => gemm_fp16_packed(&mut c, a, &self.data, bias, m, self.n, trans_a)?,
            PackedKind::Int8 => {
                if let Some(bias) = bias {
                    check_len("bias", bias.len(), self.n)?;
                }
                gemm_int8_packed(&mut c, a, &self.data, m, self.n, self.k, trans_a, self.transposed)?;
                if let Some(bias) = bias {
                    for row in c.chunks_mut(self.n) {
                        for (o, &b) in row.iter_mut().zip(bias) {
                            *o += b;
                        }
                    }
                }
            }
        }
        Ok(c)
    }

    /// Logical B as `k x n` row-major f32 (dequantized for int8).
    pub fn unpack(&self) -> GemmResult<Vec<f32>> {
        match self.kind {
            PackedKind::Fp16 => unpack_fp16(&self.data),
            PackedKind::Int8 => unpack_int8(&self.data),
        }
    }

    pub fn kind(&self) -> PackedKind {
        self.kind
    }

    /// Shared dimension.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Output columns.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes held by the packed buffer.
    pub fn memory_usage(&self) -> usize {
        self.data.len()
    }
}

impl TryFrom<Vec<u8>> for PackedMatrix {
    type Error = GemmError;

    fn try_from(data: Vec<u8>) -> GemmResult<Self> {
        Self::from_bytes(data)
    }
}
