//! Block geometry and packed-buffer sizing.
//!
//! Logical B is `nrow x ncol` (k x n). Without transpose the source is
//! row-major `k x n`; with transpose it is row-major `n x k` and is read with
//! swapped strides.

use crate::api::error::{GemmError, GemmResult};
use crate::api::types::*;
use rustml_core::{CoreError, Shape};

impl PackedKind {
    /// Element type stored in the data region.
    pub fn element_dtype(&self) -> rustml_core::DType {
        match self {
            PackedKind::Fp16 => rustml_core::DType::F16,
            PackedKind::Int8 => rustml_core::DType::I8,
        }
    }
}

impl BlockGeometry {
    pub fn new(nrow: usize, ncol: usize, kernel_ncol_blocks: usize, brow: usize) -> Self {
        let bcol = kernel_ncol_blocks * SIMD_WIDTH;
        let last_brow = if nrow % brow == 0 { brow } else { nrow % brow };
        Self {
            nrow,
            ncol,
            kernel_ncol_blocks,
            brow,
            bcol,
            last_brow,
            nbrow: nrow.div_ceil(brow),
            nbcol: ncol.div_ceil(bcol),
        }
    }

    pub fn fp16(nrow: usize, ncol: usize) -> Self {
        Self::new(nrow, ncol, FP16_KERNEL_NCOL_BLOCKS, BLOCK_ROWS)
    }

    pub fn int8(nrow: usize, ncol: usize) -> Self {
        Self::new(nrow, ncol, INT8_KERNEL_NCOL_BLOCKS, BLOCK_ROWS)
    }

    /// Elements in the padded data region (`nbrow*brow * nbcol*bcol`).
    pub fn padded_elements(&self) -> Option<usize> {
        self.block_row_stride()?.checked_mul(self.nbrow)
    }

    /// Elements between the starts of consecutive block rows.
    pub fn block_row_stride(&self) -> Option<usize> {
        self.brow.checked_mul(self.nbcol)?.checked_mul(self.bcol)
    }

    /// Rows held by block row `br`.
    #[inline]
    pub fn rows_in_block(&self, br: usize) -> usize {
        if br + 1 == self.nbrow { self.last_brow } else { self.brow }
    }

    /// Valid (non-padding) columns held by block column `bc`.
    #[inline]
    pub fn cols_in_block(&self, bc: usize) -> usize {
        (self.ncol - bc * self.bcol).min(self.bcol)
    }

    /// Element offset of block `(br, bc)` in the data region.
    ///
    /// Only meaningful once `padded_elements()` has been checked.
    #[inline]
    pub fn block_base(&self, br: usize, bc: usize) -> usize {
        br * self.brow * self.nbcol * self.bcol + bc * self.rows_in_block(br) * self.bcol
    }

    /// Offset of `(r, c)` in the fp16 layout: rows of `bcol` halves are
    /// contiguous inside a block.
    #[inline]
    pub fn fp16_offset(&self, r: usize, c: usize) -> usize {
        let (br, bc) = (r / self.brow, c / self.bcol);
        self.block_base(br, bc) + (r % self.brow) * self.bcol + c % self.bcol
    }

    /// Offset of `(r, c)` in the int8 layout: each column's k-run is
    /// contiguous inside a block.
    #[inline]
    pub fn int8_offset(&self, r: usize, c: usize) -> usize {
        let (br, bc) = (r / self.brow, c / self.bcol);
        self.block_base(br, bc) + (c % self.bcol) * self.rows_in_block(br) + r % self.brow
    }
}

fn size_overflow(geometry: &BlockGeometry) -> GemmError {
    GemmError::Core(CoreError::ShapeOverflow { dims: vec![geometry.nrow, geometry.ncol] })
}

fn check_dim(dim: usize, max: usize) -> GemmResult<()> {
    if dim > max {
        return Err(GemmError::DimensionTooLarge { dim, max });
    }
    Ok(())
}

/// Logical `(nrow, ncol)` of B for a source shape and transpose flag.
pub(crate) fn logical_dims(shape: &Shape, transpose: bool) -> GemmResult<(usize, usize)> {
    let (rows, cols) = shape.as_matrix()?;
    let (nrow, ncol) = if transpose { (cols, rows) } else { (rows, cols) };
    check_dim(nrow, MAX_PACK_DIM)?;
    check_dim(ncol, MAX_PACK_DIM)?;
    Ok((nrow, ncol))
}

/// Validate raw int8 dims, as passed to the packer without a `Shape`.
pub(crate) fn check_int8_dims(nrow: usize, ncol: usize) -> GemmResult<()> {
    if nrow == 0 || ncol == 0 {
        return Err(CoreError::InvalidShape(format!("zero-sized int8 matrix {}x{}", nrow, ncol)).into());
    }
    check_dim(nrow, MAX_INT8_K)?;
    check_dim(ncol, MAX_PACK_DIM)
}

/// Total fp16 packed bytes for a geometry: padded halves + padding + scratch.
pub(crate) fn fp16_packsize(geometry: &BlockGeometry) -> GemmResult<u64> {
    geometry
        .padded_elements()
        .and_then(|e| (e as u64).checked_mul(rustml_core::DType::F16.size() as u64))
        .and_then(|b| b.checked_add((FP16_PACK_PADDING + FP16_PACK_SCRATCH) as u64))
        .ok_or_else(|| size_overflow(geometry))
}

/// Total int8 packed bytes for a geometry: header + padded bytes + column trailer.
pub(crate) fn int8_packsize(geometry: &BlockGeometry) -> GemmResult<u64> {
    let trailer = (geometry.ncol as u64).checked_mul(INT8_COLUMN_META_BYTES as u64);
    geometry
        .padded_elements()
        .and_then(|e| (e as u64).checked_add(PACKED_HEADER_BYTES as u64))
        .zip(trailer)
        .and_then(|(data, trailer)| data.checked_add(trailer))
        .ok_or_else(|| size_overflow(geometry))
}

/// Convert a packed size to an in-memory length.
pub(crate) fn packsize_to_usize(packsize: u64) -> GemmResult<usize> {
    usize::try_from(packsize).map_err(|_| {
        GemmError::PackedLayout(format!("packed size {} exceeds addressable memory", packsize))
    })
}

pub(crate) fn check_len(what: &'static str, actual: usize, required: usize) -> GemmResult<()> {
    if actual < required {
        return Err(GemmError::BufferTooSmall { what, required, actual });
    }
    Ok(())
}

/// Byte size of the fp16 packed representation of `shape`.
pub fn fp16_pack_size(shape: &Shape, transpose: bool) -> GemmResult<u64> {
    Ok(fp16_pack_info(shape, transpose)?.packsize)
}

/// Byte size and full block geometry of the fp16 packed representation.
pub fn fp16_pack_info(shape: &Shape, transpose: bool) -> GemmResult<Fp16PackInfo> {
    let (nrow, ncol) = logical_dims(shape, transpose)?;
    let geometry = BlockGeometry::fp16(nrow, ncol);
    let packsize = fp16_packsize(&geometry)?;
    Ok(Fp16PackInfo { geometry, packsize })
}

/// Logical dims and byte size of the int8 packed representation.
///
/// The shared dimension is limited to [`MAX_INT8_K`] so the int8 kernel's
/// i32 accumulators cannot overflow.
pub fn int8_pack_info(shape: &Shape, transpose: bool) -> GemmResult<Int8PackInfo> {
    let (nrow, ncol) = logical_dims(shape, transpose)?;
    check_int8_dims(nrow, ncol)?;
    let packsize = int8_packsize(&BlockGeometry::int8(nrow, ncol))?;
    Ok(Int8PackInfo { nrow, ncol, packsize })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_dtype() {
        assert_eq!(PackedKind::Fp16.element_dtype(), rustml_core::DType::F16);
        assert_eq!(PackedKind::Int8.element_dtype(), rustml_core::DType::I8);
    }

    #[test]
    fn test_fp16_geometry_small() {
        let info = fp16_pack_info(&Shape::new([3, 2]), false).unwrap();
        let g = info.geometry;
        assert_eq!((g.nrow, g.ncol), (3, 2));
        assert_eq!(g.kernel_ncol_blocks, 2);
        assert_eq!((g.brow, g.bcol), (512, 16));
        assert_eq!(g.last_brow, 3);
        assert_eq!((g.nbrow, g.nbcol), (1, 1));
        assert_eq!(info.packsize, (512 * 16 * 2 + 1024 + 256) as u64);
    }

    #[test]
    fn test_fp16_geometry_transposed() {
        let g = fp16_pack_info(&Shape::new([40, 1030]), true).unwrap().geometry;
        assert_eq!((g.nrow, g.ncol), (1030, 40));
        assert_eq!(g.nbrow, 3);
        assert_eq!(g.last_brow, 1030 - 1024);
        assert_eq!(g.nbcol, 3);
    }

    #[test]
    fn test_last_brow_exact_multiple() {
        let g = BlockGeometry::fp16(1024, 16);
        assert_eq!(g.nbrow, 2);
        assert_eq!(g.last_brow, 512);
    }

    #[test]
    fn test_int8_info() {
        let info = int8_pack_info(&Shape::new([64, 10]), false).unwrap();
        assert_eq!((info.nrow, info.ncol), (64, 10));
        assert_eq!(info.packsize, (64 + 512 * 32 + 10 * 16) as u64);
    }

    #[test]
    fn test_int8_rejects_huge_k() {
        let err = int8_pack_info(&Shape::new([MAX_INT8_K + 1, 4]), false).unwrap_err();
        assert!(matches!(err, GemmError::DimensionTooLarge { .. }));
    }

    #[test]
    fn test_rejects_vector_shape() {
        assert!(matches!(
            fp16_pack_size(&Shape::new([16]), false),
            Err(GemmError::Core(CoreError::InvalidShape(_)))
        ));
    }

    #[test]
    fn test_rejects_dims_above_u32() {
        let err = fp16_pack_info(&Shape::new([2, MAX_PACK_DIM + 1]), false).unwrap_err();
        assert!(matches!(err, GemmError::DimensionTooLarge { .. }));
    }

    #[test]
    fn test_offsets_are_unique_and_in_bounds() {
        let g = BlockGeometry::fp16(600, 20);
        let padded = g.padded_elements().unwrap();
        let mut seen = vec![false; padded];
        for r in 0..g.nrow {
            for c in 0..g.ncol {
                let off = g.fp16_offset(r, c);
                assert!(off < padded);
                assert!(!seen[off], "duplicate offset for ({}, {})", r, c);
                seen[off] = true;
            }
        }

        let g = BlockGeometry::int8(600, 40);
        let padded = g.padded_elements().unwrap();
        let mut seen = vec![false; padded];
        for r in 0..g.nrow {
            for c in 0..g.ncol {
                let off = g.int8_offset(r, c);
                assert!(off < padded);
                assert!(!seen[off], "duplicate offset for ({}, {})", r, c);
                seen[off] = true;
            }
        }
    }

    #[test]
    fn test_fp16_kernel_row_is_contiguous() {
        let g = BlockGeometry::fp16(8, 32);
        assert_eq!(g.fp16_offset(2, 1), g.fp16_offset(2, 0) + 1);
        assert_eq!(g.fp16_offset(3, 0), g.fp16_offset(2, 0) + g.bcol);
    }

    #[test]
    fn test_int8_column_run_is_contiguous() {
        let g = BlockGeometry::int8(100, 40);
        assert_eq!(g.int8_offset(1, 5), g.int8_offset(0, 5) + 1);
        assert_eq!(g.int8_offset(0, 6), g.int8_offset(0, 5) + 100);
    }
}
