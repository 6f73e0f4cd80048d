use crate::api::error::{GemmError, GemmResult};
use crate::api::types::*;
use crate::core::header::PackedHeader;
use crate::core::pack_info::{check_len, fp16_packsize, packsize_to_usize};
use half::f16;
use rayon::prelude::*;
use std::time::Instant;

/// Rows of C processed together; each packed block is decoded once per tile.
const ROW_TILE: usize = 8;

const F16_BYTES: usize = 2;

#[inline]
fn read_f16(bytes: &[u8], idx: usize) -> f32 {
    f16::from_le_bytes([bytes[idx * F16_BYTES], bytes[idx * F16_BYTES + 1]]).to_f32()
}

fn decode_halves(bytes: &[u8], out: &mut [f32]) {
    for (o, pair) in out.iter_mut().zip(bytes.chunks_exact(F16_BYTES)) {
        *o = f16::from_le_bytes([pair[0], pair[1]]).to_f32();
    }
}

/// Pack a row-major f32 matrix into the fp16 block layout.
///
/// `info` must come from [`fp16_pack_info`](crate::fp16_pack_info) for the
/// same shape and transpose flag. `dest[..info.packsize]` is fully
/// overwritten: scratch region with header, block data, zeroed padding.
pub fn pack_fp16(dest: &mut [u8], src: &[f32], transpose: bool, info: &Fp16PackInfo) -> GemmResult<()> {
    let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };
    let g = info.geometry;

    if g.nrow == 0 || g.ncol == 0 || g.nrow > MAX_PACK_DIM || g.ncol > MAX_PACK_DIM
        || g != BlockGeometry::fp16(g.nrow, g.ncol)
    {
        return Err(GemmError::PackedLayout(format!("not an fp16 block geometry: {:?}", g)));
    }
    let expected = fp16_packsize(&g)?;
    if info.packsize != expected {
        return Err(GemmError::PackedLayout(format!(
            "packsize {} does not match fp16 geometry ({} expected)",
            info.packsize, expected
        )));
    }
    let packsize = packsize_to_usize(info.packsize)?;
    if dest.len() < packsize {
        return Err(GemmError::BufferTooSmall {
            what: "fp16 packed buffer",
            required: packsize,
            actual: dest.len(),
        });
    }
    if src.len() != g.nrow * g.ncol {
        return Err(GemmError::ShapeMismatch {
            expected: vec![g.nrow * g.ncol],
            actual: vec![src.len()],
        });
    }

    let dest = &mut dest[..packsize];
    let (scratch, rest) = dest.split_at_mut(FP16_DATA_OFFSET);
    scratch.fill(0);
    PackedHeader::new(PackedKind::Fp16, transpose, &g, None).write(scratch);

    // Sizes were validated by fp16_packsize above.
    let row_stride = g.brow * g.nbcol * g.bcol;
    let (data, tail) = rest.split_at_mut(row_stride * g.nbrow * F16_BYTES);
    tail.fill(0);

    let pack_block_row = |br: usize, chunk: &mut [u8]| {
        chunk.fill(0);
        let rows_in = g.rows_in_block(br);
        for bc in 0..g.nbcol {
            let base = bc * rows_in * g.bcol;
            let cols_in = g.cols_in_block(bc);
            for r_in in 0..rows_in {
                let r = br * g.brow + r_in;
                let row_base = (base + r_in * g.bcol) * F16_BYTES;
                for c_in in 0..cols_in {
                    let c = bc * g.bcol + c_in;
                    let v = if transpose { src[c * g.nrow + r] } else { src[r * g.ncol + c] };
                    let off = row_base + c_in * F16_BYTES;
                    chunk[off..off + F16_BYTES].copy_from_slice(&f16::from_f32(v).to_le_bytes());
                }
            }
        }
    };

    let chunk_bytes = row_stride * F16_BYTES;
    if g.nbrow > 1 {
        data.par_chunks_mut(chunk_bytes)
            .enumerate()
            .for_each(|(br, chunk)| pack_block_row(br, chunk));
    } else {
        pack_block_row(0, data);
    }

    log::debug!(
        "[pack] fp16 {}x{} transpose={} blocks={}x{} packsize={}",
        g.nrow, g.ncol, transpose, g.nbrow, g.nbcol, info.packsize
    );
    if let Some(t) = _t {
        log::trace!("[perf] gemm::pack_fp16 [{}x{}] {:.3}ms",
            g.nrow, g.ncol, t.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(())
}

/// Read and validate the header of an fp16 packed buffer; returns it with
/// the packed size the buffer is known to hold.
pub(crate) fn read_fp16_header(b_packed: &[u8]) -> GemmResult<(PackedHeader, usize)> {
    let header = PackedHeader::read_kind(b_packed, PackedKind::Fp16)?;
    let packsize = packsize_to_usize(fp16_packsize(&header.geometry())?)?;
    check_len("packed B", b_packed.len(), packsize)?;
    Ok((header, packsize))
}

/// Compute `C = A x B + bias` with B packed by [`pack_fp16`].
///
/// - `c`: `m x n` row-major output, fully overwritten.
/// - `a`: `m x k` row-major, or `k x m` row-major when `trans_a` is set.
/// - `b_packed`: packed B; `k` is read from its header and `n` must match.
/// - `bias`: optional per-column bias of length `n`, added after the product.
pub fn gemm_fp16_packed(
    c: &mut [f32],
    a: &[f32],
    b_packed: &[u8],
    bias: Option<&[f32]>,
    m: usize,
    n: usize,
    trans_a: bool,
) -> GemmResult<()> {
    let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };
    let (header, packsize) = read_fp16_header(b_packed)?;
    let g = header.geometry();
    let k = g.nrow;

    if n != g.ncol {
        return Err(GemmError::ShapeMismatch { expected: vec![k, g.ncol], actual: vec![k, n] });
    }
    check_len("A", a.len(), m * k)?;
    check_len("C", c.len(), m * n)?;
    if let Some(bias) = bias {
        check_len("bias", bias.len(), n)?;
    }
    if m == 0 {
        return Ok(());
    }

    let data = &b_packed[FP16_DATA_OFFSET..packsize - FP16_PACK_PADDING];
    let c = &mut c[..m * n];

    let compute_tile = |tile_idx: usize, c_tile: &mut [f32]| {
        let row0 = tile_idx * ROW_TILE;
        let rows = c_tile.len() / n;
        c_tile.fill(0.0);
        let mut block = vec![0.0f32; g.brow * g.bcol];

        for br in 0..g.nbrow {
            let rows_in = g.rows_in_block(br);
            for bc in 0..g.nbcol {
                let base = g.block_base(br, bc);
                let cols_in = g.cols_in_block(bc);
                let block = &mut block[..rows_in * g.bcol];
                decode_halves(&data[base * F16_BYTES..(base + rows_in * g.bcol) * F16_BYTES], block);

                let col0 = bc * g.bcol;
                for i in 0..rows {
                    let out = &mut c_tile[i * n + col0..i * n + col0 + cols_in];
                    for r_in in 0..rows_in {
                        let r = br * g.brow + r_in;
                        let a_val = if trans_a { a[r * m + row0 + i] } else { a[(row0 + i) * k + r] };
                        let b_row = &block[r_in * g.bcol..r_in * g.bcol + cols_in];
                        for (o, &bv) in out.iter_mut().zip(b_row) {
                            *o += a_val * bv;
                        }
                    }
                }
            }
        }

        if let Some(bias) = bias {
            for row in c_tile.chunks_mut(n) {
                for (o, &bv) in row.iter_mut().zip(bias) {
                    *o += bv;
                }
            }
        }
    };

    if m * n >= rustml_core::packed_gemm_par_threshold() {
        c.par_chunks_mut(ROW_TILE * n)
            .enumerate()
            .for_each(|(tile_idx, c_tile)| compute_tile(tile_idx, c_tile));
    } else {
        c.chunks_mut(ROW_TILE * n)
            .enumerate()
            .for_each(|(tile_idx, c_tile)| compute_tile(tile_idx, c_tile));
    }

    if let Some(t) = _t {
        log::trace!("[perf] gemm::gemm_fp16_packed [{}x{}]x[{}x{}] {:.3}ms",
            m, k, k, n, t.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(())
}

/// Read a packed fp16 buffer back as logical B (`k x n`, row-major f32).
pub fn unpack_fp16(b_packed: &[u8]) -> GemmResult<Vec<f32>> {
    let (header, _) = read_fp16_header(b_packed)?;
    let g = header.geometry();

    let data = &b_packed[FP16_DATA_OFFSET..];
    let mut out = Vec::with_capacity(g.nrow * g.ncol);
    for r in 0..g.nrow {
        for c in 0..g.ncol {
            out.push(read_f16(data, g.fp16_offset(r, c)));
        }
    }
    Ok(out)
}
