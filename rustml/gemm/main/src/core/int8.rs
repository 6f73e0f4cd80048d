use crate::api::error::{GemmError, GemmResult};
use crate::api::types::*;
use crate::core::header::PackedHeader;
use crate::core::pack_info::{check_int8_dims, check_len, int8_packsize, packsize_to_usize};
use crate::core::quantize::min_max;
use crate::core::simd;
use rayon::prelude::*;
use std::time::Instant;

/// Per-column metadata stored after the int8 data region.
struct ColumnMeta {
    params: Vec<QuantizationParams>,
    col_sums: Vec<i32>,
}

/// Byte ranges of the four trailer arrays, each `ncol` entries of 4 bytes.
fn trailer_offsets(data_end: usize, ncol: usize) -> [usize; 4] {
    [data_end, data_end + 4 * ncol, data_end + 8 * ncol, data_end + 12 * ncol]
}

fn read_column_meta(b_packed: &[u8], g: &BlockGeometry) -> ColumnMeta {
    let data_end = PACKED_HEADER_BYTES + g.nbrow * g.brow * g.nbcol * g.bcol;
    let [scales, zero_points, offsets, sums] = trailer_offsets(data_end, g.ncol);
    let word = |base: usize, j: usize| -> [u8; 4] {
        let at = base + 4 * j;
        [b_packed[at], b_packed[at + 1], b_packed[at + 2], b_packed[at + 3]]
    };

    let params = (0..g.ncol)
        .map(|j| QuantizationParams {
            scale: f32::from_le_bytes(word(scales, j)),
            zero_point: i32::from_le_bytes(word(zero_points, j)),
            offset: f32::from_le_bytes(word(offsets, j)),
        })
        .collect();
    let col_sums = (0..g.ncol).map(|j| i32::from_le_bytes(word(sums, j))).collect();
    ColumnMeta { params, col_sums }
}

/// Min/max of every logical column of B.
fn column_ranges(src: &[f32], nrow: usize, ncol: usize, transpose: bool) -> Vec<(f32, f32)> {
    if transpose {
        // Row c of the source is column c of B.
        src.chunks_exact(nrow).map(min_max).collect()
    } else {
        let mut ranges = vec![(f32::INFINITY, f32::NEG_INFINITY); ncol];
        for row in src.chunks_exact(ncol) {
            for (range, &v) in ranges.iter_mut().zip(row) {
                range.0 = range.0.min(v);
                range.1 = range.1.max(v);
            }
        }
        ranges
    }
}

/// Quantize and pack a row-major f32 matrix into the int8 block layout using
/// the default [`Int8PackConfig`].
///
/// `nrow`, `ncol` and `packsize` must come from
/// [`int8_pack_info`](crate::int8_pack_info) for the same shape and transpose flag.
pub fn pack_int8(
    dest: &mut [u8],
    src: &[f32],
    transpose: bool,
    nrow: usize,
    ncol: usize,
    packsize: u64,
) -> GemmResult<()> {
    pack_int8_with_config(dest, src, transpose, nrow, ncol, packsize, &Int8PackConfig::default())
}

/// Quantize and pack with an explicit quantization granularity.
///
/// Out-of-range values cannot occur for the range the parameters were
/// computed from; NaNs quantize to the clamp of 0. `dest[..packsize]` is
/// fully overwritten, header and column trailer included.
#[allow(clippy::too_many_arguments)]
pub fn pack_int8_with_config(
    dest: &mut [u8],
    src: &[f32],
    transpose: bool,
    nrow: usize,
    ncol: usize,
    packsize: u64,
    config: &Int8PackConfig,
) -> GemmResult<()> {
    let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };
    check_int8_dims(nrow, ncol)?;
    let g = BlockGeometry::int8(nrow, ncol);
    let expected = int8_packsize(&g)?;
    if packsize != expected {
        return Err(GemmError::PackedLayout(format!(
            "packsize {} does not match int8 geometry {}x{} ({} expected)",
            packsize, nrow, ncol, expected
        )));
    }
    let packsize = packsize_to_usize(packsize)?;
    if dest.len() < packsize {
        return Err(GemmError::BufferTooSmall {
            what: "int8 packed buffer",
            required: packsize,
            actual: dest.len(),
        });
    }
    if src.len() != nrow * ncol {
        return Err(GemmError::ShapeMismatch {
            expected: vec![nrow * ncol],
            actual: vec![src.len()],
        });
    }

    let params: Vec<QuantizationParams> = match config.granularity {
        QuantGranularity::PerTensor => {
            let (lo, hi) = min_max(src);
            vec![QuantizationParams::for_range_i8(lo, hi); ncol]
        }
        QuantGranularity::PerColumn => column_ranges(src, nrow, ncol, transpose)
            .into_iter()
            .map(|(lo, hi)| QuantizationParams::for_range_i8(lo, hi))
            .collect(),
    };

    let dest = &mut dest[..packsize];
    let (head, rest) = dest.split_at_mut(PACKED_HEADER_BYTES);
    PackedHeader::new(PackedKind::Int8, transpose, &g, Some(config.granularity)).write(head);

    let row_stride = g.brow * g.nbcol * g.bcol;
    let (data, trailer) = rest.split_at_mut(row_stride * g.nbrow);

    let pack_block_row = |br: usize, chunk: &mut [u8]| -> Vec<i32> {
        chunk.fill(0);
        let rows_in = g.rows_in_block(br);
        let mut sums = vec![0i32; ncol];
        for bc in 0..g.nbcol {
            let base = bc * rows_in * g.bcol;
            for c_in in 0..g.cols_in_block(bc) {
                let c = bc * g.bcol + c_in;
                let p = &params[c];
                let run = &mut chunk[base + c_in * rows_in..base + (c_in + 1) * rows_in];
                for (r_in, q_out) in run.iter_mut().enumerate() {
                    let r = br * g.brow + r_in;
                    let v = if transpose { src[c * nrow + r] } else { src[r * ncol + c] };
                    let q = p.quantize_i8(v);
                    sums[c] += q as i32;
                    *q_out = q as u8;
                }
            }
        }
        sums
    };

    let partial_sums: Vec<Vec<i32>> = if g.nbrow > 1 {
        data.par_chunks_mut(row_stride)
            .enumerate()
            .map(|(br, chunk)| pack_block_row(br, chunk))
            .collect()
    } else {
        vec![pack_block_row(0, data)]
    };
    let mut col_sums = vec![0i32; ncol];
    for sums in &partial_sums {
        for (total, s) in col_sums.iter_mut().zip(sums) {
            *total += s;
        }
    }

    let [scales, zero_points, offsets, sums] = trailer_offsets(0, ncol);
    for (j, p) in params.iter().enumerate() {
        trailer[scales + 4 * j..scales + 4 * j + 4].copy_from_slice(&p.scale.to_le_bytes());
        trailer[zero_points + 4 * j..zero_points + 4 * j + 4].copy_from_slice(&p.zero_point.to_le_bytes());
        trailer[offsets + 4 * j..offsets + 4 * j + 4].copy_from_slice(&p.offset.to_le_bytes());
        trailer[sums + 4 * j..sums + 4 * j + 4].copy_from_slice(&col_sums[j].to_le_bytes());
    }

    log::debug!(
        "[pack] int8 {}x{} transpose={} granularity={:?} blocks={}x{} packsize={}",
        nrow, ncol, transpose, config.granularity, g.nbrow, g.nbcol, packsize
    );
    if let Some(t) = _t {
        log::trace!("[perf] gemm::pack_int8 [{}x{}] {:.3}ms",
            nrow, ncol, t.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(())
}

/// Read and validate the header and size of an int8 packed buffer.
pub(crate) fn read_int8_header(b_packed: &[u8]) -> GemmResult<PackedHeader> {
    let header = PackedHeader::read_kind(b_packed, PackedKind::Int8)?;
    let g = header.geometry();
    check_int8_dims(g.nrow, g.ncol)?;
    let packsize = packsize_to_usize(int8_packsize(&g)?)?;
    check_len("packed B", b_packed.len(), packsize)?;
    Ok(header)
}

/// Compute `C = dequantize(quantize(A) x B)` with B packed by [`pack_int8`].
///
/// Each row of A is quantized on the fly to u8 with its own scale and zero
/// point. Products accumulate in i32; zero-point corrections are applied in
/// i64 and each output is dequantized with a single multiply by
/// `scale_a * scale_b[j]`.
///
/// - `c`: `m x n` row-major output, fully overwritten.
/// - `a`: `m x k` row-major, or `k x m` row-major when `trans_a` is set.
/// - `k`, `n` and `trans_b` must match what B was packed with.
#[allow(clippy::too_many_arguments)]
pub fn gemm_int8_packed(
    c: &mut [f32],
    a: &[f32],
    b_packed: &[u8],
    m: usize,
    n: usize,
    k: usize,
    trans_a: bool,
    trans_b: bool,
) -> GemmResult<()> {
    let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };
    let header = read_int8_header(b_packed)?;
    let g = header.geometry();

    if k != g.nrow || n != g.ncol {
        return Err(GemmError::ShapeMismatch { expected: vec![g.nrow, g.ncol], actual: vec![k, n] });
    }
    if trans_b != header.is_transposed() {
        return Err(GemmError::PackedLayout(format!(
            "B was packed with transpose={} but trans_b={}",
            header.is_transposed(), trans_b
        )));
    }
    check_len("A", a.len(), m * k)?;
    check_len("C", c.len(), m * n)?;
    if m == 0 {
        return Ok(());
    }

    let meta = read_column_meta(b_packed, &g);
    let data_end = PACKED_HEADER_BYTES + g.nbrow * g.brow * g.nbcol * g.bcol;
    let data: &[i8] = bytemuck::cast_slice(&b_packed[PACKED_HEADER_BYTES..data_end]);
    let c = &mut c[..m * n];

    let compute_row = |i: usize, c_row: &mut [f32], qa: &mut Vec<u8>| {
        let a_at = |r: usize| if trans_a { a[r * m + i] } else { a[i * k + r] };

        let (lo, hi) = (0..k).fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), r| {
            let v = a_at(r);
            (lo.min(v), hi.max(v))
        });
        let pa = QuantizationParams::for_range_u8(lo, hi);

        qa.clear();
        qa.extend((0..k).map(|r| pa.quantize_u8(a_at(r))));
        let row_sum: i64 = qa.iter().map(|&q| q as i64).sum();
        let za = pa.zero_point as i64;

        for (j, out) in c_row.iter_mut().enumerate() {
            let (bc, c_in) = (j / g.bcol, j % g.bcol);
            let mut acc = 0i32;
            for br in 0..g.nbrow {
                let rows_in = g.rows_in_block(br);
                let run = g.block_base(br, bc) + c_in * rows_in;
                let k0 = br * g.brow;
                acc += simd::dot_u8_i8(&qa[k0..k0 + rows_in], &data[run..run + rows_in]);
            }

            let pb = &meta.params[j];
            let zb = pb.zero_point as i64;
            let corrected = acc as i64 - zb * row_sum - za * meta.col_sums[j] as i64 + k as i64 * za * zb;
            *out = (pa.scale * pb.scale) * corrected as f32;
        }
    };

    if m * n >= rustml_core::packed_gemm_par_threshold() {
        c.par_chunks_mut(n)
            .enumerate()
            .for_each_init(
                || Vec::with_capacity(k),
                |qa, (i, c_row)| compute_row(i, c_row, qa),
            );
    } else {
        let mut qa = Vec::with_capacity(k);
        for (i, c_row) in c.chunks_mut(n).enumerate() {
            compute_row(i, c_row, &mut qa);
        }
    }

    if let Some(t) = _t {
        log::trace!("[perf] gemm::gemm_int8_packed [{}x{}]x[{}x{}] {:.3}ms",
            m, k, k, n, t.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(())
}

/// Quantization parameters embedded in an int8 packed buffer, one per
/// logical column of B.
pub fn int8_quant_params(b_packed: &[u8]) -> GemmResult<Vec<QuantizationParams>> {
    let header = read_int8_header(b_packed)?;
    Ok(read_column_meta(b_packed, &header.geometry()).params)
}

/// Read an int8 packed buffer back as dequantized logical B
/// (`k x n`, row-major f32).
pub fn unpack_int8(b_packed: &[u8]) -> GemmResult<Vec<f32>> {
    let header = read_int8_header(b_packed)?;
    let g = header.geometry();
    let meta = read_column_meta(b_packed, &g);
    let data = &b_packed[PACKED_HEADER_BYTES..];

    let mut out = Vec::with_capacity(g.nrow * g.ncol);
    for r in 0..g.nrow {
        for (c, p) in meta.params.iter().enumerate() {
            let q = data[g.int8_offset(r, c)] as i8;
            out.push(p.dequantize(q as i32));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pack_info::int8_pack_info;
    use rustml_core::Shape;

    fn pack(src: &[f32], shape: [usize; 2], transpose: bool, granularity: QuantGranularity) -> Vec<u8> {
        let info = int8_pack_info(&Shape::new(shape), transpose).unwrap();
        let mut buf = vec![0xFFu8; info.packsize as usize];
        pack_int8_with_config(
            &mut buf, src, transpose, info.nrow, info.ncol, info.packsize,
            &Int8PackConfig { granularity },
        )
        .unwrap();
        buf
    }

    #[test]
    fn test_column_sums_match_data() {
        let src: Vec<f32> = (0..40 * 5).map(|i| ((i * 7) % 13) as f32 - 6.0).collect();
        let buf = pack(&src, [40, 5], false, QuantGranularity::PerColumn);
        let header = PackedHeader::read(&buf).unwrap();
        let g = header.geometry();
        let meta = read_column_meta(&buf, &g);
        let data = &buf[PACKED_HEADER_BYTES..];
        for c in 0..g.ncol {
            let expected: i32 = (0..g.nrow).map(|r| data[g.int8_offset(r, c)] as i8 as i32).sum();
            assert_eq!(meta.col_sums[c], expected, "column {}", c);
        }
    }

    #[test]
    fn test_per_tensor_shares_params() {
        let src: Vec<f32> = (0..24).map(|i| i as f32 - 10.0).collect();
        let buf = pack(&src, [6, 4], false, QuantGranularity::PerTensor);
        let params = int8_quant_params(&buf).unwrap();
        assert_eq!(params.len(), 4);
        assert!(params.iter().all(|p| *p == params[0]));
        assert_eq!(PackedHeader::read(&buf).unwrap().granularity(), Some(QuantGranularity::PerTensor));
    }

    #[test]
    fn test_per_column_params_differ() {
        // Column 0 spans [-1, 1], column 1 spans [-100, 100].
        let src = vec![-1.0, -100.0, 1.0, 100.0, 0.5, 50.0];
        let buf = pack(&src, [3, 2], false, QuantGranularity::PerColumn);
        let params = int8_quant_params(&buf).unwrap();
        assert!(params[1].scale > params[0].scale * 50.0);
    }

    #[test]
    fn test_unpack_wide_finite_range() {
        // hi - lo overflows f32 here; the step must still be finite.
        let src = vec![-3e38f32, 3e38, 1e38, -1e38];
        let buf = pack(&src, [4, 1], false, QuantGranularity::PerColumn);
        let scale = int8_quant_params(&buf).unwrap()[0].scale;
        assert!(scale.is_finite() && scale > 1e36, "scale {}", scale);
        let back = unpack_int8(&buf).unwrap();
        for (&x, &y) in src.iter().zip(&back) {
            assert!((x - y).abs() <= scale, "{} read back as {} (scale {})", x, y, scale);
        }
    }

    #[test]
    fn test_gemm_wide_finite_activations() {
        // A row [-2e38, 2e38] times B [1, 1]^T is exactly 0.
        let buf = pack(&[1.0, 1.0], [2, 1], false, QuantGranularity::PerColumn);
        let mut c = vec![f32::NAN; 1];
        gemm_int8_packed(&mut c, &[-2e38, 2e38], &buf, 1, 1, 2, false, false).unwrap();
        let sa = QuantizationParams::for_range_u8(-2e38, 2e38).scale;
        assert!(c[0].is_finite(), "c = {}", c[0]);
        assert!(c[0].abs() <= 2.0 * sa, "c = {} (scale_a {})", c[0], sa);
    }

    #[test]
    fn test_unpack_within_one_step() {
        let src: Vec<f32> = (0..70 * 9).map(|i| ((i as f32) * 0.31).cos() * 3.0).collect();
        let buf = pack(&src, [70, 9], false, QuantGranularity::PerColumn);
        let params = int8_quant_params(&buf).unwrap();
        let back = unpack_int8(&buf).unwrap();
        for (idx, (&x, &y)) in src.iter().zip(&back).enumerate() {
            let scale = params[idx % 9].scale;
            assert!((x - y).abs() <= scale, "{} vs {} (scale {})", x, y, scale);
        }
    }

    #[test]
    fn test_gemm_rejects_transpose_mismatch() {
        let buf = pack(&[1.0; 12], [3, 4], false, QuantGranularity::PerColumn);
        let mut c = vec![0.0; 8];
        let err = gemm_int8_packed(&mut c, &[1.0; 6], &buf, 2, 4, 3, false, true).unwrap_err();
        assert!(matches!(err, GemmError::PackedLayout(_)));
    }

    #[test]
    fn test_gemm_rejects_wrong_k() {
        let buf = pack(&[1.0; 12], [3, 4], false, QuantGranularity::PerColumn);
        let mut c = vec![0.0; 8];
        let err = gemm_int8_packed(&mut c, &[1.0; 8], &buf, 2, 4, 4, false, false).unwrap_err();
        assert!(matches!(err, GemmError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_gemm_rejects_fp16_buffer() {
        let info = crate::core::pack_info::fp16_pack_info(&Shape::new([3, 4]), false).unwrap();
        let mut buf = vec![0u8; info.packsize as usize];
        crate::core::fp16::pack_fp16(&mut buf, &[1.0; 12], false, &info).unwrap();
        let mut c = vec![0.0; 8];
        let err = gemm_int8_packed(&mut c, &[1.0; 6], &buf, 2, 4, 3, false, false).unwrap_err();
        assert!(matches!(err, GemmError::PackedLayout(_)));
    }

    #[test]
    fn test_pack_rejects_wrong_packsize() {
        let info = int8_pack_info(&Shape::new([3, 4]), false).unwrap();
        let mut buf = vec![0u8; info.packsize as usize + 8];
        let err = pack_int8(&mut buf, &[0.0; 12], false, 3, 4, info.packsize + 8).unwrap_err();
        assert!(matches!(err, GemmError::PackedLayout(_)));
    }
}
