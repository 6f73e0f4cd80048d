//! SIMD integer dot products for the int8 packed GEMM.
//!
//! Uses `std::arch` target-specific intrinsics with scalar fallbacks.
//! Both operands are widened to i16 before multiplying, so no product or
//! pairwise sum saturates.
//!
//! Dispatch hierarchy:
//! - x86_64: AVX2 (16 pairs/iter) -> SSE2 (16 pairs/iter) -> scalar
//! - aarch64: NEON (16 pairs/iter) -> scalar
//! - Other: scalar fallback

fn dot_u8_i8_scalar(a: &[u8], b: &[i8]) -> i32 {
    a.iter().zip(b).map(|(&x, &y)| x as i32 * y as i32).sum()
}

// --- x86_64 SIMD implementations ---

#[cfg(target_arch = "x86_64")]
mod x86 {
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn dot_u8_i8_avx2(a: &[u8], b: &[i8]) -> i32 {
        use std::arch::x86_64::*;

        let len = a.len().min(b.len());
        let chunks = len / 16;
        let mut acc = _mm256_setzero_si256();

        for chunk in 0..chunks {
            let base = chunk * 16;
            let va = _mm_loadu_si128(a.as_ptr().add(base) as *const __m128i);
            let vb = _mm_loadu_si128(b.as_ptr().add(base) as *const __m128i);
            let a_i16 = _mm256_cvtepu8_epi16(va);
            let b_i16 = _mm256_cvtepi8_epi16(vb);
            acc = _mm256_add_epi32(acc, _mm256_madd_epi16(a_i16, b_i16));
        }

        let lo = _mm256_castsi256_si128(acc);
        let hi = _mm256_extracti128_si256(acc, 1);
        let sum128 = _mm_add_epi32(lo, hi);
        let hi64 = _mm_srli_si128(sum128, 8);
        let sum64 = _mm_add_epi32(sum128, hi64);
        let hi32 = _mm_srli_si128(sum64, 4);
        let sum32 = _mm_add_epi32(sum64, hi32);
        let mut total = _mm_cvtsi128_si32(sum32);

        for j in chunks * 16..len {
            total += a[j] as i32 * b[j] as i32;
        }
        total
    }

    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn dot_u8_i8_sse2(a: &[u8], b: &[i8]) -> i32 {
        use std::arch::x86_64::*;

        let len = a.len().min(b.len());
        let chunks = len / 16;
        let zero = _mm_setzero_si128();
        let mut acc = _mm_setzero_si128();

        for chunk in 0..chunks {
            let base = chunk * 16;
            let a_raw = _mm_loadu_si128(a.as_ptr().add(base) as *const __m128i);
            let b_raw = _mm_loadu_si128(b.as_ptr().add(base) as *const __m128i);

            // u8 zero-extends, i8 sign-extends via the comparison mask.
            let a_lo = _mm_unpacklo_epi8(a_raw, zero);
            let a_hi = _mm_unpackhi_epi8(a_raw, zero);
            let b_sign = _mm_cmpgt_epi8(zero, b_raw);
            let b_lo = _mm_unpacklo_epi8(b_raw, b_sign);
            let b_hi = _mm_unpackhi_epi8(b_raw, b_sign);

            acc = _mm_add_epi32(acc, _mm_madd_epi16(a_lo, b_lo));
            acc = _mm_add_epi32(acc, _mm_madd_epi16(a_hi, b_hi));
        }

        let hi64 = _mm_srli_si128(acc, 8);
        let sum64 = _mm_add_epi32(acc, hi64);
        let hi32 = _mm_srli_si128(sum64, 4);
        let sum32 = _mm_add_epi32(sum64, hi32);
        let mut total = _mm_cvtsi128_si32(sum32);

        for j in chunks * 16..len {
            total += a[j] as i32 * b[j] as i32;
        }
        total
    }
}

// --- aarch64 SIMD implementations ---

#[cfg(target_arch = "aarch64")]
mod arm {
    pub(super) unsafe fn dot_u8_i8_neon(a: &[u8], b: &[i8]) -> i32 {
        use std::arch::aarch64::*;

        let len = a.len().min(b.len());
        let chunks = len / 16;
        let mut acc = vdupq_n_s32(0);

        for chunk in 0..chunks {
            let base = chunk * 16;
            let va = vld1q_u8(a.as_ptr().add(base));
            let vb = vld1q_s8(b.as_ptr().add(base));

            let a_lo = vreinterpretq_s16_u16(vmovl_u8(vget_low_u8(va)));
            let a_hi = vreinterpretq_s16_u16(vmovl_high_u8(va));
            let b_lo = vmovl_s8(vget_low_s8(vb));
            let b_hi = vmovl_high_s8(vb);

            acc = vmlal_s16(acc, vget_low_s16(a_lo), vget_low_s16(b_lo));
            acc = vmlal_high_s16(acc, a_lo, b_lo);
            acc = vmlal_s16(acc, vget_low_s16(a_hi), vget_low_s16(b_hi));
            acc = vmlal_high_s16(acc, a_hi, b_hi);
        }

        let mut total = vaddvq_s32(acc);
        for j in chunks * 16..len {
            total += a[j] as i32 * b[j] as i32;
        }
        total
    }
}

// --- Public dispatch functions ---

/// Runtime-dispatched integer dot product of a u8 run with an i8 run -> i32.
///
/// Operands must have equal length. The caller bounds the length so the
/// result fits an i32 (`255 * 128 * len <= i32::MAX`).
pub fn dot_u8_i8(a: &[u8], b: &[i8]) -> i32 {
    debug_assert_eq!(a.len(), b.len());

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return unsafe { x86::dot_u8_i8_avx2(a, b) };
        }
        return unsafe { x86::dot_u8_i8_sse2(a, b) };
    }

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { arm::dot_u8_i8_neon(a, b) };
    }

    #[allow(unreachable_code)]
    dot_u8_i8_scalar(a, b)
}

/// Scalar-only u8 x i8 dot product (for testing).
pub fn dot_u8_i8_scalar_ref(a: &[u8], b: &[i8]) -> i32 {
    dot_u8_i8_scalar(a, b)
}
