use crate::api::types::QuantizationParams;

/// Number of quantization steps in an 8-bit range.
const QUANT_STEPS: f32 = 255.0;

/// Minimum and maximum of a slice. NaNs are skipped; an empty slice yields
/// `(0.0, 0.0)`.
pub fn min_max(data: &[f32]) -> (f32, f32) {
    let (lo, hi) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo > hi {
        (0.0, 0.0)
    } else {
        (lo, hi)
    }
}

/// Widen `[lo, hi]` to include zero and derive the step size.
///
/// Zero must be exactly representable so padding and ReLU zeros quantize
/// without error.
fn widened_scale(lo: f32, hi: f32) -> (f32, f32) {
    let lo = lo.min(0.0);
    let hi = hi.max(0.0);
    // Divide first: hi - lo can overflow for finite inputs.
    let scale = hi / QUANT_STEPS - lo / QUANT_STEPS;
    let scale = if scale > 0.0 && scale.is_finite() { scale } else { 1.0 };
    (lo, scale)
}

impl QuantizationParams {
    fn with_zero_point(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point, offset: -(zero_point as f32) * scale }
    }

    /// Parameters mapping `[lo, hi]` onto signed `[-128, 127]`.
    pub fn for_range_i8(lo: f32, hi: f32) -> Self {
        let (lo, scale) = widened_scale(lo, hi);
        let zero_point = (-128.0 - lo / scale).round().clamp(-128.0, 127.0) as i32;
        Self::with_zero_point(scale, zero_point)
    }

    /// Parameters mapping `[lo, hi]` onto unsigned `[0, 255]`.
    pub fn for_range_u8(lo: f32, hi: f32) -> Self {
        let (lo, scale) = widened_scale(lo, hi);
        let zero_point = (-lo / scale).round().clamp(0.0, 255.0) as i32;
        Self::with_zero_point(scale, zero_point)
    }

    /// `q = clamp(round(x / scale) + zero_point, -128, 127)`.
    #[inline]
    pub fn quantize_i8(&self, x: f32) -> i8 {
        ((x / self.scale).round() + self.zero_point as f32).clamp(-128.0, 127.0) as i8
    }

    /// `q = clamp(round(x / scale) + zero_point, 0, 255)`.
    #[inline]
    pub fn quantize_u8(&self, x: f32) -> u8 {
        ((x / self.scale).round() + self.zero_point as f32).clamp(0.0, 255.0) as u8
    }

    /// `x = (q - zero_point) * scale`.
    #[inline]
    pub fn dequantize(&self, q: i32) -> f32 {
        (q - self.zero_point) as f32 * self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max() {
        assert_eq!(min_max(&[3.0, -1.0, 2.5]), (-1.0, 3.0));
        assert_eq!(min_max(&[]), (0.0, 0.0));
        assert_eq!(min_max(&[f32::NAN, 1.0]), (1.0, 1.0));
    }

    #[test]
    fn test_i8_roundtrip_within_one_step() {
        let data: Vec<f32> = (0..200).map(|i| (i as f32 - 60.0) * 0.037).collect();
        let (lo, hi) = min_max(&data);
        let p = QuantizationParams::for_range_i8(lo, hi);
        for &x in &data {
            let back = p.dequantize(p.quantize_i8(x) as i32);
            assert!((back - x).abs() <= p.scale, "i8 roundtrip {} -> {} (scale {})", x, back, p.scale);
        }
    }

    #[test]
    fn test_u8_roundtrip_within_one_step() {
        let data: Vec<f32> = (0..97).map(|i| (i as f32).sin() * 4.0).collect();
        let (lo, hi) = min_max(&data);
        let p = QuantizationParams::for_range_u8(lo, hi);
        for &x in &data {
            let back = p.dequantize(p.quantize_u8(x) as i32);
            assert!((back - x).abs() <= p.scale, "u8 roundtrip {} -> {} (scale {})", x, back, p.scale);
        }
    }

    #[test]
    fn test_zero_is_exact() {
        let p = QuantizationParams::for_range_i8(0.3, 7.1);
        assert_eq!(p.dequantize(p.quantize_i8(0.0) as i32), 0.0);
        let p = QuantizationParams::for_range_u8(-2.0, 5.0);
        assert_eq!(p.dequantize(p.quantize_u8(0.0) as i32), 0.0);
    }

    #[test]
    fn test_constant_zero_range() {
        let p = QuantizationParams::for_range_i8(0.0, 0.0);
        assert_eq!(p.scale, 1.0);
        assert_eq!(p.dequantize(p.quantize_i8(0.0) as i32), 0.0);
    }

    #[test]
    fn test_offset_matches_zero_point() {
        let p = QuantizationParams::for_range_i8(-1.0, 3.0);
        assert_eq!(p.offset, -(p.zero_point as f32) * p.scale);
        let q = p.quantize_i8(1.5) as i32;
        assert!((q as f32 * p.scale + p.offset - p.dequantize(q)).abs() < 1e-5);
    }

    #[test]
    fn test_wide_finite_range_keeps_step() {
        let p = QuantizationParams::for_range_i8(-3e38, 3e38);
        assert!(p.scale.is_finite() && p.scale > 1e36, "scale {}", p.scale);
        for x in [-3e38f32, -1e38, 0.0, 1e38, 3e38] {
            let back = p.dequantize(p.quantize_i8(x) as i32);
            assert!((back - x).abs() <= p.scale, "i8 {} -> {} (scale {})", x, back, p.scale);
        }

        let p = QuantizationParams::for_range_u8(-2e38, 3e38);
        for x in [-2e38f32, 0.0, 3e38] {
            let back = p.dequantize(p.quantize_u8(x) as i32);
            assert!((back - x).abs() <= p.scale, "u8 {} -> {} (scale {})", x, back, p.scale);
        }
    }

    #[test]
    fn test_infinite_range_falls_back_to_unit_step() {
        assert_eq!(QuantizationParams::for_range_i8(f32::NEG_INFINITY, 1.0).scale, 1.0);
    }

    #[test]
    fn test_saturation_clamps() {
        let p = QuantizationParams::for_range_i8(-1.0, 1.0);
        assert_eq!(p.quantize_i8(100.0), 127);
        assert_eq!(p.quantize_i8(-100.0), -128);
        let p = QuantizationParams::for_range_u8(-1.0, 1.0);
        assert_eq!(p.quantize_u8(100.0), 255);
        assert_eq!(p.quantize_u8(-100.0), 0);
    }
}
