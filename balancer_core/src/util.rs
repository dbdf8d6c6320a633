//! Fixed-point helpers for balancer_core.

/// Quantize a floating-point volts value to integer millivolts, rounding to
/// nearest and clamping to the i32 range. Non-finite values (NaN/±Inf) map to 0.
#[inline]
pub fn quantize_to_mv_i32(v: f32) -> i32 {
    quantize_milli(v)
}

/// Quantize a floating-point amps value to integer milliamps, rounding to
/// nearest and clamping to the i32 range. Non-finite values (NaN/±Inf) map to 0.
#[inline]
pub fn quantize_to_ma_i32(a: f32) -> i32 {
    quantize_milli(a)
}

#[inline]
fn quantize_milli(x: f32) -> i32 {
    if !x.is_finite() {
        return 0;
    }
    let scaled = (x * 1000.0).round();
    if scaled >= i32::MAX as f32 {
        i32::MAX
    } else if scaled <= i32::MIN as f32 {
        i32::MIN
    } else {
        scaled as i32
    }
}

/// Half of a non-negative tolerance, rounded up. Keeps the OFF→ON threshold
/// strictly above the stay-ON threshold even for a tolerance of 1.
#[inline]
pub fn half_round_up(margin: i32) -> i32 {
    debug_assert!(margin >= 0, "half_round_up: negative tolerance {margin}");
    (margin + 1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantizes_volts_to_millivolts() {
        assert_eq!(quantize_to_mv_i32(4.2), 4200);
        assert_eq!(quantize_to_mv_i32(0.0105), 11); // rounds to nearest
        assert_eq!(quantize_to_mv_i32(-0.02), -20);
    }

    #[test]
    fn non_finite_maps_to_zero() {
        assert_eq!(quantize_to_mv_i32(f32::NAN), 0);
        assert_eq!(quantize_to_ma_i32(f32::INFINITY), 0);
    }

    #[test]
    fn clamps_extremes() {
        assert_eq!(quantize_to_ma_i32(1e12), i32::MAX);
        assert_eq!(quantize_to_ma_i32(-1e12), i32::MIN);
    }

    #[test]
    fn half_round_up_is_ceiling() {
        assert_eq!(half_round_up(0), 0);
        assert_eq!(half_round_up(1), 1);
        assert_eq!(half_round_up(20), 10);
        assert_eq!(half_round_up(21), 11);
    }
}
