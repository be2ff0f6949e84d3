// --- File: src/converter/rounding.rs ---

//! Decimal rounding applied to every floating point value before emission.

const MAX_EXACT_FRACTION: f64 = 4_503_599_627_370_496.0;

/// Rounds `x` to `places` decimal places, ties going to the even neighbour.
///
/// Values whose scaled form is not finite (huge magnitudes, or a precision
/// beyond what `f64` can express) are returned unchanged, as are NaN and infinities.
pub fn round_half_even(x: f64, places: u32) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let scale = 10f64.powi(i32::try_from(places).unwrap_or(i32::MAX));
    let scaled = x * scale;
    // Beyond 2^52 every f64 is already an integer at this scale.
    if !scale.is_finite() || !scaled.is_finite() || scaled.abs() >= MAX_EXACT_FRACTION {
        return x;
    }
    let rounded = scaled.round_ties_even() / scale;
    // -0.0 would serialize as "-0.0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rounds_to_requested_places() {
        assert_eq!(round_half_even(0.123456789, 6), 0.123457);
        assert_eq!(round_half_even(-1.98765, 2), -1.99);
        assert_eq!(round_half_even(3.7, 0), 4.0);
    }

    #[test]
    fn test_ties_go_to_even() {
        assert_eq!(round_half_even(0.5, 0), 0.0);
        assert_eq!(round_half_even(1.5, 0), 2.0);
        assert_eq!(round_half_even(2.5, 0), 2.0);
        assert_eq!(round_half_even(-2.5, 0), -2.0);
    }

    #[test]
    fn test_widened_f32_is_cleaned_up() {
        let widened = f64::from(0.1f32);
        assert_ne!(widened, 0.1);
        assert_eq!(round_half_even(widened, 6), 0.1);
    }

    #[test]
    fn test_non_finite_and_extreme_values_pass_through() {
        assert!(round_half_even(f64::NAN, 3).is_nan());
        assert_eq!(round_half_even(f64::INFINITY, 3), f64::INFINITY);
        assert_eq!(round_half_even(1e300, 20), 1e300);
        assert_eq!(round_half_even(0.25, 400), 0.25);
        assert_eq!(round_half_even(123456789.123, 10), 123456789.123);
    }

    #[test]
    fn test_negative_zero_is_normalized() {
        let r = round_half_even(-0.0000001, 3);
        assert_eq!(r, 0.0);
        assert!(r.is_sign_positive());
    }

    proptest! {
        #[test]
        fn prop_rounding_is_idempotent(x in -1.0e6_f64..1.0e6, places in 0_u32..10) {
            let once = round_half_even(x, places);
            prop_assert_eq!(round_half_even(once, places), once);
        }

        #[test]
        fn prop_zero_places_gives_integers(x in -1.0e9_f64..1.0e9) {
            let r = round_half_even(x, 0);
            prop_assert_eq!(r.fract(), 0.0);
        }

        #[test]
        fn prop_error_is_bounded(x in -1.0e3_f64..1.0e3, places in 0_u32..8) {
            let r = round_half_even(x, places);
            prop_assert!((r - x).abs() <= 0.5 * 10f64.powi(-(places as i32)) + 1e-9);
        }
    }
}
