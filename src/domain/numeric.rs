//! Numeric sanitisers shared by the calculators.
//!
//! Every calculator routes external numbers through these before doing any
//! arithmetic so that NaN, infinities or impossible negatives never reach
//! persisted state.

/// Returns `value` if it is finite, otherwise `fallback`.
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

/// Returns `value` if it is finite and non-negative, otherwise `fallback`.
pub fn non_negative_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

/// Clamps a finite value into `[lo, hi]`; non-finite values become `lo`.
pub fn clamp_finite(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        lo
    }
}

/// Amount implied by a percent-or-absolute setting against `base`.
pub fn percent_of(base: f64, percent: f64) -> f64 {
    base * percent / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_or_replaces_nan_and_infinity() {
        assert_eq!(finite_or(f64::NAN, 5.0), 5.0);
        assert_eq!(finite_or(f64::INFINITY, 5.0), 5.0);
        assert_eq!(finite_or(-3.0, 5.0), -3.0);
    }

    #[test]
    fn non_negative_or_rejects_negatives() {
        assert_eq!(non_negative_or(-1.0, 50_000.0), 50_000.0);
        assert_eq!(non_negative_or(f64::NEG_INFINITY, 0.0), 0.0);
        assert_eq!(non_negative_or(0.0, 7.0), 0.0);
    }

    #[test]
    fn clamp_finite_bounds() {
        assert_eq!(clamp_finite(150.0, 0.0, 100.0), 100.0);
        assert_eq!(clamp_finite(-5.0, 0.0, 100.0), 0.0);
        assert_eq!(clamp_finite(f64::NAN, 0.0, 100.0), 0.0);
    }
}
