//! R missing-value sentinels.
//!
//! R encodes missingness inside the payload of each vector type rather
//! than in a side mask. Integer and logical vectors use the minimum i32,
//! real vectors use a specific quiet NaN, and character vectors use the
//! `R_NaString` CHARSXP singleton.

/// The NA sentinel for integer vectors (`NA_integer_`).
pub const NA_INTEGER: i32 = i32::MIN;

/// The NA sentinel for logical vectors (`NA`).
pub const NA_LOGICAL: i32 = i32::MIN;

/// Bit pattern of `NA_real_`: a quiet NaN with 1954 in the low payload
/// bits. 1954 is the year of Ross Ihaka's birth, a fixed constant in R's
/// arithmetic.c.
const NA_REAL_BITS: u64 = 0x7FF0_0000_0000_07A2;

/// The NA sentinel for real vectors (`NA_real_`).
pub fn na_real() -> f64 {
    f64::from_bits(NA_REAL_BITS)
}

/// Whether `x` is `NA_real_`, as opposed to an ordinary NaN.
///
/// NaN comparison is always false, so NA-ness of a double must be decided
/// on the exact bit pattern.
pub fn is_na_real(x: f64) -> bool {
    x.to_bits() == NA_REAL_BITS
}

/// Whether `x` is the integer NA sentinel.
pub fn is_na_integer(x: i32) -> bool {
    x == NA_INTEGER
}

/// Whether `x` is the logical NA sentinel.
pub fn is_na_logical(x: i32) -> bool {
    x == NA_LOGICAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn na_real_is_a_nan_but_not_every_nan_is_na() {
        assert!(na_real().is_nan());
        assert!(is_na_real(na_real()));
        assert!(!is_na_real(f64::NAN));
        assert!(!is_na_real(0.0));
        assert!(!is_na_real(f64::INFINITY));
    }

    #[test]
    fn na_real_survives_a_copy() {
        let copied = na_real();
        assert!(is_na_real(copied));
        // Direct float comparison can never identify NA
        assert_ne!(copied, na_real());
    }

    #[test]
    fn integer_and_logical_sentinels() {
        assert!(is_na_integer(i32::MIN));
        assert!(!is_na_integer(0));
        assert!(!is_na_integer(i32::MIN + 1));
        assert!(is_na_logical(NA_LOGICAL));
        assert!(!is_na_logical(1));
        assert!(!is_na_logical(0));
    }
}
