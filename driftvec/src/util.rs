pub static EOS: &str = "</s>";

/// Tolerance for small negative values.
const NEGATIVE_TOLERANCE: f32 = 1e-5;

/// The logistic function 1 / (1 + e^-x).
#[inline]
pub fn logistic(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Add a small value, to prevent returning Inf on underflow.
#[inline]
pub fn safe_ln(v: f32) -> f32 {
    (v + NEGATIVE_TOLERANCE).ln()
}

/// Compare two float slices for bitwise equality.
pub(crate) fn bits_eq(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

#[cfg(test)]
pub use self::test::*;

#[cfg(test)]
mod test {
    use super::{logistic, safe_ln};

    pub fn close(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() <= eps
    }

    pub fn all_close(a: &[f32], b: &[f32], eps: f32) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(&av, &bv)| close(av, bv, eps))
    }

    #[test]
    fn logistic_test() {
        assert!(close(logistic(0.0), 0.5, 1e-6));
        assert!(close(logistic(2.0), 0.8807971, 1e-6));
        assert!(close(logistic(-2.0), 1.0 - 0.8807971, 1e-6));
    }

    #[test]
    fn safe_ln_zero_is_finite() {
        assert!(safe_ln(0.0).is_finite());
    }
}
