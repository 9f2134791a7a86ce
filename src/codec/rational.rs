//! Best rational approximation of floating point values.

/// Largest numerator or denominator for signed rationals.
pub const MAX_SIGNED: i64 = 0x7fff_ffff;

/// Largest numerator or denominator for unsigned rationals.
pub const MAX_UNSIGNED: i64 = 0xffff_ffff;

/// Relative error at which the expansion stops.
const TOLERANCE: f64 = 1e-8;

/// Approximate `x` as `numerator / denominator` with both parts bounded by
/// `0x7fffffff`.
///
/// `0` maps to `(0, 1)`; the sign of a negative input is carried by the
/// numerator.
pub fn rationalize(x: f64) -> (i64, i64) {
    rationalize_bounded(x, MAX_SIGNED)
}

/// Approximate `x` with numerator and denominator bounded by `max`.
///
/// Continued-fraction expansion: the partial quotients are kept on a stack
/// and the fraction is re-evaluated from the bottom of the stack after every
/// new quotient. The expansion stops at the last pair that fits the bound or
/// once the relative error falls under `1e-8`.
///
/// Infinities map to `(±1, 0)` and NaN to `(0, 0)`. Magnitudes above `max`
/// clamp to `(±max, 1)`.
pub fn rationalize_bounded(x: f64, max: i64) -> (i64, i64) {
    if x.is_nan() {
        return (0, 0);
    }
    if x.is_infinite() {
        return (if x > 0.0 { 1 } else { -1 }, 0);
    }
    if x == 0.0 {
        return (0, 1);
    }

    let sign = if x < 0.0 { -1 } else { 1 };
    let val = x.abs();
    if val > max as f64 {
        return (sign * max, 1);
    }

    let mut quotients: Vec<i64> = Vec::new();
    let mut best = (0i64, 1i64);
    let mut frac = val;

    loop {
        let q = frac.floor();
        if q > max as f64 {
            break;
        }
        quotients.push(q as i64);

        let Some((num, den)) = evaluate(&quotients, max) else {
            break;
        };
        best = (num, den);

        let rem = frac - q;
        if rem == 0.0 || ((num as f64 / den as f64 - val) / val).abs() < TOLERANCE {
            break;
        }
        frac = 1.0 / rem;
        if !frac.is_finite() {
            break;
        }
    }

    (sign * best.0, best.1)
}

/// Fold the quotient stack into `(n, d)`, or `None` once either exceeds `max`.
fn evaluate(quotients: &[i64], max: i64) -> Option<(i64, i64)> {
    let (mut num, mut den) = (1i64, 0i64);
    for &q in quotients.iter().rev() {
        let next = q.checked_mul(num)?.checked_add(den)?;
        den = num;
        num = next;
    }
    (num <= max && den <= max).then_some((num, den))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel_err(x: f64, (n, d): (i64, i64)) -> f64 {
        ((n as f64 / d as f64) - x).abs() / x.abs()
    }

    #[test]
    fn test_zero() {
        assert_eq!(rationalize(0.0), (0, 1));
        assert_eq!(rationalize(-0.0), (0, 1));
    }

    #[test]
    fn test_one_tenth() {
        let r = rationalize(0.1);
        assert_eq!(r, (1, 10));
        assert!(rel_err(0.1, r) < 1e-8);
    }

    #[test]
    fn test_negative() {
        assert_eq!(rationalize(-2.5), (-5, 2));
    }

    #[test]
    fn test_integers() {
        assert_eq!(rationalize(72.0), (72, 1));
        assert_eq!(rationalize(-3.0), (-3, 1));
    }

    #[test]
    fn test_irrational_respects_bound() {
        let r = rationalize(std::f64::consts::PI);
        assert!(r.0 <= MAX_SIGNED && r.1 <= MAX_SIGNED);
        assert!(rel_err(std::f64::consts::PI, r) < 1e-8);
    }

    #[test]
    fn test_tiny_value_collapses() {
        assert_eq!(rationalize(1e-12), (0, 1));
    }

    #[test]
    fn test_huge_value_clamps() {
        assert_eq!(rationalize(1e12), (MAX_SIGNED, 1));
        assert_eq!(rationalize(-1e12), (-MAX_SIGNED, 1));
    }

    #[test]
    fn test_non_finite() {
        assert_eq!(rationalize(f64::INFINITY), (1, 0));
        assert_eq!(rationalize(f64::NEG_INFINITY), (-1, 0));
        assert_eq!(rationalize(f64::NAN), (0, 0));
    }

    #[test]
    fn test_unsigned_bound() {
        let r = rationalize_bounded(3_000_000_000.5, MAX_UNSIGNED);
        assert!(r.0 <= MAX_UNSIGNED);
        assert!(rel_err(3_000_000_000.5, r) < 1e-8);
    }

    #[test]
    fn test_deterministic() {
        for x in [0.3333, 1.0 / 3.0, 2.0_f64.sqrt(), 1234.5678] {
            assert_eq!(rationalize(x), rationalize(x));
        }
    }
}
