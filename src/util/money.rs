//! Two-decimal balance arithmetic.

/// Round to two decimal places, half away from zero.
///
/// All balances and odds on the wire carry at most two decimals; every
/// mutation funnels through this so floating-point drift never reaches a
/// snapshot.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2_basic() {
        assert_eq!(round2(1.005), 1.0); // 1.005 is stored just below 1.005
        assert_eq!(round2(2.675_001), 2.68);
        assert_eq!(round2(100.0), 100.0);
        assert_eq!(round2(179.999_999), 180.0);
    }

    #[test]
    fn test_round2_negative() {
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(-1.004), -1.0);
    }
}
