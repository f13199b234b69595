//! Order statistics and reporting precision

/// Decimal places kept before rounding down or to nearest, to absorb binary
/// noise such as `0.3 * 100.0 == 30.000000000000004`.
const SNAP_DECIMALS: i32 = 9;

/// Median of the samples; an empty slice yields 0.
pub fn median(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn snap(value: f64, decimals: i32) -> f64 {
    let snap = 10f64.powi(SNAP_DECIMALS);
    (value * 10f64.powi(decimals) * snap).round() / snap
}

/// Round toward positive infinity at `decimals` places. Not snapped: any
/// excess over a step, however small, moves the value up.
pub fn round_up(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).ceil() / scale
}

/// Round toward negative infinity at `decimals` places
pub fn round_down(value: f64, decimals: i32) -> f64 {
    snap(value, decimals).floor() / 10f64.powi(decimals)
}

/// Round half away from zero at `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    snap(value, decimals).round() / 10f64.powi(decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_empty_is_zero() {
        assert!(median(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert!((median(&[3.0]) - 3.0).abs() < f64::EPSILON);
        assert!((median(&[1.0, 2.0, 3.0, 4.0]) - 2.5).abs() < f64::EPSILON);
        assert!((median(&[5.0, 1.0, 3.0]) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_median_ignores_input_order() {
        let forward = median(&[1.0, 4.0, 2.0, 8.0, 5.0, 7.0]);
        let reversed = median(&[7.0, 5.0, 8.0, 2.0, 4.0, 1.0]);
        assert!((forward - reversed).abs() < f64::EPSILON);
        assert!((forward - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_round_up() {
        assert!((round_up(2.01, 1) - 2.1).abs() < 1e-12);
        assert!((round_up(2.5, 1) - 2.5).abs() < 1e-12);
        assert!((round_up(3.0, 1) - 3.0).abs() < 1e-12);
        assert!((round_up(2.000_000_000_01, 1) - 2.1).abs() < 1e-12);
    }

    #[test]
    fn test_round_down() {
        assert!((round_down(99.953_703, 2) - 99.95).abs() < 1e-12);
        assert!((round_down(20.0, 2) - 20.0).abs() < 1e-12);
        assert!((round_down(7.999, 2) - 7.99).abs() < 1e-12);
    }

    #[test]
    fn test_round_down_absorbs_noise() {
        // 0.3 * 100 carries representation noise above 30
        assert!((round_down(0.3 * 100.0, 1) - 30.0).abs() < 1e-12);
        assert!((round_down(0.29 * 100.0, 0) - 29.0).abs() < 1e-12);
    }

    #[test]
    fn test_round_to() {
        assert!((round_to(33.333_333, 1) - 33.3).abs() < 1e-12);
        assert!((round_to(66.666_666, 1) - 66.7).abs() < 1e-12);
    }
}
