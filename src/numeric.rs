use std::str::FromStr;

/// Which side of an inclusive `[a, b]` interval to select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeMode {
    /// `a <= x <= b`
    Within,
    /// `x < a || x > b`
    Outside,
}

impl FromStr for RangeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "within" => Ok(Self::Within),
            "outside" => Ok(Self::Outside),
            other => Err(format!("unrecognized range option: {other}")),
        }
    }
}

/// Indices of `x` inside (or outside) the closed interval `[a, b]`.
///
/// NaN is never within any interval and never outside one either.
pub fn find_range(x: &[f64], a: f64, b: f64, mode: RangeMode) -> Vec<usize> {
    x.iter()
        .enumerate()
        .filter(|&(_, &v)| match mode {
            RangeMode::Within => v >= a && v <= b,
            RangeMode::Outside => v < a || v > b,
        })
        .map(|(i, _)| i)
        .collect()
}

/// Leaf size below which squares are summed sequentially.
const PAIRWISE_BLOCK: usize = 128;

/// Root mean square, accumulated in single precision.
///
/// Squares are summed pairwise, so rounding error grows with `log n`
/// rather than `n` and long recordings stay accurate in f32.
pub fn rms(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mean_sq = pairwise_sum_sq(data) / data.len() as f32;
    f64::from(mean_sq.sqrt())
}

fn pairwise_sum_sq(data: &[f64]) -> f32 {
    if data.len() <= PAIRWISE_BLOCK {
        return data
            .iter()
            .map(|&v| {
                let v = v as f32;
                v * v
            })
            .sum();
    }
    let (left, right) = data.split_at(data.len() / 2);
    pairwise_sum_sq(left) + pairwise_sum_sq(right)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_range_within_inclusive() {
        let x = [0.5, 1.0, 1.5, 2.0, 2.5];
        assert_eq!(find_range(&x, 1.0, 2.0, RangeMode::Within), vec![1, 2, 3]);
    }

    #[test]
    fn test_find_range_outside() {
        let x = [0.5, 1.0, 1.5, 2.0, 2.5];
        assert_eq!(find_range(&x, 1.0, 2.0, RangeMode::Outside), vec![0, 4]);
    }

    #[test]
    fn test_find_range_nan_excluded() {
        let x = [f64::NAN, 1.5];
        assert_eq!(find_range(&x, 1.0, 2.0, RangeMode::Within), vec![1]);
        assert!(find_range(&x, 1.0, 2.0, RangeMode::Outside).is_empty());
    }

    #[test]
    fn test_range_mode_parse() {
        assert_eq!("within".parse::<RangeMode>(), Ok(RangeMode::Within));
        assert_eq!("outside".parse::<RangeMode>(), Ok(RangeMode::Outside));
        assert!("between".parse::<RangeMode>().is_err());
    }

    #[test]
    fn test_rms() {
        assert!((rms(&[3.0, -3.0, 3.0, -3.0]) - 3.0).abs() < 1e-6);
        assert!((rms(&[1.0, 7.0]) - 5.0).abs() < 1e-6);
        assert!(rms(&[]).is_nan());
    }

    #[test]
    fn test_rms_long_recording_stays_accurate() {
        // Naive f32 accumulation drifts well outside this tolerance
        let data = vec![0.1; 4_000_000];
        assert!((rms(&data) - 0.1).abs() < 1e-4);

        let data: Vec<f64> = (0..1_000_001).map(|i| if i % 2 == 0 { 2.0 } else { -2.0 }).collect();
        assert!((rms(&data) - 2.0).abs() < 1e-4);
    }
}
