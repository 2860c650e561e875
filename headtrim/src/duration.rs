/// Converts a duration in milliseconds to a number of samples at `sample_rate`, rounding half up.
///
/// A zero sample rate yields zero samples, since nothing can be trimmed without a known rate.
/// Negative or NaN durations also saturate to zero.
pub fn samples_from_duration(duration_ms: f64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (0.5 + duration_ms * f64::from(sample_rate) / 1000.0) as u64
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(10.0, 44_100, 441)]
    #[case(0.5, 1_000, 1)]
    #[case(0.49, 1_000, 0)]
    #[case(1.5, 1_000, 2)]
    #[case(1000.0, 48_000, 48_000)]
    #[case(0.0, 96_000, 0)]
    #[case(12.34, 44_100, 544)]
    fn test_samples_from_duration(
        #[case] duration_ms: f64,
        #[case] sample_rate: u32,
        #[case] expected: u64,
    ) {
        assert_eq!(samples_from_duration(duration_ms, sample_rate), expected);
    }

    #[test]
    fn test_zero_rate_trims_nothing() {
        assert_eq!(samples_from_duration(250.0, 0), 0);
    }

    #[test]
    fn test_matches_floor_plus_half() {
        for sample_rate in [8_000u32, 22_050, 44_100, 48_000, 192_000] {
            for tenths in 1..200u32 {
                let duration_ms = f64::from(tenths) / 10.0;
                let expected =
                    (duration_ms * f64::from(sample_rate) / 1000.0 + 0.5).floor() as u64;
                assert_eq!(samples_from_duration(duration_ms, sample_rate), expected);
            }
        }
    }
}
