//! Calendar-dependent growth horizons.
//!
//! Growth horizons widen as more history becomes available: three years back
//! through 2021, three and four in 2022, and three to five from 2023 onward.

/// Earliest year each growth horizon becomes active, in horizon order.
const GROWTH_HORIZON_START: [(u32, i32); 3] = [(3, i32::MIN), (4, 2022), (5, 2023)];

/// Ordered growth horizons (years back) active in `year`.
pub fn growth_horizons(year: i32) -> Vec<u32> {
    GROWTH_HORIZON_START
        .iter()
        .filter(|(_, from)| year >= *from)
        .map(|(years, _)| *years)
        .collect()
}

/// Longest growth horizon active in `year`.
pub fn max_growth_horizon(year: i32) -> u32 {
    growth_horizons(year).into_iter().max().unwrap_or(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(2019, vec![3])]
    #[case(2021, vec![3])]
    #[case(2022, vec![3, 4])]
    #[case(2023, vec![3, 4, 5])]
    #[case(2030, vec![3, 4, 5])]
    fn test_growth_horizons_by_year(#[case] year: i32, #[case] expected: Vec<u32>) {
        assert_eq!(growth_horizons(year), expected);
    }

    #[test]
    fn test_max_horizon() {
        assert_eq!(max_growth_horizon(2021), 3);
        assert_eq!(max_growth_horizon(2022), 4);
        assert_eq!(max_growth_horizon(2024), 5);
    }
}
