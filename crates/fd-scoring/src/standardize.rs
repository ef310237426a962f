//! Standardization utilities for factor values.
//!
//! All cross-sectional standardization is scoped to a peer group. A group is
//! only standardized when it is large enough and the column actually varies;
//! otherwise the values pass through unchanged.

use crate::Result;
use polars::prelude::*;

/// Peer-group z-score standardization.
///
/// For each column, computes z_i = (x_i - mean(x)) / std(x) over the non-null
/// values of the row's group, using the sample standard deviation. A group is
/// left untouched for a column when it has fewer than `min_group_size`
/// non-null values or zero dispersion.
///
/// # Arguments
///
/// * `df` - DataFrame with `group_column` and the value columns
/// * `columns` - Names of the columns to standardize
/// * `group_column` - Column holding the peer group label
/// * `min_group_size` - Minimum non-null values a group needs to be standardized
pub fn peer_standardize(
    df: &DataFrame,
    columns: &[&str],
    group_column: &str,
    min_group_size: usize,
) -> Result<DataFrame> {
    let group = [col(group_column)];
    let exprs: Vec<Expr> = columns
        .iter()
        .map(|name| {
            let valid = col(*name).count().over(group.clone());
            let mean = col(*name).mean().over(group.clone());
            let std_dev = col(*name).std(1).over(group.clone());

            when(
                valid
                    .gt_eq(lit(min_group_size as u32))
                    .and(std_dev.clone().gt(lit(0.0))),
            )
            .then((col(*name) - mean) / std_dev)
            .otherwise(col(*name))
            .alias(*name)
        })
        .collect();

    Ok(df.clone().lazy().with_columns(exprs).collect()?)
}

/// Winsorization for outlier handling.
///
/// Clips extreme values to percentile bounds computed over the whole column.
///
/// # Arguments
///
/// * `df` - DataFrame with the value column
/// * `value_column` - Name of the column to winsorize
/// * `lower_pct` - Lower percentile (e.g., 0.01 for 1st percentile)
/// * `upper_pct` - Upper percentile (e.g., 0.99 for 99th percentile)
pub fn winsorize(
    df: &DataFrame,
    value_column: &str,
    lower_pct: f64,
    upper_pct: f64,
) -> Result<DataFrame> {
    winsorize_columns(df, &[value_column], lower_pct, upper_pct)
}

/// Winsorize several columns at once. Columns absent from `df` are skipped.
pub fn winsorize_columns(
    df: &DataFrame,
    columns: &[&str],
    lower_pct: f64,
    upper_pct: f64,
) -> Result<DataFrame> {
    let schema = df.schema();
    let exprs: Vec<Expr> = columns
        .iter()
        .filter(|name| schema.contains(name))
        .map(|name| {
            let value = col(*name).cast(DataType::Float64);
            let lower = value
                .clone()
                .quantile(lit(lower_pct), QuantileMethod::Linear);
            let upper = value
                .clone()
                .quantile(lit(upper_pct), QuantileMethod::Linear);

            when(value.clone().lt(lower.clone()))
                .then(lower)
                .when(value.clone().gt(upper.clone()))
                .then(upper)
                .otherwise(value)
                .alias(*name)
        })
        .collect();

    if exprs.is_empty() {
        return Ok(df.clone());
    }
    Ok(df.clone().lazy().with_columns(exprs).collect()?)
}

/// Sample mean and standard deviation of the present values.
///
/// Returns `None` with fewer than two values.
pub(crate) fn mean_std(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    let values: Vec<f64> = values.into_iter().collect();
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, var.sqrt()))
}

/// Z-score a cross-section held in memory.
///
/// Missing entries stay missing. When dispersion is degenerate every present
/// entry maps to 0.
pub(crate) fn zscore(values: &[Option<f64>]) -> Vec<Option<f64>> {
    match mean_std(values.iter().flatten().copied()) {
        Some((mean, std_dev)) if std_dev > 0.0 => values
            .iter()
            .map(|v| v.map(|x| (x - mean) / std_dev))
            .collect(),
        _ => values.iter().map(|v| v.map(|_| 0.0)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn group_values(df: &DataFrame, group: &str, column: &str) -> Vec<f64> {
        let groups = df.column("peer_group").unwrap().str().unwrap();
        let values = df.column(column).unwrap().f64().unwrap();
        (0..df.height())
            .filter(|&i| groups.get(i) == Some(group))
            .filter_map(|i| values.get(i))
            .collect()
    }

    #[test]
    fn test_peer_standardize_mean_zero_std_one() {
        let df = df![
            "symbol" => ["A", "B", "C", "D", "E", "F"],
            "peer_group" => ["large_cap"; 6],
            "value" => [Some(1.0), Some(4.0), None, Some(2.0), Some(8.0), Some(5.0)]
        ]
        .unwrap();

        let result = peer_standardize(&df, &["value"], "peer_group", 5).unwrap();
        let z = group_values(&result, "large_cap", "value");
        assert_eq!(z.len(), 5);

        let (mean, std_dev) = mean_std(z).unwrap();
        assert_relative_eq!(mean, 0.0, epsilon = 1e-12);
        assert_relative_eq!(std_dev, 1.0, epsilon = 1e-12);
        assert!(result.column("value").unwrap().f64().unwrap().get(2).is_none());
    }

    #[test]
    fn test_group_of_four_passes_through() {
        let df = df![
            "symbol" => ["A", "B", "C", "D", "E", "F", "G", "H", "I"],
            "peer_group" => ["large_cap", "large_cap", "large_cap", "large_cap",
                             "small_cap", "small_cap", "small_cap", "small_cap", "small_cap"],
            "value" => [1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0, 50.0]
        ]
        .unwrap();

        let result = peer_standardize(&df, &["value"], "peer_group", 5).unwrap();
        assert_eq!(group_values(&result, "large_cap", "value"), vec![1.0, 2.0, 3.0, 4.0]);

        let small = group_values(&result, "small_cap", "value");
        assert_relative_eq!(small[2], 0.0, epsilon = 1e-12);
        assert!(small[4] > 1.0);
    }

    #[test]
    fn test_sparse_column_passes_through() {
        let df = df![
            "symbol" => ["A", "B", "C", "D", "E", "F"],
            "peer_group" => ["large_cap"; 6],
            "four" => [Some(1.0), Some(2.0), Some(6.0), Some(3.0), None, None],
            "five" => [Some(1.0), Some(2.0), Some(6.0), Some(3.0), Some(8.0), None]
        ]
        .unwrap();

        let result = peer_standardize(&df, &["four", "five"], "peer_group", 5).unwrap();
        assert_eq!(group_values(&result, "large_cap", "four"), vec![1.0, 2.0, 6.0, 3.0]);

        let (mean, std_dev) = mean_std(group_values(&result, "large_cap", "five")).unwrap();
        assert_relative_eq!(mean, 0.0, epsilon = 1e-12);
        assert_relative_eq!(std_dev, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_column_passes_through() {
        let df = df![
            "symbol" => ["A", "B", "C", "D", "E"],
            "peer_group" => ["small_cap"; 5],
            "value" => [3.0; 5]
        ]
        .unwrap();

        let result = peer_standardize(&df, &["value"], "peer_group", 5).unwrap();
        assert_eq!(group_values(&result, "small_cap", "value"), vec![3.0; 5]);
    }

    #[test]
    fn test_winsorize_clips_tails() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let df = df![
            "symbol" => vec!["A"; 100],
            "value" => values
        ]
        .unwrap();

        let result = winsorize(&df, "value", 0.01, 0.99).unwrap();
        let clipped = result.column("value").unwrap().f64().unwrap();
        assert_relative_eq!(clipped.get(0).unwrap(), 1.99, epsilon = 1e-9);
        assert_relative_eq!(clipped.get(99).unwrap(), 99.01, epsilon = 1e-9);
        assert_relative_eq!(clipped.get(50).unwrap(), 51.0);
    }

    #[test]
    fn test_winsorize_skips_absent_columns() {
        let df = df!["value" => [1.0, 2.0]].unwrap();
        let result = winsorize_columns(&df, &["missing"], 0.01, 0.99).unwrap();
        assert_eq!(result, df);
    }

    #[test]
    fn test_zscore_degenerate_maps_to_zero() {
        assert_eq!(zscore(&[Some(2.0), None, Some(2.0)]), vec![Some(0.0), None, Some(0.0)]);
        assert_eq!(zscore(&[Some(5.0)]), vec![Some(0.0)]);

        let z = zscore(&[Some(1.0), Some(2.0), Some(3.0)]);
        assert_relative_eq!(z[0].unwrap(), -1.0);
        assert_relative_eq!(z[2].unwrap(), 1.0);
    }
}
