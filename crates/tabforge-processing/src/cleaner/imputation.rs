//! Missing-value imputation.
//!
//! Numeric columns are filled with their mean, every other column with its
//! most frequent value.

use crate::error::{Result, ResultExt};
use crate::utils::{fill_numeric_nulls, fill_string_nulls, string_mode};
use polars::prelude::*;
use tracing::debug;

/// Statistical imputation for filling missing values.
pub struct StatisticalImputer;

impl StatisticalImputer {
    /// Fill a numeric column with its mean.
    ///
    /// Returns the number of filled cells. Columns without nulls are left
    /// untouched (and keep their integer dtype); columns with no values at
    /// all cannot be filled and are skipped.
    pub fn apply_numeric_mean(
        df: &mut DataFrame,
        col_name: &str,
        processing_steps: &mut Vec<String>,
    ) -> Result<usize> {
        let series = df.column(col_name)?.as_materialized_series().clone();
        let missing = series.null_count();
        if missing == 0 {
            return Ok(0);
        }

        let Some(mean_val) = series.mean() else {
            debug!(column = col_name, "Column is entirely missing, skipping imputation");
            return Ok(0);
        };

        let filled = fill_numeric_nulls(&series, mean_val)
            .context(format!("While filling '{col_name}' with its mean"))?;
        df.replace(col_name, filled)?;

        processing_steps.push(format!(
            "Filled {missing} missing values in '{col_name}' with mean: {mean_val:.2}"
        ));
        Ok(missing)
    }

    /// Fill a non-numeric column with its most frequent value.
    pub fn apply_mode_imputation(
        df: &mut DataFrame,
        col_name: &str,
        processing_steps: &mut Vec<String>,
    ) -> Result<usize> {
        let series = df.column(col_name)?.as_materialized_series().clone();
        let missing = series.null_count();
        if missing == 0 {
            return Ok(0);
        }

        let Some(mode_val) = string_mode(&series) else {
            debug!(column = col_name, "Column is entirely missing, skipping imputation");
            return Ok(0);
        };

        let filled = fill_string_nulls(&series, &mode_val)
            .context(format!("While filling '{col_name}' with its mode"))?;
        df.replace(col_name, filled)?;

        processing_steps.push(format!(
            "Filled {missing} missing values in '{col_name}' with mode: '{mode_val}'"
        ));
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_numeric_mean() {
        let mut df = df![
            "values" => [Some(1.0), None, Some(3.0), None, Some(5.0)],
        ]
        .unwrap();
        let mut steps = Vec::new();

        let filled = StatisticalImputer::apply_numeric_mean(&mut df, "values", &mut steps).unwrap();

        assert_eq!(filled, 2);
        let values = df.column("values").unwrap();
        assert_eq!(values.null_count(), 0);
        assert_eq!(values.get(1).unwrap().try_extract::<f64>().unwrap(), 3.0);
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn test_integer_column_without_nulls_keeps_dtype() {
        let mut df = df!["n" => [1i64, 2, 3]].unwrap();
        let mut steps = Vec::new();

        let filled = StatisticalImputer::apply_numeric_mean(&mut df, "n", &mut steps).unwrap();

        assert_eq!(filled, 0);
        assert_eq!(df.column("n").unwrap().dtype(), &DataType::Int64);
        assert!(steps.is_empty());
    }

    #[test]
    fn test_integer_column_mean_skips_nulls() {
        let mut df = df!["age" => [Some(20i64), None, Some(31), Some(42)]].unwrap();
        let mut steps = Vec::new();

        let filled = StatisticalImputer::apply_numeric_mean(&mut df, "age", &mut steps).unwrap();

        assert_eq!(filled, 1);
        let age = df.column("age").unwrap();
        assert_eq!(age.get(1).unwrap().try_extract::<f64>().unwrap(), 31.0);
        assert!(steps[0].contains("31.00"));
    }

    #[test]
    fn test_all_null_column_is_skipped() {
        let mut df = df!["empty" => [Option::<f64>::None, None]].unwrap();
        let mut steps = Vec::new();

        let filled = StatisticalImputer::apply_numeric_mean(&mut df, "empty", &mut steps).unwrap();

        assert_eq!(filled, 0);
        assert_eq!(df.column("empty").unwrap().null_count(), 2);
    }

    #[test]
    fn test_apply_mode_imputation() {
        let mut df = df![
            "city" => [Some("Lyon"), None, Some("Nice"), Some("Lyon")],
        ]
        .unwrap();
        let mut steps = Vec::new();

        let filled = StatisticalImputer::apply_mode_imputation(&mut df, "city", &mut steps).unwrap();

        assert_eq!(filled, 1);
        let city = df.column("city").unwrap();
        assert_eq!(city.null_count(), 0);
        assert_eq!(city.str().unwrap().get(1), Some("Lyon"));
    }

    #[test]
    fn test_mode_tie_picks_smallest() {
        let mut df = df![
            "c" => [Some("b"), Some("a"), None, Some("b"), Some("a")],
        ]
        .unwrap();
        let mut steps = Vec::new();

        StatisticalImputer::apply_mode_imputation(&mut df, "c", &mut steps).unwrap();

        assert_eq!(df.column("c").unwrap().str().unwrap().get(2), Some("a"));
    }
}
