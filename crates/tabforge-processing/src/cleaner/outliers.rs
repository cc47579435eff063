//! IQR outlier removal.
//!
//! Rows outside Tukey's fences `[Q1 - 1.5·IQR, Q3 + 1.5·IQR]` are dropped.
//! Columns are handled one after another and each column's quartiles are
//! computed on the rows that survived the previous columns.

use crate::error::Result;
use crate::utils::{quantile_linear, series_f64};
use polars::prelude::*;
use serde::Serialize;
use tracing::debug;

/// Multiplier applied to the interquartile range.
pub const IQR_FACTOR: f64 = 1.5;

/// Inclusive fences for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutlierBounds {
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBounds {
    /// Compute the fences from a column's non-missing values.
    ///
    /// Returns `None` when there are no values.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile_linear(&sorted, 0.25)?;
        let q3 = quantile_linear(&sorted, 0.75)?;
        let iqr = q3 - q1;

        Some(Self {
            lower: q1 - IQR_FACTOR * iqr,
            upper: q3 + IQR_FACTOR * iqr,
        })
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Removes outlier rows from numeric columns.
pub struct OutlierHandler;

impl OutlierHandler {
    /// Drop the rows whose value in `col_name` falls outside its fences.
    ///
    /// Missing values are kept. Returns the number of dropped rows.
    pub fn remove_outliers(
        df: &mut DataFrame,
        col_name: &str,
        processing_steps: &mut Vec<String>,
    ) -> Result<usize> {
        let values = series_f64(df.column(col_name)?.as_materialized_series())?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();

        let Some(bounds) = OutlierBounds::from_values(&present) else {
            debug!(column = col_name, "No values to compute outlier bounds, skipping");
            return Ok(0);
        };

        let mask_values: Vec<bool> = values
            .iter()
            .map(|v| v.is_none_or(|val| bounds.contains(val)))
            .collect();
        let removed = mask_values.iter().filter(|keep| !**keep).count();
        if removed == 0 {
            return Ok(0);
        }

        let mask = BooleanChunked::from_slice("mask".into(), &mask_values);
        *df = df.filter(&mask)?;

        processing_steps.push(format!(
            "Removed {removed} rows with '{col_name}' outside [{:.2}, {:.2}]",
            bounds.lower, bounds.upper
        ));
        debug!(column = col_name, removed, "Removed outlier rows");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bounds_linear_quartiles() {
        let bounds = OutlierBounds::from_values(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        // Q1 = 1.75, Q3 = 3.25, IQR = 1.5
        assert!((bounds.lower - (-0.5)).abs() < 1e-12);
        assert!((bounds.upper - 5.5).abs() < 1e-12);
        assert!(OutlierBounds::from_values(&[]).is_none());
    }

    #[test]
    fn test_remove_outliers() {
        let mut df = df![
            "value" => [1.0, 2.0, 3.0, 4.0, 100.0],
            "label" => ["a", "b", "c", "d", "e"],
        ]
        .unwrap();
        let mut steps = Vec::new();

        let removed = OutlierHandler::remove_outliers(&mut df, "value", &mut steps).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(df.height(), 4);
        assert_eq!(steps.len(), 1);
        let labels: Vec<Option<&str>> = df.column("label").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(labels, vec![Some("a"), Some("b"), Some("c"), Some("d")]);
    }

    #[test]
    fn test_constant_column_keeps_all_rows() {
        let mut df = df!["value" => [7i64, 7, 7]].unwrap();
        let mut steps = Vec::new();

        let removed = OutlierHandler::remove_outliers(&mut df, "value", &mut steps).unwrap();

        assert_eq!(removed, 0);
        assert_eq!(df.height(), 3);
        assert!(steps.is_empty());
    }

    #[test]
    fn test_null_values_are_kept() {
        let mut df = df!["value" => [Some(1.0), None, Some(2.0), Some(3.0)]].unwrap();
        let mut steps = Vec::new();

        OutlierHandler::remove_outliers(&mut df, "value", &mut steps).unwrap();

        assert_eq!(df.height(), 4);
    }

    proptest! {
        #[test]
        fn prop_survivors_within_bounds(values in prop::collection::vec(-1000.0f64..1000.0, 1..60)) {
            let bounds = OutlierBounds::from_values(&values).unwrap();
            let mut df = df!["v" => values.clone()].unwrap();
            let mut steps = Vec::new();

            let removed = OutlierHandler::remove_outliers(&mut df, "v", &mut steps).unwrap();

            let outside = values.iter().filter(|v| !bounds.contains(**v)).count();
            prop_assert_eq!(removed, outside);
            prop_assert_eq!(df.height(), values.len() - outside);

            let kept = series_f64(df.column("v").unwrap().as_materialized_series()).unwrap();
            for v in kept.into_iter().flatten() {
                prop_assert!(bounds.contains(v));
            }
        }
    }
}
