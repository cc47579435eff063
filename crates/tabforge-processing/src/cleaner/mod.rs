//! Dataset cleaning applied before training.
//!
//! Cleaning runs in two passes over every column of the dataset:
//! 1. Missing values are imputed (mean for numeric columns, mode otherwise)
//! 2. Rows holding IQR outliers in any numeric column are dropped
//!
//! The outlier pass is cumulative: each column's fences are computed on the
//! rows left by the previous columns.

mod imputation;
mod outliers;

pub use imputation::StatisticalImputer;
pub use outliers::{IQR_FACTOR, OutlierBounds, OutlierHandler};

use crate::error::{ProcessingError, Result};
use crate::utils::is_numeric_series;
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// What a cleaning run changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub rows_before: usize,
    pub rows_after: usize,
    /// Imputed cells per column (columns without imputation are absent).
    pub imputed_cells: BTreeMap<String, usize>,
    /// Rows dropped as outliers per column.
    pub outlier_rows_dropped: BTreeMap<String, usize>,
    /// Human-readable log of the applied steps.
    pub steps: Vec<String>,
}

impl CleaningReport {
    /// Total number of rows removed.
    pub fn rows_removed(&self) -> usize {
        self.rows_before - self.rows_after
    }
}

/// Imputes missing values and removes outlier rows.
pub struct Cleaner;

impl Cleaner {
    /// Clean `df` and return the cleaned dataset.
    pub fn clean(df: DataFrame) -> Result<DataFrame> {
        Self::clean_with_report(df).map(|(df, _)| df)
    }

    /// Clean `df` and describe what changed.
    pub fn clean_with_report(df: DataFrame) -> Result<(DataFrame, CleaningReport)> {
        let mut df = df;
        let mut report = CleaningReport {
            rows_before: df.height(),
            ..Default::default()
        };

        let columns: Vec<(String, bool)> = df
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), is_numeric_series(c.as_materialized_series())))
            .collect();

        for (name, numeric) in &columns {
            let filled = if *numeric {
                StatisticalImputer::apply_numeric_mean(&mut df, name, &mut report.steps)
            } else {
                StatisticalImputer::apply_mode_imputation(&mut df, name, &mut report.steps)
            }
            .map_err(|e| ProcessingError::CleaningFailed(format!("imputing '{name}': {e}")))?;

            if filled > 0 {
                report.imputed_cells.insert(name.clone(), filled);
            }
        }

        for (name, _) in columns.iter().filter(|(_, numeric)| *numeric) {
            let removed = OutlierHandler::remove_outliers(&mut df, name, &mut report.steps)
                .map_err(|e| {
                    ProcessingError::CleaningFailed(format!("removing outliers in '{name}': {e}"))
                })?;
            if removed > 0 {
                report.outlier_rows_dropped.insert(name.clone(), removed);
            }
        }

        report.rows_after = df.height();
        debug!(steps = ?report.steps, "Cleaning steps");
        info!(
            rows_before = report.rows_before,
            rows_after = report.rows_after,
            imputed_columns = report.imputed_cells.len(),
            "Cleaned dataset"
        );

        Ok((df, report))
    }
}
