//! Feature scaling.
//!
//! Scalers are fitted on the encoded training matrix and remember the names
//! of the columns they were fitted on, so a prediction-time matrix is scaled
//! by column name rather than by position.

use crate::config::ScalerKind;
use crate::error::{Result, TabforgeError};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Standardize to zero mean and unit (population) variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>, columns: &[String]) -> Self {
        let (mean, scale) = x
            .axis_iter(Axis(1))
            .map(|col| {
                let n = col.len().max(1) as f64;
                let mean = col.sum() / n;
                let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                (mean, if std > 0.0 { std } else { 1.0 })
            })
            .unzip();

        Self {
            columns: columns.to_vec(),
            mean,
            scale,
        }
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }
}

/// Rescale each column into `[0, 1]` using the training range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    columns: Vec<String>,
    min: Vec<f64>,
    scale: Vec<f64>,
}

impl MinMaxScaler {
    pub fn fit(x: &Array2<f64>, columns: &[String]) -> Self {
        let (min, scale) = x
            .axis_iter(Axis(1))
            .map(|col| {
                let min = col.iter().copied().fold(f64::INFINITY, f64::min);
                let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let range = max - min;
                let min = if min.is_finite() { min } else { 0.0 };
                (min, if range > 0.0 { 1.0 / range } else { 1.0 })
            })
            .unzip();

        Self {
            columns: columns.to_vec(),
            min,
            scale,
        }
    }
}

/// A fitted scaler of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedScaler {
    Standard(StandardScaler),
    MinMax(MinMaxScaler),
}

impl FittedScaler {
    /// Fit the scaler selected by `kind`, or `None` when no scaling is wanted.
    pub fn fit(kind: ScalerKind, x: &Array2<f64>, columns: &[String]) -> Option<Self> {
        match kind {
            ScalerKind::None => None,
            ScalerKind::Standard => Some(Self::Standard(StandardScaler::fit(x, columns))),
            ScalerKind::MinMax => Some(Self::MinMax(MinMaxScaler::fit(x, columns))),
        }
    }

    /// Names of the columns the scaler was fitted on.
    pub fn columns(&self) -> &[String] {
        match self {
            Self::Standard(s) => &s.columns,
            Self::MinMax(s) => &s.columns,
        }
    }

    /// Check that every fitted column has its statistics.
    ///
    /// # Errors
    ///
    /// [`TabforgeError::InvalidConfig`] when the column list and the
    /// statistic vectors differ in length.
    pub fn check_shape(&self) -> Result<()> {
        let (stats, lengths) = match self {
            Self::Standard(s) => (["mean", "scale"], [s.mean.len(), s.scale.len()]),
            Self::MinMax(s) => (["min", "scale"], [s.min.len(), s.scale.len()]),
        };
        let n_columns = self.columns().len();
        for (stat, len) in stats.into_iter().zip(lengths) {
            if len != n_columns {
                return Err(TabforgeError::InvalidConfig(format!(
                    "scaler has {n_columns} columns but {len} '{stat}' values"
                )));
            }
        }
        Ok(())
    }

    fn apply(&self, idx: usize, value: f64) -> f64 {
        match self {
            Self::Standard(s) => (value - s.mean[idx]) / s.scale[idx],
            Self::MinMax(s) => (value - s.min[idx]) * s.scale[idx],
        }
    }

    /// Scale the columns of `x` that the scaler knows, looked up by name.
    ///
    /// `columns` names the columns of `x`. Columns the scaler was not
    /// fitted on are left as they are.
    ///
    /// # Errors
    ///
    /// [`TabforgeError::ColumnNotFound`] if a fitted column is absent from
    /// `columns`.
    pub fn transform(&self, x: &Array2<f64>, columns: &[String]) -> Result<Array2<f64>> {
        let mut out = x.clone();
        for (idx, name) in self.columns().iter().enumerate() {
            let position = columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| TabforgeError::ColumnNotFound(name.clone()))?;
            out.column_mut(position)
                .mapv_inplace(|v| self.apply(idx, v));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    #[test]
    fn test_standard_scaler() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let scaler = FittedScaler::fit(ScalerKind::Standard, &x, &names(2)).unwrap();

        let scaled = scaler.transform(&x, &names(2)).unwrap();
        assert_eq!(scaled, array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_min_max_scaler() {
        let x = array![[2.0, 7.0], [4.0, 7.0], [3.0, 7.0]];
        let scaler = FittedScaler::fit(ScalerKind::MinMax, &x, &names(2)).unwrap();

        let scaled = scaler.transform(&x, &names(2)).unwrap();
        assert_eq!(scaled, array![[0.0, 0.0], [1.0, 0.0], [0.5, 0.0]]);

        // Values outside the training range are not clipped
        let outside = scaler.transform(&array![[6.0, 8.0]], &names(2)).unwrap();
        assert_eq!(outside, array![[2.0, 1.0]]);
    }

    #[test]
    fn test_no_scaler() {
        let x = array![[1.0]];
        assert!(FittedScaler::fit(ScalerKind::None, &x, &names(1)).is_none());
    }

    #[test]
    fn test_transform_by_name() {
        let x = array![[0.0, 10.0], [2.0, 20.0]];
        let fitted_on = vec!["a".to_string(), "b".to_string()];
        let scaler = FittedScaler::fit(ScalerKind::MinMax, &x, &fitted_on).unwrap();

        // Same columns, different order
        let swapped = array![[20.0, 2.0]];
        let scaled = scaler
            .transform(&swapped, &["b".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(scaled, array![[1.0, 1.0]]);

        let err = scaler.transform(&swapped, &["b".to_string(), "z".to_string()]);
        assert!(matches!(err, Err(TabforgeError::ColumnNotFound(ref c)) if c == "a"));
    }

    #[test]
    fn test_scaler_serde_tag() {
        let x = array![[1.0], [2.0]];
        let scaler = FittedScaler::fit(ScalerKind::Standard, &x, &names(1)).unwrap();
        let json = serde_json::to_value(&scaler).unwrap();
        assert_eq!(json["kind"], "standard");
        let back: FittedScaler = serde_json::from_value(json).unwrap();
        assert_eq!(back, scaler);
    }
}
