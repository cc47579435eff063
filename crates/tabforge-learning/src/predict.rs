//! Single-record prediction.
//!
//! [`PredictionPipeline::predict`] replays the training-time preprocessing on
//! one record: numeric-string coercion, encoding, scaling, the estimator and
//! finally the inverse target encoding. Nothing is refitted.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabforge_learning::{FittedArtifacts, PredictionPipeline, Scalar};
//!
//! let artifacts = FittedArtifacts::load("model.json")?;
//! let prediction = PredictionPipeline::predict(
//!     &artifacts,
//!     &[Scalar::from(35.0), Scalar::from("Paris")],
//!     &["age".to_string(), "city".to_string()],
//! )?;
//! println!("{prediction}");
//! ```

use crate::artifacts::FittedArtifacts;
use crate::config::ProblemType;
use crate::encoding::{FeatureColumn, FeatureTable};
use crate::error::{Result, TabforgeError};
use crate::metrics::round2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tabforge_processing::parse_numeric_string;
use tracing::{debug, error};

/// One raw input value.
///
/// Deserializes untagged, so JSON `35`, `"Paris"` and `null` map directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
    Missing,
}

impl Scalar {
    /// Read a command-line value: empty means missing, anything else is
    /// text (numeric strings are coerced later).
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Self::Missing
        } else {
            Self::Text(raw.to_string())
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Missing, Into::into)
    }
}

/// A prediction: a class name for text targets, a number otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Number(f64),
    Label(String),
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Label(s) => f.write_str(s),
        }
    }
}

/// Runs fitted artifacts on new records.
pub struct PredictionPipeline;

impl PredictionPipeline {
    /// Predict the target for one record.
    ///
    /// `values[i]` is the value of column `column_order[i]`; the columns must
    /// be exactly the training features, in any order.
    ///
    /// # Errors
    ///
    /// Every failure is returned as [`TabforgeError::PredictionFailed`] with
    /// the cause as its source:
    /// - [`ColumnCountMismatch`](TabforgeError::ColumnCountMismatch) when
    ///   the value and column counts disagree
    /// - [`ColumnNotFound`](TabforgeError::ColumnNotFound) for a column the
    ///   model was not trained on
    /// - [`MissingRequiredValue`](TabforgeError::MissingRequiredValue) for a
    ///   missing value or an absent feature
    /// - [`InvalidValue`](TabforgeError::InvalidValue) for text in a
    ///   numeric feature
    pub fn predict(
        artifacts: &FittedArtifacts,
        values: &[Scalar],
        column_order: &[String],
    ) -> Result<Prediction> {
        Self::run(artifacts, values, column_order).map_err(|e| {
            error!(error = %e, code = e.error_code(), "Prediction failed");
            TabforgeError::prediction_failed(e)
        })
    }

    /// Predict from a column → value record.
    pub fn predict_record(
        artifacts: &FittedArtifacts,
        record: &BTreeMap<String, Scalar>,
    ) -> Result<Prediction> {
        let (columns, values): (Vec<String>, Vec<Scalar>) =
            record.iter().map(|(k, v)| (k.clone(), v.clone())).unzip();
        Self::predict(artifacts, &values, &columns)
    }

    fn run(
        artifacts: &FittedArtifacts,
        values: &[Scalar],
        column_order: &[String],
    ) -> Result<Prediction> {
        if values.len() != column_order.len() {
            return Err(TabforgeError::ColumnCountMismatch {
                expected: column_order.len(),
                actual: values.len(),
            });
        }

        let features = artifacts.features();
        if let Some(unknown) = column_order.iter().find(|c| !features.contains(c)) {
            return Err(TabforgeError::ColumnNotFound(unknown.clone()));
        }
        if column_order.len() != features.len() {
            return Err(TabforgeError::ColumnCountMismatch {
                expected: features.len(),
                actual: column_order.len(),
            });
        }

        let table = Self::single_row(features, values, column_order)?;
        let mut x = artifacts.feature_encoder().transform(&table)?;
        if let Some(scaler) = artifacts.scaler() {
            x = scaler.transform(&x, &artifacts.feature_encoder().output_names())?;
        }

        let raw = artifacts.model().predict(&x)[0];
        debug!(raw, model = %artifacts.model_kind(), "Raw prediction");

        match artifacts.target_encoder() {
            Some(encoder) => {
                let label = (raw >= 0.0 && raw.fract() == 0.0)
                    .then(|| encoder.inverse_transform_one(raw as usize))
                    .flatten()
                    .ok_or_else(|| TabforgeError::InvalidValue {
                        column: artifacts.target().to_string(),
                        value: raw.to_string(),
                        reason: "not a known class code".to_string(),
                    })?;
                Ok(Prediction::Label(label.to_string()))
            }
            None => match artifacts.problem_type() {
                ProblemType::Regression => Ok(Prediction::Number(round2(raw))),
                ProblemType::Classification => Ok(Prediction::Number(raw)),
            },
        }
    }

    /// Lay the values out in training feature order, coercing numeric
    /// strings.
    fn single_row(
        features: &[String],
        values: &[Scalar],
        column_order: &[String],
    ) -> Result<FeatureTable> {
        let columns = features
            .iter()
            .map(|feature| {
                let value = column_order
                    .iter()
                    .position(|c| c == feature)
                    .map(|idx| &values[idx])
                    .ok_or_else(|| TabforgeError::MissingRequiredValue(feature.clone()))?;

                match value {
                    Scalar::Number(v) if v.is_finite() => Ok(FeatureColumn::Numeric(vec![*v])),
                    Scalar::Number(_) | Scalar::Missing => {
                        Err(TabforgeError::MissingRequiredValue(feature.clone()))
                    }
                    Scalar::Text(s) if s.trim().is_empty() => {
                        Err(TabforgeError::MissingRequiredValue(feature.clone()))
                    }
                    Scalar::Text(s) => Ok(match parse_numeric_string(s) {
                        Some(v) => FeatureColumn::Numeric(vec![v]),
                        None => FeatureColumn::Text(vec![s.trim().to_string()]),
                    }),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        FeatureTable::new(features.to_vec(), columns)
    }
}

impl FittedArtifacts {
    /// Shorthand for [`PredictionPipeline::predict`].
    pub fn predict(&self, values: &[Scalar], column_order: &[String]) -> Result<Prediction> {
        PredictionPipeline::predict(self, values, column_order)
    }
}
