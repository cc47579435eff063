//! Feature profiling.
//!
//! Classifies each selected feature as categorical or numerical and records
//! the distinct raw values of categorical features so a UI can offer them
//! as choices at prediction time.

use crate::error::{ProcessingError, Result};
use crate::utils::{any_value_to_json, is_numeric_series};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// A column with at most this many distinct values is categorical, whatever
/// its storage type.
pub const CATEGORICAL_THRESHOLD: usize = 5;

/// How a feature is treated by the encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Categorical,
    Numerical,
}

/// Feature name → feature type.
pub type FeatureTypeMap = BTreeMap<String, FeatureType>;

/// Categorical feature name → distinct raw values in first-appearance order.
/// Missing values appear as `null`.
pub type CategoricalValues = BTreeMap<String, Vec<serde_json::Value>>;

/// Result of profiling a feature set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureProfile {
    pub feature_types: FeatureTypeMap,
    pub categorical_values: CategoricalValues,
}

impl FeatureProfile {
    /// Whether `feature` was classified as categorical.
    pub fn is_categorical(&self, feature: &str) -> bool {
        self.feature_types.get(feature) == Some(&FeatureType::Categorical)
    }
}

/// Profiles the selected features of a dataset.
pub struct FeatureProfiler;

impl FeatureProfiler {
    /// Profile `features` of `df`.
    ///
    /// Fails with [`ProcessingError::ColumnNotFound`] if a feature is not a
    /// column of `df`.
    pub fn profile<S: AsRef<str>>(df: &DataFrame, features: &[S]) -> Result<FeatureProfile> {
        let mut profile = FeatureProfile::default();

        for feature in features {
            let name = feature.as_ref();
            let series = df
                .column(name)
                .map_err(|_| ProcessingError::ColumnNotFound(name.to_string()))?
                .as_materialized_series();

            let distinct = series.n_unique()?;
            let feature_type = if !is_numeric_series(series) || distinct <= CATEGORICAL_THRESHOLD {
                FeatureType::Categorical
            } else {
                FeatureType::Numerical
            };

            if feature_type == FeatureType::Categorical {
                profile
                    .categorical_values
                    .insert(name.to_string(), distinct_values(series));
            }
            debug!(feature = name, ?feature_type, distinct, "Profiled feature");
            profile.feature_types.insert(name.to_string(), feature_type);
        }

        Ok(profile)
    }
}

/// Distinct values of `series` in the order they first appear.
fn distinct_values(series: &Series) -> Vec<serde_json::Value> {
    let mut seen = HashSet::new();
    series
        .iter()
        .map(|value| any_value_to_json(&value))
        .filter(|value| seen.insert(value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_string_column_is_categorical() {
        let df = df![
            "city" => [Some("Paris"), Some("Lyon"), None, Some("Paris")],
        ]
        .unwrap();

        let profile = FeatureProfiler::profile(&df, &["city"]).unwrap();
        assert!(profile.is_categorical("city"));
        assert_eq!(
            profile.categorical_values["city"],
            vec![json!("Paris"), json!("Lyon"), json!(null)]
        );
    }

    #[test]
    fn test_low_cardinality_numeric_is_categorical() {
        let df = df![
            "rating" => [1i64, 2, 3, 1, 2, 3, 1],
            "age" => [20i64, 31, 42, 53, 64, 75, 86],
        ]
        .unwrap();

        let profile = FeatureProfiler::profile(&df, &["rating", "age"]).unwrap();
        assert_eq!(profile.feature_types["rating"], FeatureType::Categorical);
        assert_eq!(profile.feature_types["age"], FeatureType::Numerical);
        assert_eq!(
            profile.categorical_values["rating"],
            vec![json!(1), json!(2), json!(3)]
        );
        assert!(!profile.categorical_values.contains_key("age"));
    }

    #[test]
    fn test_threshold_boundary() {
        let five = df!["v" => [1.0, 2.0, 3.0, 4.0, 5.0, 5.0]].unwrap();
        let six = df!["v" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]].unwrap();

        assert!(FeatureProfiler::profile(&five, &["v"]).unwrap().is_categorical("v"));
        assert!(!FeatureProfiler::profile(&six, &["v"]).unwrap().is_categorical("v"));
    }

    #[test]
    fn test_unknown_feature() {
        let df = df!["a" => [1, 2]].unwrap();
        let err = FeatureProfiler::profile(&df, &["b"]).unwrap_err();
        assert!(matches!(err, ProcessingError::ColumnNotFound(ref c) if c == "b"));
    }

    #[test]
    fn test_profile_serializes_lowercase() {
        let df = df!["city" => ["a", "b"]].unwrap();
        let profile = FeatureProfiler::profile(&df, &["city"]).unwrap();
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["feature_types"]["city"], json!("categorical"));
    }
}
