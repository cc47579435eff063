//! Categorical encoding.
//!
//! Text features are turned into numbers in one of two modes:
//! - **Per column**: one [`LabelEncoder`] per text feature, the encoded
//!   column replaces the original in place.
//! - **Joint**: a single [`OneHotEncoder`] over all text features; the
//!   output is the numeric features (in feature order) followed by the
//!   indicator block.
//!
//! Numeric features are never encoded, even when profiling classified them
//! as categorical because of their low cardinality.

use crate::config::EncoderKind;
use crate::error::{Result, TabforgeError};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tabforge_processing::utils::{is_numeric_series, series_categories, series_f64};
use tabforge_processing::format_category;

// =============================================================================
// Feature table
// =============================================================================

/// One feature's values, either numbers or canonical category strings.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureColumn {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl FeatureColumn {
    fn len(&self) -> usize {
        match self {
            FeatureColumn::Numeric(values) => values.len(),
            FeatureColumn::Text(values) => values.len(),
        }
    }

    fn select(&self, rows: &[usize]) -> Self {
        match self {
            FeatureColumn::Numeric(values) => {
                FeatureColumn::Numeric(rows.iter().map(|&r| values[r]).collect())
            }
            FeatureColumn::Text(values) => {
                FeatureColumn::Text(rows.iter().map(|&r| values[r].clone()).collect())
            }
        }
    }
}

/// The selected features of a dataset, column by column, with no missing
/// values.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    names: Vec<String>,
    columns: Vec<FeatureColumn>,
    n_rows: usize,
}

impl FeatureTable {
    /// Build a table from named columns of equal length.
    pub fn new(names: Vec<String>, columns: Vec<FeatureColumn>) -> Result<Self> {
        let n_rows = columns.first().map_or(0, FeatureColumn::len);
        if names.len() != columns.len() || columns.iter().any(|c| c.len() != n_rows) {
            return Err(TabforgeError::InvalidConfig(
                "feature columns must all have the same length".to_string(),
            ));
        }
        Ok(Self {
            names,
            columns,
            n_rows,
        })
    }

    /// Extract `features` from a cleaned data frame.
    ///
    /// Numeric columns become [`FeatureColumn::Numeric`], everything else
    /// [`FeatureColumn::Text`].
    pub fn from_frame(df: &DataFrame, features: &[String]) -> Result<Self> {
        let columns = features
            .iter()
            .map(|name| {
                let series = df
                    .column(name)
                    .map_err(|_| TabforgeError::ColumnNotFound(name.clone()))?
                    .as_materialized_series();
                if is_numeric_series(series) {
                    series_f64(series)?
                        .into_iter()
                        .map(|v| v.ok_or_else(|| missing_after_cleaning(name)))
                        .collect::<Result<Vec<_>>>()
                        .map(FeatureColumn::Numeric)
                } else {
                    series_categories(series)?
                        .into_iter()
                        .map(|v| v.ok_or_else(|| missing_after_cleaning(name)))
                        .collect::<Result<Vec<_>>>()
                        .map(FeatureColumn::Text)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(features.to_vec(), columns)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.columns[idx])
    }

    /// Names of the text features.
    pub fn text_features(&self) -> Vec<String> {
        self.names
            .iter()
            .zip(&self.columns)
            .filter(|(_, c)| matches!(c, FeatureColumn::Text(_)))
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Keep only `rows`, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
            n_rows: rows.len(),
        }
    }
}

fn missing_after_cleaning(column: &str) -> TabforgeError {
    TabforgeError::InvalidConfig(format!(
        "column '{column}' has no values to impute missing entries from"
    ))
}

// =============================================================================
// Label encoder
// =============================================================================

/// Maps categories to integer codes in sorted order.
///
/// Categories not seen during fitting map to `classes.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on the distinct values of `values`.
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = values
            .into_iter()
            .map(|v| v.as_ref().to_string())
            .collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    /// The fitted classes, sorted ascending.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Code of `value`, or `classes.len()` if it was never seen.
    pub fn transform_one(&self, value: &str) -> usize {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .unwrap_or(self.classes.len())
    }

    pub fn transform<S: AsRef<str>>(&self, values: &[S]) -> Vec<usize> {
        values
            .iter()
            .map(|v| self.transform_one(v.as_ref()))
            .collect()
    }

    /// Class for `code`, or `None` for the unknown code and beyond.
    pub fn inverse_transform_one(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }
}

// =============================================================================
// One-hot encoder
// =============================================================================

/// Categories of one feature inside a [`OneHotEncoder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotColumn {
    pub feature: String,
    pub categories: Vec<String>,
}

/// Joint indicator encoding of several text features.
///
/// Unknown categories produce an all-zero block for their feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    columns: Vec<OneHotColumn>,
}

impl OneHotEncoder {
    /// Fit on `(feature, values)` pairs. Categories are sorted per feature.
    pub fn fit<'a>(columns: impl IntoIterator<Item = (&'a str, &'a [String])>) -> Self {
        let columns = columns
            .into_iter()
            .map(|(feature, values)| OneHotColumn {
                feature: feature.to_string(),
                categories: LabelEncoder::fit(values).classes,
            })
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[OneHotColumn] {
        &self.columns
    }

    /// Number of indicator columns produced.
    pub fn width(&self) -> usize {
        self.columns.iter().map(|c| c.categories.len()).sum()
    }

    /// Indicator column names, `"{feature}_{category}"`.
    pub fn output_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(|c| {
                c.categories
                    .iter()
                    .map(move |cat| format!("{}_{}", c.feature, cat))
            })
            .collect()
    }

    /// Write the indicator block for one row into `out`.
    ///
    /// `values` holds one category per encoder column, in encoder order.
    fn encode_row(&self, values: &[&str], out: &mut [f64]) {
        let mut offset = 0;
        for (column, value) in self.columns.iter().zip(values) {
            if let Ok(idx) = column
                .categories
                .binary_search_by(|c| c.as_str().cmp(value))
            {
                out[offset + idx] = 1.0;
            }
            offset += column.categories.len();
        }
    }
}

// =============================================================================
// Feature encoder
// =============================================================================

/// How the text features are encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "fitted", rename_all = "snake_case")]
pub enum EncodingMode {
    /// Every feature is numeric; values pass through.
    Passthrough,
    /// One label encoder per text feature.
    PerColumn(BTreeMap<String, LabelEncoder>),
    /// One joint one-hot encoder over all text features.
    Joint(OneHotEncoder),
}

/// Fitted feature encoding, replayable on new rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    features: Vec<String>,
    mode: EncodingMode,
}

impl FeatureEncoder {
    /// Fit the encoder selected by `kind` on the training rows.
    ///
    /// # Errors
    ///
    /// [`TabforgeError::InvalidConfig`] if `kind` is [`EncoderKind::None`]
    /// and some features hold text.
    pub fn fit(kind: EncoderKind, train: &FeatureTable) -> Result<Self> {
        let text_features = train.text_features();

        let mode = match kind {
            EncoderKind::None if text_features.is_empty() => EncodingMode::Passthrough,
            EncoderKind::None => {
                return Err(TabforgeError::InvalidConfig(format!(
                    "features {text_features:?} contain text and need an encoder"
                )));
            }
            EncoderKind::Label => EncodingMode::PerColumn(
                text_features
                    .iter()
                    .filter_map(|name| match train.column(name) {
                        Some(FeatureColumn::Text(values)) => {
                            Some((name.clone(), LabelEncoder::fit(values)))
                        }
                        _ => None,
                    })
                    .collect(),
            ),
            EncoderKind::OneHot => EncodingMode::Joint(OneHotEncoder::fit(
                text_features.iter().filter_map(|name| match train.column(name) {
                    Some(FeatureColumn::Text(values)) => Some((name.as_str(), values.as_slice())),
                    _ => None,
                }),
            )),
        };

        Ok(Self {
            features: train.names().to_vec(),
            mode,
        })
    }

    pub fn mode(&self) -> &EncodingMode {
        &self.mode
    }

    /// The features the encoder was fitted on, in input order.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Whether `feature` is encoded as text.
    pub fn is_text_feature(&self, feature: &str) -> bool {
        match &self.mode {
            EncodingMode::Passthrough => false,
            EncodingMode::PerColumn(encoders) => encoders.contains_key(feature),
            EncodingMode::Joint(encoder) => encoder.columns.iter().any(|c| c.feature == feature),
        }
    }

    fn numeric_features(&self) -> impl Iterator<Item = &String> {
        self.features.iter().filter(|f| !self.is_text_feature(f))
    }

    /// Names of the encoded output columns.
    pub fn output_names(&self) -> Vec<String> {
        match &self.mode {
            EncodingMode::Passthrough | EncodingMode::PerColumn(_) => self.features.clone(),
            EncodingMode::Joint(encoder) => self
                .numeric_features()
                .cloned()
                .chain(encoder.output_names())
                .collect(),
        }
    }

    /// For every output column, the index of the feature it came from.
    pub fn source_feature_indices(&self) -> Vec<usize> {
        let index_of = |name: &str| self.features.iter().position(|f| f == name).unwrap_or(0);
        match &self.mode {
            EncodingMode::Passthrough | EncodingMode::PerColumn(_) => {
                (0..self.features.len()).collect()
            }
            EncodingMode::Joint(encoder) => self
                .numeric_features()
                .map(|f| index_of(f))
                .chain(encoder.columns.iter().flat_map(|c| {
                    std::iter::repeat_n(index_of(&c.feature), c.categories.len())
                }))
                .collect(),
        }
    }

    /// Encode `table` into a dense matrix laid out as [`output_names`](Self::output_names).
    ///
    /// Numbers supplied for a text feature are matched by their canonical
    /// string; text supplied for a numeric feature is an error.
    pub fn transform(&self, table: &FeatureTable) -> Result<Array2<f64>> {
        if table.names() != self.features.as_slice() {
            return Err(TabforgeError::InvalidConfig(format!(
                "expected features {:?}, got {:?}",
                self.features,
                table.names()
            )));
        }

        let numeric: Vec<Vec<f64>> = self
            .features
            .iter()
            .map(|name| self.numeric_values(table, name))
            .collect::<Result<_>>()?;
        let n_rows = table.n_rows();

        match &self.mode {
            EncodingMode::Passthrough | EncodingMode::PerColumn(_) => {
                Ok(Array2::from_shape_fn((n_rows, self.features.len()), |(r, c)| {
                    numeric[c][r]
                }))
            }
            EncodingMode::Joint(encoder) => {
                let numeric_idx: Vec<usize> = self
                    .features
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| !self.is_text_feature(f))
                    .map(|(i, _)| i)
                    .collect();
                let text: Vec<Vec<String>> = encoder
                    .columns
                    .iter()
                    .map(|c| text_values(table, &c.feature))
                    .collect::<Result<_>>()?;

                let width = numeric_idx.len() + encoder.width();
                let mut out = Array2::zeros((n_rows, width));
                for (r, mut row) in out.rows_mut().into_iter().enumerate() {
                    for (c, &feature_idx) in numeric_idx.iter().enumerate() {
                        row[c] = numeric[feature_idx][r];
                    }
                    let values: Vec<&str> = text.iter().map(|col| col[r].as_str()).collect();
                    if let Some(block) = row.as_slice_mut() {
                        encoder.encode_row(&values, &mut block[numeric_idx.len()..]);
                    }
                }
                Ok(out)
            }
        }
    }

    /// Numeric view of one feature: label codes for per-column text
    /// features, raw numbers for numeric ones, and zeros for one-hot text
    /// features (which are laid out separately).
    fn numeric_values(&self, table: &FeatureTable, name: &str) -> Result<Vec<f64>> {
        match &self.mode {
            EncodingMode::PerColumn(encoders) if encoders.contains_key(name) => {
                let encoder = &encoders[name];
                Ok(text_values(table, name)?
                    .iter()
                    .map(|v| encoder.transform_one(v) as f64)
                    .collect())
            }
            EncodingMode::Joint(_) if self.is_text_feature(name) => Ok(vec![0.0; table.n_rows()]),
            _ => match table.column(name) {
                Some(FeatureColumn::Numeric(values)) => Ok(values.clone()),
                Some(FeatureColumn::Text(values)) => Err(TabforgeError::InvalidValue {
                    column: name.to_string(),
                    value: values.first().cloned().unwrap_or_default(),
                    reason: "expected a number".to_string(),
                }),
                None => Err(TabforgeError::ColumnNotFound(name.to_string())),
            },
        }
    }
}

/// Category strings of a feature, formatting numbers canonically.
fn text_values(table: &FeatureTable, name: &str) -> Result<Vec<String>> {
    match table.column(name) {
        Some(FeatureColumn::Text(values)) => Ok(values.clone()),
        Some(FeatureColumn::Numeric(values)) => {
            Ok(values.iter().map(|v| format_category(*v)).collect())
        }
        None => Err(TabforgeError::ColumnNotFound(name.to_string())),
    }
}

// =============================================================================
// Target encoding
// =============================================================================

/// Target values ready for the estimators plus the encoder used, if any.
#[derive(Debug, Clone)]
pub struct EncodedTarget {
    pub values: Vec<f64>,
    pub encoder: Option<LabelEncoder>,
}

/// Encode the target column.
///
/// Text targets are label-encoded over the whole column; numeric targets
/// are used as-is.
pub fn encode_target(df: &DataFrame, target: &str) -> Result<EncodedTarget> {
    let series = df
        .column(target)
        .map_err(|_| TabforgeError::ColumnNotFound(target.to_string()))?
        .as_materialized_series();

    if is_numeric_series(series) {
        let values = series_f64(series)?
            .into_iter()
            .map(|v| v.ok_or_else(|| missing_after_cleaning(target)))
            .collect::<Result<Vec<_>>>()?;
        return Ok(EncodedTarget {
            values,
            encoder: None,
        });
    }

    let labels = series_categories(series)?
        .into_iter()
        .map(|v| v.ok_or_else(|| missing_after_cleaning(target)))
        .collect::<Result<Vec<_>>>()?;
    let encoder = LabelEncoder::fit(&labels);
    let values = encoder
        .transform(&labels)
        .into_iter()
        .map(|code| code as f64)
        .collect();

    Ok(EncodedTarget {
        values,
        encoder: Some(encoder),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> FeatureTable {
        FeatureTable::new(
            vec!["age".into(), "city".into(), "tier".into()],
            vec![
                FeatureColumn::Numeric(vec![30.0, 40.0, 50.0]),
                FeatureColumn::Text(vec!["Nice".into(), "Lyon".into(), "Nice".into()]),
                FeatureColumn::Text(vec!["b".into(), "a".into(), "c".into()]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_label_encoder_sorted_and_unknown() {
        let encoder = LabelEncoder::fit(["pear", "apple", "pear", "fig"]);
        assert_eq!(encoder.classes(), ["apple", "fig", "pear"]);
        assert_eq!(encoder.transform(&["fig", "apple", "kiwi"]), vec![1, 0, 3]);
        assert_eq!(encoder.inverse_transform_one(2), Some("pear"));
        assert_eq!(encoder.inverse_transform_one(3), None);
    }

    #[test]
    fn test_label_encoder_inverse_roundtrip() {
        let values = ["b", "c", "a", "b"];
        let encoder = LabelEncoder::fit(values);
        for v in values {
            let code = encoder.transform_one(v);
            assert_eq!(encoder.inverse_transform_one(code), Some(v));
        }
    }

    #[test]
    fn test_per_column_encoding() {
        let encoder = FeatureEncoder::fit(EncoderKind::Label, &table()).unwrap();
        assert!(encoder.is_text_feature("city"));
        assert!(!encoder.is_text_feature("age"));

        let x = encoder.transform(&table()).unwrap();
        assert_eq!(x.shape(), &[3, 3]);
        assert_eq!(x.row(0).to_vec(), vec![30.0, 1.0, 1.0]);
        assert_eq!(x.row(1).to_vec(), vec![40.0, 0.0, 0.0]);
        assert_eq!(encoder.output_names(), vec!["age", "city", "tier"]);
    }

    #[test]
    fn test_per_column_unseen_category() {
        let encoder = FeatureEncoder::fit(EncoderKind::Label, &table()).unwrap();
        let row = FeatureTable::new(
            vec!["age".into(), "city".into(), "tier".into()],
            vec![
                FeatureColumn::Numeric(vec![35.0]),
                FeatureColumn::Text(vec!["Paris".into()]),
                FeatureColumn::Text(vec!["a".into()]),
            ],
        )
        .unwrap();

        let x = encoder.transform(&row).unwrap();
        assert_eq!(x.row(0).to_vec(), vec![35.0, 2.0, 0.0]);
    }

    #[test]
    fn test_joint_encoding_layout() {
        let encoder = FeatureEncoder::fit(EncoderKind::OneHot, &table()).unwrap();

        assert_eq!(
            encoder.output_names(),
            vec!["age", "city_Lyon", "city_Nice", "tier_a", "tier_b", "tier_c"]
        );
        assert_eq!(encoder.source_feature_indices(), vec![0, 1, 1, 2, 2, 2]);

        let x = encoder.transform(&table()).unwrap();
        assert_eq!(x.row(0).to_vec(), vec![30.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(x.row(1).to_vec(), vec![40.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_joint_unknown_category_is_zero_block() {
        let encoder = FeatureEncoder::fit(EncoderKind::OneHot, &table()).unwrap();
        let row = FeatureTable::new(
            vec!["age".into(), "city".into(), "tier".into()],
            vec![
                FeatureColumn::Numeric(vec![1.0]),
                FeatureColumn::Text(vec!["Paris".into()]),
                FeatureColumn::Text(vec!["c".into()]),
            ],
        )
        .unwrap();

        let x = encoder.transform(&row).unwrap();
        assert_eq!(x.row(0).to_vec(), vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_no_encoder_with_text_features() {
        let err = FeatureEncoder::fit(EncoderKind::None, &table()).unwrap_err();
        assert!(matches!(err, TabforgeError::InvalidConfig(ref m) if m.contains("city")));
    }

    #[test]
    fn test_passthrough_rejects_text_at_prediction() {
        let numeric = FeatureTable::new(
            vec!["x".into()],
            vec![FeatureColumn::Numeric(vec![1.0, 2.0])],
        )
        .unwrap();
        let encoder = FeatureEncoder::fit(EncoderKind::None, &numeric).unwrap();

        let row = FeatureTable::new(
            vec!["x".into()],
            vec![FeatureColumn::Text(vec!["abc".into()])],
        )
        .unwrap();
        let err = encoder.transform(&row).unwrap_err();
        assert!(matches!(err, TabforgeError::InvalidValue { ref column, .. } if column == "x"));
    }

    #[test]
    fn test_number_for_text_feature_uses_canonical_string() {
        let train = FeatureTable::new(
            vec!["code".into()],
            vec![FeatureColumn::Text(vec!["3".into(), "x".into()])],
        )
        .unwrap();
        let encoder = FeatureEncoder::fit(EncoderKind::Label, &train).unwrap();

        let row = FeatureTable::new(vec!["code".into()], vec![FeatureColumn::Numeric(vec![3.0])])
            .unwrap();
        assert_eq!(encoder.transform(&row).unwrap()[[0, 0]], 0.0);
    }

    #[test]
    fn test_table_from_frame_and_target() {
        let df = df![
            "age" => [25i64, 40, 31],
            "city" => ["Lyon", "Nice", "Lyon"],
            "bought" => ["yes", "no", "yes"],
        ]
        .unwrap();

        let table = FeatureTable::from_frame(&df, &["age".into(), "city".into()]).unwrap();
        assert_eq!(table.text_features(), vec!["city"]);
        assert_eq!(table.n_rows(), 3);

        let target = encode_target(&df, "bought").unwrap();
        assert_eq!(target.values, vec![1.0, 0.0, 1.0]);
        assert_eq!(target.encoder.unwrap().classes(), ["no", "yes"]);

        let numeric = encode_target(&df, "age").unwrap();
        assert!(numeric.encoder.is_none());
        assert_eq!(numeric.values, vec![25.0, 40.0, 31.0]);
    }

    #[test]
    fn test_encoder_serde_roundtrip() {
        let encoder = FeatureEncoder::fit(EncoderKind::OneHot, &table()).unwrap();
        let json = serde_json::to_string(&encoder).unwrap();
        let back: FeatureEncoder = serde_json::from_str(&json).unwrap();
        assert_eq!(back, encoder);
    }
}
