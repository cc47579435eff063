//! Model evaluation.
//!
//! [`Evaluator::evaluate`] turns test-set predictions into a [`MetricsBundle`]:
//! classification or regression scores plus a feature-importance vector
//! aligned with the configured features.
//!
//! # Metric keys
//!
//! | Problem | Keys |
//! |---------|------|
//! | Classification | `accuracy_score`, `precision`, `recall`, `f1_score`, `confusion_matrix`, `classification_report` |
//! | Regression | `r2_score`, `mean_squared_error`, `mean_absolute_error`, `root_mean_squared_error` |
//!
//! Precision, recall and F1 are support-weighted averages; a class that is
//! never predicted contributes a precision of zero.

use crate::config::ProblemType;
use crate::models::FittedModel;
use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tabforge_processing::format_category;
use tracing::{debug, warn};

/// Confusion matrix over the sorted union of true and predicted labels.
///
/// Rows are true labels, columns predicted labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub matrix: Vec<Vec<u64>>,
    pub labels: Vec<String>,
}

/// Precision, recall and F1 for one class or one average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: u64,
}

/// Per-class scores plus overall accuracy and averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    #[serde(flatten)]
    pub classes: BTreeMap<String, ClassScores>,
    pub accuracy: f64,
    #[serde(rename = "macro avg")]
    pub macro_avg: ClassScores,
    #[serde(rename = "weighted avg")]
    pub weighted_avg: ClassScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy_score: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub classification_report: ClassificationReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2_score: f64,
    pub mean_squared_error: f64,
    pub mean_absolute_error: f64,
    pub root_mean_squared_error: f64,
}

/// Scores for the configured problem type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scores {
    Classification(ClassificationMetrics),
    Regression(RegressionMetrics),
}

/// Importance per configured feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureImportance {
    fn zeros(features: &[String]) -> Self {
        Self {
            labels: features.to_vec(),
            values: vec![0.0; features.len()],
        }
    }
}

/// Everything reported about a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsBundle {
    #[serde(flatten)]
    pub scores: Scores,
    pub feature_importance: FeatureImportance,
}

impl MetricsBundle {
    /// Accuracy (classification) or R² (regression) as a percentage,
    /// rounded to two decimals.
    pub fn headline_score(&self) -> f64 {
        let raw = match &self.scores {
            Scores::Classification(m) => m.accuracy_score,
            Scores::Regression(m) => m.r2_score,
        };
        round2(raw * 100.0)
    }

    pub fn classification(&self) -> Option<&ClassificationMetrics> {
        match &self.scores {
            Scores::Classification(m) => Some(m),
            Scores::Regression(_) => None,
        }
    }

    pub fn regression(&self) -> Option<&RegressionMetrics> {
        match &self.scores {
            Scores::Regression(m) => Some(m),
            Scores::Classification(_) => None,
        }
    }
}

/// Round to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Computes evaluation metrics.
pub struct Evaluator;

impl Evaluator {
    /// Evaluate `predictions` against `y_test`.
    ///
    /// `class_names` decodes label codes for the confusion matrix and report;
    /// without it labels are the numeric classes formatted as text.
    /// `source_indices` maps every model input column to its feature (see
    /// [`FeatureEncoder::source_feature_indices`](crate::FeatureEncoder::source_feature_indices)).
    pub fn evaluate(
        y_test: &Array1<f64>,
        predictions: &Array1<f64>,
        problem_type: ProblemType,
        features: &[String],
        model: &FittedModel,
        source_indices: &[usize],
        class_names: Option<&[String]>,
    ) -> MetricsBundle {
        let scores = match problem_type {
            ProblemType::Classification => {
                Scores::Classification(Self::classification(y_test, predictions, class_names))
            }
            ProblemType::Regression => Scores::Regression(Self::regression(y_test, predictions)),
        };
        debug!(?problem_type, "Computed scores");

        MetricsBundle {
            scores,
            feature_importance: Self::feature_importance(model, features, source_indices),
        }
    }

    /// Accuracy, weighted precision/recall/F1, confusion matrix and report.
    pub fn classification(
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        class_names: Option<&[String]>,
    ) -> ClassificationMetrics {
        let mut classes: Vec<f64> = y_true.iter().chain(y_pred.iter()).copied().collect();
        classes.sort_by(f64::total_cmp);
        classes.dedup();
        let position = |v: f64| classes.iter().position(|c| *c == v).unwrap_or(0);

        let k = classes.len();
        let mut matrix = vec![vec![0u64; k]; k];
        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            matrix[position(*t)][position(*p)] += 1;
        }

        let labels: Vec<String> = classes
            .iter()
            .map(|&c| class_label(c, class_names))
            .collect();

        let total = y_true.len() as u64;
        let correct: u64 = (0..k).map(|i| matrix[i][i]).sum();
        let accuracy = ratio(correct as f64, total as f64);

        let per_class: Vec<ClassScores> = (0..k)
            .map(|i| {
                let tp = matrix[i][i] as f64;
                let support: u64 = matrix[i].iter().sum();
                let predicted: u64 = matrix.iter().map(|row| row[i]).sum();
                let precision = ratio(tp, predicted as f64);
                let recall = ratio(tp, support as f64);
                ClassScores {
                    precision,
                    recall,
                    f1_score: f1(precision, recall),
                    support,
                }
            })
            .collect();

        let macro_avg = average(&per_class, |_| 1.0, total);
        let weighted_avg = average(&per_class, |s| s.support as f64, total);

        ClassificationMetrics {
            accuracy_score: accuracy,
            precision: weighted_avg.precision,
            recall: weighted_avg.recall,
            f1_score: weighted_avg.f1_score,
            classification_report: ClassificationReport {
                classes: labels.iter().cloned().zip(per_class).collect(),
                accuracy,
                macro_avg,
                weighted_avg,
            },
            confusion_matrix: ConfusionMatrix { matrix, labels },
        }
    }

    /// R², MSE, MAE and RMSE.
    pub fn regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> RegressionMetrics {
        let n = y_true.len().max(1) as f64;
        let residuals = y_true - y_pred;
        let mse = residuals.mapv(|r| r * r).sum() / n;
        let mae = residuals.mapv(f64::abs).sum() / n;

        let mean = y_true.mean().unwrap_or(0.0);
        let ss_tot: f64 = y_true.iter().map(|v| (v - mean).powi(2)).sum();
        let ss_res = mse * n;
        let r2 = if ss_tot == 0.0 {
            if ss_res == 0.0 { 1.0 } else { 0.0 }
        } else {
            1.0 - ss_res / ss_tot
        };

        RegressionMetrics {
            r2_score: r2,
            mean_squared_error: mse,
            mean_absolute_error: mae,
            root_mean_squared_error: mse.sqrt(),
        }
    }

    /// Importance per feature, folded back from the model's input columns.
    ///
    /// Uses the model's importances when it has them, else the absolute
    /// coefficients averaged over outputs, else zeros.
    pub fn feature_importance(
        model: &FittedModel,
        features: &[String],
        source_indices: &[usize],
    ) -> FeatureImportance {
        let raw: Option<Vec<f64>> = model.feature_importances().or_else(|| {
            model.coefficients().and_then(|coef| {
                coef.mapv(f64::abs)
                    .mean_axis(Axis(0))
                    .map(|mean| mean.to_vec())
            })
        });

        let Some(raw) = raw else {
            debug!(model = %model.kind(), "Model exposes no importances");
            return FeatureImportance::zeros(features);
        };

        if raw.len() != source_indices.len() {
            warn!(
                columns = raw.len(),
                expected = source_indices.len(),
                "Importance length does not match the model inputs"
            );
            return FeatureImportance::zeros(features);
        }
        if raw.iter().any(|v| !v.is_finite()) {
            warn!("Importances contain non-finite values");
            return FeatureImportance::zeros(features);
        }

        let mut values = vec![0.0; features.len()];
        for (value, &source) in raw.iter().zip(source_indices) {
            match values.get_mut(source) {
                Some(slot) => *slot += value,
                None => {
                    warn!(source, "Importance maps to an unknown feature");
                    return FeatureImportance::zeros(features);
                }
            }
        }

        FeatureImportance {
            labels: features.to_vec(),
            values,
        }
    }
}

fn class_label(code: f64, class_names: Option<&[String]>) -> String {
    class_names
        .and_then(|names| {
            (code >= 0.0 && code.fract() == 0.0)
                .then(|| names.get(code as usize))
                .flatten()
        })
        .cloned()
        .unwrap_or_else(|| format_category(code))
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

fn f1(precision: f64, recall: f64) -> f64 {
    ratio(2.0 * precision * recall, precision + recall)
}

fn average(scores: &[ClassScores], weight: impl Fn(&ClassScores) -> f64, total: u64) -> ClassScores {
    let weights: Vec<f64> = scores.iter().map(&weight).collect();
    let sum: f64 = weights.iter().sum();
    let avg = |get: fn(&ClassScores) -> f64| {
        ratio(
            scores.iter().zip(&weights).map(|(s, w)| get(s) * w).sum(),
            sum,
        )
    };
    ClassScores {
        precision: avg(|s| s.precision),
        recall: avg(|s| s.recall),
        f1_score: avg(|s| s.f1_score),
        support: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelKind, Parameters};
    use ndarray::{Array2, array};
    use pretty_assertions::assert_eq;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_perfect_classifier() {
        let y = array![0.0, 1.0, 1.0, 2.0];
        let m = Evaluator::classification(&y, &y, None);
        assert_eq!(m.accuracy_score, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1_score, 1.0);
        assert_eq!(m.confusion_matrix.labels, names(&["0", "1", "2"]));
        assert_eq!(
            m.confusion_matrix.matrix,
            vec![vec![1, 0, 0], vec![0, 2, 0], vec![0, 0, 1]]
        );
    }

    #[test]
    fn test_weighted_scores_and_zero_division() {
        // Class 1 is never predicted
        let y_true = array![0.0, 0.0, 0.0, 1.0];
        let y_pred = array![0.0, 0.0, 0.0, 0.0];
        let class_names = names(&["no", "yes"]);
        let m = Evaluator::classification(&y_true, &y_pred, Some(&class_names));

        assert_eq!(m.accuracy_score, 0.75);
        assert_eq!(m.confusion_matrix.labels, class_names);
        assert_eq!(m.confusion_matrix.matrix, vec![vec![3, 0], vec![1, 0]]);

        let no = m.classification_report.classes["no"];
        assert_eq!(no.precision, 0.75);
        assert_eq!(no.recall, 1.0);
        assert_eq!(no.support, 3);
        let yes = m.classification_report.classes["yes"];
        assert_eq!(yes.precision, 0.0);
        assert_eq!(yes.f1_score, 0.0);

        // Weighted precision: 0.75 * 3/4 + 0 * 1/4
        assert!((m.precision - 0.5625).abs() < 1e-12);
        assert!((m.classification_report.macro_avg.recall - 0.5).abs() < 1e-12);
        assert_eq!(m.classification_report.weighted_avg.support, 4);
    }

    #[test]
    fn test_labels_cover_predicted_only_classes() {
        let y_true = array![1.0, 1.0];
        let y_pred = array![1.0, 4.0];
        let m = Evaluator::classification(&y_true, &y_pred, None);
        assert_eq!(m.confusion_matrix.labels, names(&["1", "4"]));
        assert_eq!(m.confusion_matrix.matrix, vec![vec![1, 1], vec![0, 0]]);
    }

    #[test]
    fn test_report_serializes_like_sklearn() {
        let y = array![0.0, 1.0];
        let m = Evaluator::classification(&y, &y, Some(&names(&["a", "b"])));
        let json = serde_json::to_value(&m.classification_report).unwrap();
        assert_eq!(json["a"]["f1-score"], 1.0);
        assert_eq!(json["accuracy"], 1.0);
        assert_eq!(json["macro avg"]["support"], 2);
    }

    #[test]
    fn test_perfect_regressor() {
        let y = array![1.0, 2.0, 3.5];
        let m = Evaluator::regression(&y, &y);
        assert_eq!(m.r2_score, 1.0);
        assert_eq!(m.mean_squared_error, 0.0);
        assert_eq!(m.mean_absolute_error, 0.0);
        assert_eq!(m.root_mean_squared_error, 0.0);
    }

    #[test]
    fn test_regression_errors() {
        let y_true = array![1.0, 2.0, 3.0];
        let y_pred = array![2.0, 2.0, 5.0];
        let m = Evaluator::regression(&y_true, &y_pred);
        assert!((m.mean_squared_error - 5.0 / 3.0).abs() < 1e-12);
        assert!((m.mean_absolute_error - 1.0).abs() < 1e-12);
        assert!((m.root_mean_squared_error - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        // ss_tot = 2, ss_res = 5
        assert!((m.r2_score + 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_constant_target_r2() {
        let y_true = array![2.0, 2.0];
        assert_eq!(Evaluator::regression(&y_true, &array![2.0, 2.0]).r2_score, 1.0);
        assert_eq!(Evaluator::regression(&y_true, &array![1.0, 2.0]).r2_score, 0.0);
    }

    #[test]
    fn test_importance_folds_one_hot_columns() {
        let x = Array2::from_shape_fn((8, 3), |(r, c)| match c {
            0 => r as f64,
            1 => (r % 2) as f64,
            _ => ((r + 1) % 2) as f64,
        });
        let y = Array1::from_iter((0..8).map(|r| (r % 2) as f64));
        let model = FittedModel::fit(
            ModelKind::DecisionTreeClassifier,
            &Parameters::new(),
            &x,
            &y,
            0,
        )
        .unwrap();

        // Column 0 is feature "n"; columns 1 and 2 are one-hot blocks of "c"
        let features = names(&["c", "n"]);
        let fi = Evaluator::feature_importance(&model, &features, &[1, 0, 0]);
        assert_eq!(fi.labels, features);
        assert_eq!(fi.values, vec![1.0, 0.0]);

        // Wrong column mapping falls back to zeros
        let fi = Evaluator::feature_importance(&model, &features, &[0, 1]);
        assert_eq!(fi.values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_importance_from_coefficients_and_none() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 0.0]];
        let y = array![1.0, -1.0, 5.0, 3.0];
        let features = names(&["a", "b"]);

        let linear =
            FittedModel::fit(ModelKind::LinearRegression, &Parameters::new(), &x, &y, 0).unwrap();
        // y = 2a + 4b - 3
        let fi = Evaluator::feature_importance(&linear, &features, &[0, 1]);
        assert!((fi.values[0] - 2.0).abs() < 1e-9);
        assert!((fi.values[1] - 4.0).abs() < 1e-9);

        let knn =
            FittedModel::fit(ModelKind::KNeighborsRegressor, &Parameters::new(), &x, &y, 0);
        // Four rows cannot serve five neighbors
        assert!(knn.is_err());

        let params = serde_json::json!({"n_neighbors": 2}).as_object().cloned().unwrap();
        let knn = FittedModel::fit(ModelKind::KNeighborsRegressor, &params, &x, &y, 0).unwrap();
        let fi = Evaluator::feature_importance(&knn, &features, &[0, 1]);
        assert_eq!(fi.values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_headline_score() {
        let bundle = MetricsBundle {
            scores: Scores::Regression(RegressionMetrics {
                r2_score: 0.87654,
                mean_squared_error: 1.0,
                mean_absolute_error: 1.0,
                root_mean_squared_error: 1.0,
            }),
            feature_importance: FeatureImportance::zeros(&names(&["a"])),
        };
        assert_eq!(bundle.headline_score(), 87.65);
        assert!(bundle.classification().is_none());

        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["r2_score"], 0.87654);
        assert_eq!(json["feature_importance"]["labels"][0], "a");
    }
}
