//! Estimator catalog.
//!
//! Every [`ModelKind`] maps to one estimator implemented on `ndarray`
//! matrices. Hyperparameters use the conventional scikit-learn names and are
//! deserialized from the caller's JSON map into a per-estimator parameter
//! struct that rejects unknown fields.
//!
//! | Model | Module | Importances | Coefficients |
//! |-------|--------|-------------|--------------|
//! | LinearRegression, Ridge | [`linear`] | | ✓ |
//! | LogisticRegression | [`logistic`] | | ✓ |
//! | KNeighbors* | [`knn`] | | |
//! | DecisionTree* | [`tree`] | ✓ | |
//! | RandomForest* | [`forest`] | ✓ | |
//! | SVC | [`svm`] | | linear kernel only |

pub mod forest;
pub mod knn;
pub mod linear;
pub mod logistic;
pub mod svm;
pub mod tree;

pub use forest::{RandomForestClassifier, RandomForestRegressor};
pub use knn::{KNeighborsClassifier, KNeighborsRegressor};
pub use linear::{LinearRegression, Ridge};
pub use logistic::LogisticRegression;
pub use svm::Svc;
pub use tree::{DecisionTreeClassifier, DecisionTreeRegressor};

use crate::config::{ModelKind, Parameters};
use crate::error::{Result, TabforgeError};
use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Parameter struct of an estimator.
pub trait Hyperparameters: DeserializeOwned + Default {
    /// Check values that deserialization alone cannot.
    fn validate(&self, _n_samples: usize, _n_features: usize) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Fill in the pipeline seed when the caller did not set one.
    fn seed_default(&mut self, _random_state: u64) {}
}

/// A trainable model.
pub trait Estimator: Sized {
    type Params: Hyperparameters;

    /// Fit on the training matrix and target.
    fn fit(params: Self::Params, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self>;

    /// Predict one value per row of `x`.
    fn predict(&self, x: &Array2<f64>) -> Array1<f64>;
}

/// Enum to hold fitted model variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", content = "fitted")]
pub enum FittedModel {
    LinearRegression(LinearRegression),
    LogisticRegression(LogisticRegression),
    Ridge(Ridge),
    KNeighborsRegressor(KNeighborsRegressor),
    KNeighborsClassifier(KNeighborsClassifier),
    DecisionTreeRegressor(DecisionTreeRegressor),
    DecisionTreeClassifier(DecisionTreeClassifier),
    RandomForestRegressor(RandomForestRegressor),
    RandomForestClassifier(RandomForestClassifier),
    #[serde(rename = "SVC")]
    Svc(Svc),
}

impl FittedModel {
    /// Fit the model selected by `kind`.
    ///
    /// # Errors
    ///
    /// - [`TabforgeError::InvalidHyperparameters`] for unknown, mistyped or
    ///   out-of-range parameters
    /// - [`TabforgeError::TrainingFailed`] when the estimator cannot fit the
    ///   data
    pub fn fit(
        kind: ModelKind,
        parameters: &Parameters,
        x: &Array2<f64>,
        y: &Array1<f64>,
        random_state: u64,
    ) -> Result<Self> {
        check_training_data(x, y)?;

        let model = match kind {
            ModelKind::LinearRegression => {
                Self::LinearRegression(fit_with(kind, parameters, x, y, random_state)?)
            }
            ModelKind::LogisticRegression => {
                Self::LogisticRegression(fit_with(kind, parameters, x, y, random_state)?)
            }
            ModelKind::Ridge => Self::Ridge(fit_with(kind, parameters, x, y, random_state)?),
            ModelKind::KNeighborsRegressor => {
                Self::KNeighborsRegressor(fit_with(kind, parameters, x, y, random_state)?)
            }
            ModelKind::KNeighborsClassifier => {
                Self::KNeighborsClassifier(fit_with(kind, parameters, x, y, random_state)?)
            }
            ModelKind::DecisionTreeRegressor => {
                Self::DecisionTreeRegressor(fit_with(kind, parameters, x, y, random_state)?)
            }
            ModelKind::DecisionTreeClassifier => {
                Self::DecisionTreeClassifier(fit_with(kind, parameters, x, y, random_state)?)
            }
            ModelKind::RandomForestRegressor => {
                Self::RandomForestRegressor(fit_with(kind, parameters, x, y, random_state)?)
            }
            ModelKind::RandomForestClassifier => {
                Self::RandomForestClassifier(fit_with(kind, parameters, x, y, random_state)?)
            }
            ModelKind::Svc => Self::Svc(fit_with(kind, parameters, x, y, random_state)?),
        };
        Ok(model)
    }

    /// The catalog entry this model was fitted from.
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::LinearRegression(_) => ModelKind::LinearRegression,
            Self::LogisticRegression(_) => ModelKind::LogisticRegression,
            Self::Ridge(_) => ModelKind::Ridge,
            Self::KNeighborsRegressor(_) => ModelKind::KNeighborsRegressor,
            Self::KNeighborsClassifier(_) => ModelKind::KNeighborsClassifier,
            Self::DecisionTreeRegressor(_) => ModelKind::DecisionTreeRegressor,
            Self::DecisionTreeClassifier(_) => ModelKind::DecisionTreeClassifier,
            Self::RandomForestRegressor(_) => ModelKind::RandomForestRegressor,
            Self::RandomForestClassifier(_) => ModelKind::RandomForestClassifier,
            Self::Svc(_) => ModelKind::Svc,
        }
    }

    /// Predict one value per row: a class label for classifiers, a
    /// continuous value for regressors.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        match self {
            Self::LinearRegression(m) => m.predict(x),
            Self::LogisticRegression(m) => m.predict(x),
            Self::Ridge(m) => m.predict(x),
            Self::KNeighborsRegressor(m) => m.predict(x),
            Self::KNeighborsClassifier(m) => m.predict(x),
            Self::DecisionTreeRegressor(m) => m.predict(x),
            Self::DecisionTreeClassifier(m) => m.predict(x),
            Self::RandomForestRegressor(m) => m.predict(x),
            Self::RandomForestClassifier(m) => m.predict(x),
            Self::Svc(m) => m.predict(x),
        }
    }

    /// Impurity-based importances, one per input column (trees and forests).
    pub fn feature_importances(&self) -> Option<Vec<f64>> {
        match self {
            Self::DecisionTreeRegressor(m) => Some(m.feature_importances().to_vec()),
            Self::DecisionTreeClassifier(m) => Some(m.feature_importances().to_vec()),
            Self::RandomForestRegressor(m) => Some(m.feature_importances().to_vec()),
            Self::RandomForestClassifier(m) => Some(m.feature_importances().to_vec()),
            _ => None,
        }
    }

    /// Linear coefficients, one row per output (class or target), one
    /// column per input column.
    pub fn coefficients(&self) -> Option<Array2<f64>> {
        match self {
            Self::LinearRegression(m) => Some(m.coefficients()),
            Self::Ridge(m) => Some(m.coefficients()),
            Self::LogisticRegression(m) => Some(m.coefficients().clone()),
            Self::Svc(m) => m.coefficients(),
            _ => None,
        }
    }
}

fn fit_with<E: Estimator>(
    kind: ModelKind,
    parameters: &Parameters,
    x: &Array2<f64>,
    y: &Array1<f64>,
    random_state: u64,
) -> Result<E> {
    let invalid = |message: String| TabforgeError::InvalidHyperparameters {
        model: kind.to_string(),
        message,
    };

    let mut params: E::Params =
        serde_json::from_value(serde_json::Value::Object(parameters.clone()))
            .map_err(|e| invalid(e.to_string()))?;
    params.validate(x.nrows(), x.ncols()).map_err(invalid)?;
    params.seed_default(random_state);

    E::fit(params, x, y)
}

fn check_training_data(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(TabforgeError::TrainingFailed(
            "no training rows".to_string(),
        ));
    }
    if x.nrows() != y.len() {
        return Err(TabforgeError::TrainingFailed(format!(
            "{} feature rows but {} targets",
            x.nrows(),
            y.len()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(TabforgeError::TrainingFailed(
            "training data contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Sorted distinct labels of `y` and each row's index into them.
pub(crate) fn class_indices(y: &Array1<f64>) -> (Vec<f64>, Vec<usize>) {
    let mut classes: Vec<f64> = y.to_vec();
    classes.sort_by(f64::total_cmp);
    classes.dedup();

    let indices = y
        .iter()
        .map(|v| {
            classes
                .binary_search_by(|c| c.total_cmp(v))
                .unwrap_or_default()
        })
        .collect();
    (classes, indices)
}

/// Index of the largest value; the first one wins ties.
pub(crate) fn argmax(values: impl IntoIterator<Item = f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (idx, v) in values.into_iter().enumerate() {
        if v > best.1 {
            best = (idx, v);
        }
    }
    best.0
}

/// Solve `a · w = b` by Gaussian elimination with partial pivoting.
///
/// Columns whose pivot falls below a relative tolerance are treated as free
/// and get a zero coefficient, which yields a least-squares solution for
/// rank-deficient normal equations.
pub(crate) fn solve_linear_system(mut a: Array2<f64>, mut b: Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let scale = a.diag().iter().fold(0.0f64, |m, v| m.max(v.abs())).max(1.0);
    let tol = 1e-10 * scale;

    let mut pivot_columns = Vec::with_capacity(n);
    let mut row = 0;
    for col in 0..n {
        if row == n {
            break;
        }
        let pivot = (row..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(row);
        if a[[pivot, col]].abs() < tol {
            continue;
        }
        if pivot != row {
            for k in 0..n {
                a.swap([pivot, k], [row, k]);
            }
            b.swap(pivot, row);
        }
        for i in (row + 1)..n {
            let factor = a[[i, col]] / a[[row, col]];
            if factor != 0.0 {
                for k in col..n {
                    a[[i, k]] -= factor * a[[row, k]];
                }
                b[i] -= factor * b[row];
            }
        }
        pivot_columns.push(col);
        row += 1;
    }

    let mut w = Array1::zeros(n);
    for (r, &col) in pivot_columns.iter().enumerate().rev() {
        let rest: f64 = ((col + 1)..n).map(|k| a[[r, k]] * w[k]).sum();
        w[col] = (b[r] - rest) / a[[r, col]];
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Parameters {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_solve_linear_system() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![5.0, 10.0];
        let w = solve_linear_system(a, b);
        assert!((w[0] - 1.0).abs() < 1e-12);
        assert!((w[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_singular_system_zeroes_free_column() {
        // Second column duplicates the first
        let a = array![[2.0, 2.0], [2.0, 2.0]];
        let b = array![4.0, 4.0];
        let w = solve_linear_system(a, b);
        assert!((w[0] - 2.0).abs() < 1e-12);
        assert_eq!(w[1], 0.0);
    }

    #[test]
    fn test_class_indices() {
        let (classes, idx) = class_indices(&array![2.0, 0.0, 2.0, 1.0]);
        assert_eq!(classes, vec![0.0, 1.0, 2.0]);
        assert_eq!(idx, vec![2, 0, 2, 1]);
        assert_eq!(argmax([0.1, 0.7, 0.7]), 1);
    }

    #[test]
    fn test_unknown_hyperparameter_rejected() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 1.0, 2.0];
        let err = FittedModel::fit(
            ModelKind::Ridge,
            &params(json!({"alfa": 1.0})),
            &x,
            &y,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, TabforgeError::InvalidHyperparameters { ref model, .. } if model == "Ridge"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 1.0, 0.0];
        let err = FittedModel::fit(
            ModelKind::KNeighborsClassifier,
            &params(json!({"n_neighbors": "three"})),
            &x,
            &y,
            0,
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_HYPERPARAMETERS");
    }

    #[test]
    fn test_non_finite_training_data() {
        let x = array![[0.0], [f64::NAN]];
        let y = array![0.0, 1.0];
        let err = FittedModel::fit(ModelKind::LinearRegression, &Parameters::new(), &x, &y, 0)
            .unwrap_err();
        assert!(matches!(err, TabforgeError::TrainingFailed(_)));
    }

    #[test]
    fn test_every_model_fits_and_predicts() {
        let x = Array2::from_shape_fn((24, 2), |(r, c)| (r as f64) * if c == 0 { 1.0 } else { -0.5 });
        let y_class = Array1::from_iter((0..24).map(|r| if r < 12 { 0.0 } else { 1.0 }));
        let y_reg = Array1::from_iter((0..24).map(|r| 3.0 * r as f64 + 1.0));

        for kind in ModelKind::ALL {
            let y = match kind.problem_type() {
                crate::config::ProblemType::Classification => &y_class,
                crate::config::ProblemType::Regression => &y_reg,
            };
            let model = FittedModel::fit(kind, &Parameters::new(), &x, y, 42).unwrap();
            assert_eq!(model.kind(), kind);
            let predictions = model.predict(&x);
            assert_eq!(predictions.len(), 24, "{kind}");
            assert!(predictions.iter().all(|p| p.is_finite()), "{kind}");

            let json = serde_json::to_string(&model).unwrap();
            let back: FittedModel = serde_json::from_str(&json).unwrap();
            assert_eq!(back.predict(&x), predictions, "{kind}");
        }
    }
}
