//! Model training.
//!
//! [`Trainer`] fits one estimator from the catalog on an already encoded and
//! scaled training matrix. It is a single synchronous fit: no search, no
//! retries.

use crate::config::{ModelKind, Parameters};
use crate::error::Result;
use crate::models::FittedModel;
use ndarray::{Array1, Array2};
use std::time::Instant;
use tracing::{debug, info};

/// Fits catalog estimators.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trainer;

impl Trainer {
    /// Fit `model_type` with `parameters` on `x_train` / `y_train`.
    ///
    /// `random_state` seeds estimators that use randomness (trees, forests,
    /// SVC) unless `parameters` sets their own `random_state`.
    ///
    /// # Errors
    ///
    /// - [`InvalidHyperparameters`](crate::TabforgeError::InvalidHyperparameters)
    ///   when `parameters` does not fit the estimator
    /// - [`TrainingFailed`](crate::TabforgeError::TrainingFailed) when the
    ///   estimator cannot be fitted on the data
    pub fn train(
        model_type: ModelKind,
        parameters: &Parameters,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        random_state: u64,
    ) -> Result<FittedModel> {
        debug!(
            model = %model_type,
            rows = x_train.nrows(),
            columns = x_train.ncols(),
            parameters = ?parameters,
            "Fitting model"
        );

        let started = Instant::now();
        let model = FittedModel::fit(model_type, parameters, x_train, y_train, random_state)?;

        info!(
            model = %model_type,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Model fitted"
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TabforgeError;
    use ndarray::array;
    use serde_json::json;

    #[test]
    fn test_train_uses_parameters() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let params = json!({"max_depth": 1}).as_object().cloned().unwrap();

        let model = Trainer::train(ModelKind::DecisionTreeClassifier, &params, &x, &y, 42).unwrap();
        assert_eq!(model.kind(), ModelKind::DecisionTreeClassifier);
        assert_eq!(model.predict(&array![[0.5], [4.5]]), array![0.0, 1.0]);
    }

    #[test]
    fn test_train_rejects_foreign_parameters() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![1.0, 2.0, 3.0];
        let params = json!({"n_estimators": 10}).as_object().cloned().unwrap();

        let err = Trainer::train(ModelKind::LinearRegression, &params, &x, &y, 0).unwrap_err();
        assert!(matches!(
            err,
            TabforgeError::InvalidHyperparameters { ref message, .. } if message.contains("n_estimators")
        ));
    }

    #[test]
    fn test_knn_larger_than_training_set() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let params = json!({"n_neighbors": 3}).as_object().cloned().unwrap();
        let err = Trainer::train(ModelKind::KNeighborsClassifier, &params, &x, &y, 0).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_HYPERPARAMETERS");
    }
}
