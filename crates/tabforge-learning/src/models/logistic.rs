//! Multinomial logistic regression.
//!
//! Minimizes the mean cross-entropy plus `‖W‖² / (2·C·n)` (the scikit-learn
//! objective divided by `C·n`) with Nesterov-accelerated gradient descent. The
//! step size is the inverse of a Lipschitz bound on the gradient, so no line
//! search is needed.

use super::{Estimator, Hyperparameters, argmax, class_indices};
use crate::error::{Result, TabforgeError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogisticRegressionParams {
    #[serde(rename = "C")]
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub fit_intercept: bool,
}

impl Default for LogisticRegressionParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-6,
            fit_intercept: true,
        }
    }
}

impl Hyperparameters for LogisticRegressionParams {
    fn validate(&self, _n_samples: usize, _n_features: usize) -> std::result::Result<(), String> {
        if !self.c.is_finite() || self.c <= 0.0 {
            return Err(format!("C must be positive, got {}", self.c));
        }
        if self.max_iter == 0 {
            return Err("max_iter must be at least 1".to_string());
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(format!("tol must be non-negative, got {}", self.tol));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    classes: Vec<f64>,
    /// One row per class.
    weights: Array2<f64>,
    intercept: Array1<f64>,
    n_iter: usize,
}

impl LogisticRegression {
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn coefficients(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn logits(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.weights.t()) + &self.intercept
    }

    /// Class probabilities, one column per entry of [`classes`](Self::classes).
    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut logits = self.logits(x);
        softmax_rows(&mut logits);
        logits
    }
}

fn softmax_rows(logits: &mut Array2<f64>) {
    for mut row in logits.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

impl Estimator for LogisticRegression {
    type Params = LogisticRegressionParams;

    fn fit(params: Self::Params, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let (classes, labels) = class_indices(y);
        if classes.len() < 2 {
            return Err(TabforgeError::TrainingFailed(format!(
                "LogisticRegression needs at least two classes, found {}",
                classes.len()
            )));
        }

        let (n, d) = x.dim();
        let k = classes.len();
        let n_f = n as f64;
        let lambda = 1.0 / (params.c * n_f);

        let mut onehot = Array2::<f64>::zeros((n, k));
        for (row, &label) in labels.iter().enumerate() {
            onehot[[row, label]] = 1.0;
        }

        // Softmax curvature is at most 1/2 per unit of squared row norm.
        let intercept_norm = if params.fit_intercept { 1.0 } else { 0.0 };
        let mean_sq_norm = x.iter().map(|v| v * v).sum::<f64>() / n_f + intercept_norm;
        let step = 1.0 / (0.5 * mean_sq_norm + lambda);

        let mut weights = Array2::<f64>::zeros((k, d));
        let mut intercept = Array1::<f64>::zeros(k);
        let mut prev_weights = weights.clone();
        let mut prev_intercept = intercept.clone();
        let mut n_iter = params.max_iter;

        for t in 1..=params.max_iter {
            let momentum = (t as f64 - 1.0) / (t as f64 + 2.0);
            let look_w = &weights + &((&weights - &prev_weights) * momentum);
            let look_b = &intercept + &((&intercept - &prev_intercept) * momentum);

            let mut probs = x.dot(&look_w.t()) + &look_b;
            softmax_rows(&mut probs);
            let residual = probs - &onehot;

            let grad_w = residual.t().dot(x) / n_f + &look_w * lambda;
            let grad_b = if params.fit_intercept {
                residual.sum_axis(Axis(0)) / n_f
            } else {
                Array1::zeros(k)
            };

            prev_weights = weights;
            prev_intercept = intercept;
            weights = &look_w - &(&grad_w * step);
            intercept = &look_b - &(&grad_b * step);

            let grad_max = grad_w
                .iter()
                .chain(grad_b.iter())
                .fold(0.0f64, |m, g| m.max(g.abs()));
            if grad_max < params.tol {
                n_iter = t;
                break;
            }
        }

        if weights.iter().chain(intercept.iter()).any(|v| !v.is_finite()) {
            return Err(TabforgeError::TrainingFailed(
                "LogisticRegression diverged".to_string(),
            ));
        }
        debug!(n_iter, classes = k, "LogisticRegression fitted");

        Ok(Self {
            classes,
            weights,
            intercept,
            n_iter,
        })
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        self.logits(x)
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(row.iter().copied())])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_separable_binary() {
        let x = array![[-2.0], [-1.5], [-1.0], [1.0], [1.5], [2.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let model = LogisticRegression::fit(LogisticRegressionParams::default(), &x, &y).unwrap();

        assert_eq!(model.predict(&x), y);
        assert_eq!(model.predict(&array![[-5.0], [5.0]]), array![0.0, 1.0]);

        let proba = model.predict_proba(&array![[0.0]]);
        assert!((proba.sum() - 1.0).abs() < 1e-12);
        assert!((proba[[0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_three_classes_keep_labels() {
        let x = array![[0.0, 0.0], [0.2, 0.1], [5.0, 0.0], [5.1, 0.2], [0.0, 5.0], [0.1, 5.2]];
        let y = array![3.0, 3.0, 7.0, 7.0, 9.0, 9.0];
        let model = LogisticRegression::fit(LogisticRegressionParams::default(), &x, &y).unwrap();

        assert_eq!(model.classes(), &[3.0, 7.0, 9.0]);
        assert_eq!(model.coefficients().dim(), (3, 2));
        assert_eq!(model.predict(&x), y);
    }

    #[test]
    fn test_stronger_regularization_shrinks_weights() {
        let x = array![[-1.0], [-0.5], [0.5], [1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let loose = LogisticRegression::fit(LogisticRegressionParams::default(), &x, &y).unwrap();
        let tight = LogisticRegression::fit(
            LogisticRegressionParams {
                c: 0.01,
                ..Default::default()
            },
            &x,
            &y,
        )
        .unwrap();
        assert!(tight.coefficients()[[1, 0]].abs() < loose.coefficients()[[1, 0]].abs());
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 1.0];
        let err = LogisticRegression::fit(LogisticRegressionParams::default(), &x, &y).unwrap_err();
        assert!(matches!(err, TabforgeError::TrainingFailed(_)));
    }

    #[test]
    fn test_params_from_json() {
        let params: LogisticRegressionParams =
            serde_json::from_value(serde_json::json!({"C": 0.5, "max_iter": 200})).unwrap();
        assert_eq!(params.c, 0.5);
        assert_eq!(params.max_iter, 200);
        assert_eq!(params.tol, 1e-6);
        assert!(params.validate(10, 1).is_ok());

        let bad = LogisticRegressionParams {
            c: 0.0,
            ..Default::default()
        };
        assert!(bad.validate(10, 1).is_err());
    }
}
