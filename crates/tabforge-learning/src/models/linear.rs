//! Ordinary least squares and ridge regression via the normal equations.

use super::{Estimator, Hyperparameters, solve_linear_system};
use crate::error::Result;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinearRegressionParams {
    pub fit_intercept: bool,
}

impl Default for LinearRegressionParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
        }
    }
}

impl Hyperparameters for LinearRegressionParams {}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RidgeParams {
    pub alpha: f64,
    pub fit_intercept: bool,
}

impl Default for RidgeParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            fit_intercept: true,
        }
    }
}

impl Hyperparameters for RidgeParams {
    fn validate(&self, _n_samples: usize, _n_features: usize) -> std::result::Result<(), String> {
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(format!("alpha must be a non-negative number, got {}", self.alpha));
        }
        Ok(())
    }
}

/// Coefficients and intercept of a linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    coef: Array1<f64>,
    intercept: f64,
}

impl LinearFit {
    fn fit(x: &Array2<f64>, y: &Array1<f64>, alpha: f64, fit_intercept: bool) -> Self {
        let n_features = x.ncols();
        let (x_mean, y_mean) = if fit_intercept {
            (
                x.mean_axis(Axis(0))
                    .unwrap_or_else(|| Array1::zeros(n_features)),
                y.mean().unwrap_or(0.0),
            )
        } else {
            (Array1::zeros(n_features), 0.0)
        };

        let xc = x - &x_mean;
        let yc = y - y_mean;
        let mut gram = xc.t().dot(&xc);
        for i in 0..n_features {
            gram[[i, i]] += alpha;
        }
        let rhs = xc.t().dot(&yc);

        let coef = solve_linear_system(gram, rhs);
        let intercept = y_mean - x_mean.dot(&coef);
        Self { coef, intercept }
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.coef) + self.intercept
    }

    pub fn coef(&self) -> &Array1<f64> {
        &self.coef
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    fit: LinearFit,
}

impl LinearRegression {
    pub fn coefficients(&self) -> Array2<f64> {
        self.fit.coef.clone().insert_axis(Axis(0))
    }

    pub fn linear_fit(&self) -> &LinearFit {
        &self.fit
    }
}

impl Estimator for LinearRegression {
    type Params = LinearRegressionParams;

    fn fit(params: Self::Params, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        Ok(Self {
            fit: LinearFit::fit(x, y, 0.0, params.fit_intercept),
        })
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        self.fit.predict(x)
    }
}

/// Least squares with an L2 penalty on the coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ridge {
    alpha: f64,
    fit: LinearFit,
}

impl Ridge {
    pub fn coefficients(&self) -> Array2<f64> {
        self.fit.coef.clone().insert_axis(Axis(0))
    }

    pub fn linear_fit(&self) -> &LinearFit {
        &self.fit
    }
}

impl Estimator for Ridge {
    type Params = RidgeParams;

    fn fit(params: Self::Params, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        Ok(Self {
            alpha: params.alpha,
            fit: LinearFit::fit(x, y, params.alpha, params.fit_intercept),
        })
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        self.fit.predict(x)
    }
}
