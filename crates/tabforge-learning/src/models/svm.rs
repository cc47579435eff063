//! Support vector classification.
//!
//! Each binary machine is trained with simplified SMO: a randomly chosen
//! partner index per KKT violator, stopping after three consecutive sweeps
//! without an update. More than two classes are handled one-vs-rest and the
//! machine with the largest decision value wins.

use super::{Estimator, Hyperparameters, argmax, class_indices};
use crate::error::{Result, TabforgeError};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sweeps allowed when `max_iter` is not positive.
const UNBOUNDED_SWEEPS: usize = 10_000;
const ALPHA_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    Linear,
    Poly,
    #[default]
    Rbf,
    Sigmoid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Gamma {
    Value(f64),
    /// `"scale"` or `"auto"`.
    Named(String),
}

impl Default for Gamma {
    fn default() -> Self {
        Self::Named("scale".to_string())
    }
}

impl Gamma {
    fn check(&self) -> std::result::Result<(), String> {
        match self {
            Self::Value(g) if *g > 0.0 && g.is_finite() => Ok(()),
            Self::Value(g) => Err(format!("gamma must be positive, got {g}")),
            Self::Named(name) if name == "scale" || name == "auto" => Ok(()),
            Self::Named(other) => Err(format!(
                "gamma must be 'scale', 'auto' or a positive number, got '{other}'"
            )),
        }
    }

    fn resolve(&self, x: &Array2<f64>) -> f64 {
        let d = x.ncols().max(1) as f64;
        match self {
            Self::Value(g) => *g,
            Self::Named(name) if name == "auto" => 1.0 / d,
            Self::Named(_) => {
                let var = x.var(0.0);
                if var > 0.0 { 1.0 / (d * var) } else { 1.0 }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SvcParams {
    #[serde(rename = "C")]
    pub c: f64,
    pub kernel: KernelKind,
    pub gamma: Gamma,
    pub degree: u32,
    pub coef0: f64,
    pub tol: f64,
    /// Maximum SMO sweeps; zero or negative runs until convergence.
    pub max_iter: i64,
    pub random_state: Option<u64>,
}

impl Default for SvcParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelKind::Rbf,
            gamma: Gamma::default(),
            degree: 3,
            coef0: 0.0,
            tol: 1e-3,
            max_iter: 1000,
            random_state: None,
        }
    }
}

impl Hyperparameters for SvcParams {
    fn validate(&self, _n_samples: usize, _n_features: usize) -> std::result::Result<(), String> {
        if !self.c.is_finite() || self.c <= 0.0 {
            return Err(format!("C must be positive, got {}", self.c));
        }
        if !self.tol.is_finite() || self.tol <= 0.0 {
            return Err(format!("tol must be positive, got {}", self.tol));
        }
        self.gamma.check()
    }

    fn seed_default(&mut self, random_state: u64) {
        self.random_state.get_or_insert(random_state);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kernel {
    kind: KernelKind,
    gamma: f64,
    degree: u32,
    coef0: f64,
}

impl Kernel {
    pub fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self.kind {
            KernelKind::Linear => a.dot(&b),
            KernelKind::Poly => (self.gamma * a.dot(&b) + self.coef0).powi(self.degree as i32),
            KernelKind::Rbf => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v).powi(2)).sum();
                (-self.gamma * sq).exp()
            }
            KernelKind::Sigmoid => (self.gamma * a.dot(&b) + self.coef0).tanh(),
        }
    }
}

/// One fitted two-class machine; positive decisions mean the positive class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BinaryMachine {
    support: Array2<f64>,
    /// `alpha_i * y_i` per support vector.
    dual_coef: Vec<f64>,
    bias: f64,
}

impl BinaryMachine {
    fn decision(&self, kernel: &Kernel, row: ArrayView1<f64>) -> f64 {
        self.support
            .rows()
            .into_iter()
            .zip(&self.dual_coef)
            .map(|(sv, coef)| coef * kernel.eval(sv, row))
            .sum::<f64>()
            + self.bias
    }

    fn train(
        x: &Array2<f64>,
        signs: &[f64],
        kernel: &Kernel,
        params: &SvcParams,
        rng: &mut StdRng,
    ) -> Self {
        let n = x.nrows();
        let c = params.c;
        let tol = params.tol;
        let max_sweeps = usize::try_from(params.max_iter)
            .ok()
            .filter(|&m| m > 0)
            .unwrap_or(UNBOUNDED_SWEEPS);

        let k = |i: usize, j: usize| kernel.eval(x.row(i), x.row(j));
        let mut alpha = vec![0.0; n];
        let mut bias = 0.0;
        let output = |alpha: &[f64], bias: f64, i: usize| -> f64 {
            alpha
                .iter()
                .enumerate()
                .filter(|(_, a)| **a > 0.0)
                .map(|(m, a)| a * signs[m] * k(m, i))
                .sum::<f64>()
                + bias
        };

        let mut quiet = 0;
        let mut sweeps = 0;
        while quiet < 3 && sweeps < max_sweeps && n > 1 {
            sweeps += 1;
            let mut changed = 0;
            for i in 0..n {
                let e_i = output(&alpha, bias, i) - signs[i];
                let violates = (signs[i] * e_i < -tol && alpha[i] < c)
                    || (signs[i] * e_i > tol && alpha[i] > 0.0);
                if !violates {
                    continue;
                }

                let mut j = rng.gen_range(0..n - 1);
                if j >= i {
                    j += 1;
                }
                let e_j = output(&alpha, bias, j) - signs[j];
                let (ai_old, aj_old) = (alpha[i], alpha[j]);

                let (lo, hi) = if signs[i] != signs[j] {
                    ((aj_old - ai_old).max(0.0), (c + aj_old - ai_old).min(c))
                } else {
                    ((ai_old + aj_old - c).max(0.0), (ai_old + aj_old).min(c))
                };
                if hi - lo < 1e-12 {
                    continue;
                }

                let (kii, kjj, kij) = (k(i, i), k(j, j), k(i, j));
                let eta = 2.0 * kij - kii - kjj;
                if eta >= 0.0 {
                    continue;
                }

                let aj = (aj_old - signs[j] * (e_i - e_j) / eta).clamp(lo, hi);
                if (aj - aj_old).abs() < 1e-5 {
                    continue;
                }
                let ai = ai_old + signs[i] * signs[j] * (aj_old - aj);
                alpha[i] = ai;
                alpha[j] = aj;

                let b1 = bias - e_i - signs[i] * (ai - ai_old) * kii - signs[j] * (aj - aj_old) * kij;
                let b2 = bias - e_j - signs[i] * (ai - ai_old) * kij - signs[j] * (aj - aj_old) * kjj;
                bias = if ai > 0.0 && ai < c {
                    b1
                } else if aj > 0.0 && aj < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };
                changed += 1;
            }
            if changed == 0 {
                quiet += 1;
            } else {
                quiet = 0;
            }
        }

        let support_rows: Vec<usize> = (0..n).filter(|&i| alpha[i] > ALPHA_EPSILON).collect();
        debug!(sweeps, support_vectors = support_rows.len(), "SMO finished");
        Self {
            support: x.select(Axis(0), &support_rows),
            dual_coef: support_rows.iter().map(|&i| alpha[i] * signs[i]).collect(),
            bias,
        }
    }

    fn weights(&self) -> Array1<f64> {
        self.support.t().dot(&Array1::from(self.dual_coef.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Svc {
    classes: Vec<f64>,
    kernel: Kernel,
    /// One machine for two classes, otherwise one per class.
    machines: Vec<BinaryMachine>,
}

impl Svc {
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Primal weights per machine; only defined for the linear kernel.
    pub fn coefficients(&self) -> Option<Array2<f64>> {
        if self.kernel.kind != KernelKind::Linear {
            return None;
        }
        let d = self.machines.first().map_or(0, |m| m.support.ncols());
        let mut coef = Array2::zeros((self.machines.len(), d));
        for (mut row, machine) in coef.rows_mut().into_iter().zip(&self.machines) {
            if machine.support.nrows() > 0 {
                row.assign(&machine.weights());
            }
        }
        Some(coef)
    }
}

impl Estimator for Svc {
    type Params = SvcParams;

    fn fit(params: Self::Params, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let (classes, labels) = class_indices(y);
        if classes.len() < 2 {
            return Err(TabforgeError::TrainingFailed(format!(
                "SVC needs at least two classes, found {}",
                classes.len()
            )));
        }

        let kernel = Kernel {
            kind: params.kernel,
            gamma: params.gamma.resolve(x),
            degree: params.degree,
            coef0: params.coef0,
        };
        let mut rng = StdRng::seed_from_u64(params.random_state.unwrap_or_default());

        let positives: Vec<usize> = if classes.len() == 2 {
            vec![1]
        } else {
            (0..classes.len()).collect()
        };
        let machines = positives
            .into_iter()
            .map(|positive| {
                let signs: Vec<f64> = labels
                    .iter()
                    .map(|&l| if l == positive { 1.0 } else { -1.0 })
                    .collect();
                BinaryMachine::train(x, &signs, &kernel, &params, &mut rng)
            })
            .collect();

        Ok(Self {
            classes,
            kernel,
            machines,
        })
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                if let [machine] = self.machines.as_slice() {
                    let positive = machine.decision(&self.kernel, row) > 0.0;
                    self.classes[usize::from(positive)]
                } else {
                    let scores = self.machines.iter().map(|m| m.decision(&self.kernel, row));
                    self.classes[argmax(scores)]
                }
            })
            .collect()
    }
}
