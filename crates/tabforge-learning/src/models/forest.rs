//! Bagged ensembles of CART trees.

use super::tree::{
    Criterion, MaxFeatures, Targets, Tree, TreeSettings, resolve_criterion, validate_growth,
};
use super::{Estimator, Hyperparameters, argmax, class_indices};
use crate::error::Result;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub criterion: Option<Criterion>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Defaults to `sqrt` for classifiers and every feature for regressors.
    pub max_features: Option<MaxFeatures>,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            criterion: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            random_state: None,
        }
    }
}

impl Hyperparameters for RandomForestParams {
    fn validate(&self, _n_samples: usize, n_features: usize) -> std::result::Result<(), String> {
        if self.n_estimators == 0 {
            return Err("n_estimators must be at least 1".to_string());
        }
        validate_growth(self.max_depth, self.min_samples_split, self.min_samples_leaf)?;
        if let Some(max_features) = &self.max_features {
            max_features.resolve(n_features)?;
        }
        Ok(())
    }

    fn seed_default(&mut self, random_state: u64) {
        self.random_state.get_or_insert(random_state);
    }
}

/// Trees and their averaged importances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ensemble {
    trees: Vec<Tree>,
    importances: Vec<f64>,
}

impl Ensemble {
    fn fit(
        params: &RandomForestParams,
        x: &Array2<f64>,
        targets: Targets<'_>,
        criterion: Criterion,
        default_max_features: MaxFeatures,
    ) -> Self {
        let (n, d) = x.dim();
        let max_features = params
            .max_features
            .as_ref()
            .unwrap_or(&default_max_features)
            .resolve(d)
            .unwrap_or(d);
        let settings = TreeSettings {
            criterion,
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features,
        };

        let mut rng = StdRng::seed_from_u64(params.random_state.unwrap_or_default());
        let trees: Vec<Tree> = (0..params.n_estimators)
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.next_u64());
                let rows: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| tree_rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                Tree::grow(x, targets, rows, &settings, &mut tree_rng)
            })
            .collect();

        let mut importances = vec![0.0; d];
        for tree in &trees {
            for (total, v) in importances.iter_mut().zip(tree.importances()) {
                *total += v;
            }
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        }

        debug!(trees = trees.len(), max_features, "Random forest fitted");
        Self { trees, importances }
    }

    /// Leaf values of every tree averaged for one row.
    fn mean_leaf(&self, row: ndarray::ArrayView1<f64>, width: usize) -> Vec<f64> {
        let mut acc = vec![0.0; width];
        for tree in &self.trees {
            for (a, v) in acc.iter_mut().zip(tree.leaf_value(row)) {
                *a += v;
            }
        }
        let n = self.trees.len().max(1) as f64;
        acc.iter_mut().for_each(|a| *a /= n);
        acc
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    classes: Vec<f64>,
    ensemble: Ensemble,
}

impl RandomForestClassifier {
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.ensemble.importances
    }

    pub fn n_estimators(&self) -> usize {
        self.ensemble.trees.len()
    }
}

impl Estimator for RandomForestClassifier {
    type Params = RandomForestParams;

    fn fit(params: Self::Params, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let criterion = resolve_criterion(params.criterion, true, "RandomForestClassifier")?;
        let (classes, labels) = class_indices(y);
        let targets = Targets::Classes {
            labels: &labels,
            n_classes: classes.len(),
        };
        let ensemble = Ensemble::fit(
            &params,
            x,
            targets,
            criterion,
            MaxFeatures::Named("sqrt".to_string()),
        );
        Ok(Self { classes, ensemble })
    }

    /// Majority of averaged class proportions.
    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                let proba = self.ensemble.mean_leaf(row, self.classes.len());
                self.classes[argmax(proba)]
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    ensemble: Ensemble,
}

impl RandomForestRegressor {
    pub fn feature_importances(&self) -> &[f64] {
        &self.ensemble.importances
    }
}

impl Estimator for RandomForestRegressor {
    type Params = RandomForestParams;

    fn fit(params: Self::Params, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let criterion = resolve_criterion(params.criterion, false, "RandomForestRegressor")?;
        let values = y.to_vec();
        let ensemble = Ensemble::fit(
            &params,
            x,
            Targets::Values(&values),
            criterion,
            MaxFeatures::Fraction(1.0),
        );
        Ok(Self { ensemble })
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| self.ensemble.mean_leaf(row, 1)[0])
            .collect()
    }
}
