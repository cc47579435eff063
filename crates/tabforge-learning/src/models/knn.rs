//! Brute-force k-nearest neighbors.

use super::{Estimator, Hyperparameters, class_indices};
use crate::error::Result;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weights {
    #[default]
    Uniform,
    Distance,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KNeighborsParams {
    pub n_neighbors: usize,
    pub weights: Weights,
    /// Minkowski power: 1 for Manhattan, 2 for Euclidean.
    pub p: u32,
}

impl Default for KNeighborsParams {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: Weights::Uniform,
            p: 2,
        }
    }
}

impl Hyperparameters for KNeighborsParams {
    fn validate(&self, n_samples: usize, _n_features: usize) -> std::result::Result<(), String> {
        if self.n_neighbors == 0 {
            return Err("n_neighbors must be at least 1".to_string());
        }
        if self.n_neighbors > n_samples {
            return Err(format!(
                "n_neighbors ({}) is larger than the number of training rows ({n_samples})",
                self.n_neighbors
            ));
        }
        if !matches!(self.p, 1 | 2) {
            return Err(format!("p must be 1 or 2, got {}", self.p));
        }
        Ok(())
    }
}

/// Training rows and the neighbor query settings shared by both variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NeighborIndex {
    x: Array2<f64>,
    n_neighbors: usize,
    weights: Weights,
    p: u32,
}

impl NeighborIndex {
    fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(u, v)| (u - v).abs());
        match self.p {
            1 => diffs.sum(),
            _ => diffs.map(|d| d * d).sum::<f64>().sqrt(),
        }
    }

    /// `(training row, weight)` of the nearest neighbors of `query`.
    ///
    /// With distance weighting, exact matches take all the weight.
    fn neighbors(&self, query: ArrayView1<f64>) -> Vec<(usize, f64)> {
        let mut dists: Vec<(usize, f64)> = self
            .x
            .rows()
            .into_iter()
            .enumerate()
            .map(|(idx, row)| (idx, self.distance(row, query)))
            .collect();
        dists.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        dists.truncate(self.n_neighbors);

        match self.weights {
            Weights::Uniform => dists.into_iter().map(|(idx, _)| (idx, 1.0)).collect(),
            Weights::Distance => {
                if dists.iter().any(|(_, d)| *d == 0.0) {
                    dists
                        .into_iter()
                        .filter(|(_, d)| *d == 0.0)
                        .map(|(idx, _)| (idx, 1.0))
                        .collect()
                } else {
                    dists.into_iter().map(|(idx, d)| (idx, 1.0 / d)).collect()
                }
            }
        }
    }
}

impl From<KNeighborsParams> for NeighborIndex {
    fn from(params: KNeighborsParams) -> Self {
        Self {
            x: Array2::zeros((0, 0)),
            n_neighbors: params.n_neighbors,
            weights: params.weights,
            p: params.p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNeighborsRegressor {
    index: NeighborIndex,
    y: Array1<f64>,
}

impl Estimator for KNeighborsRegressor {
    type Params = KNeighborsParams;

    fn fit(params: Self::Params, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let mut index = NeighborIndex::from(params);
        index.x = x.clone();
        Ok(Self { index, y: y.clone() })
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                let neighbors = self.index.neighbors(row);
                let total: f64 = neighbors.iter().map(|(_, w)| w).sum();
                neighbors
                    .iter()
                    .map(|&(idx, w)| w * self.y[idx])
                    .sum::<f64>()
                    / total
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNeighborsClassifier {
    index: NeighborIndex,
    classes: Vec<f64>,
    labels: Vec<usize>,
}

impl KNeighborsClassifier {
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }
}

impl Estimator for KNeighborsClassifier {
    type Params = KNeighborsParams;

    fn fit(params: Self::Params, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let (classes, labels) = class_indices(y);
        let mut index = NeighborIndex::from(params);
        index.x = x.clone();
        Ok(Self {
            index,
            classes,
            labels,
        })
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                let mut votes = vec![0.0; self.classes.len()];
                for (idx, w) in self.index.neighbors(row) {
                    votes[self.labels[idx]] += w;
                }
                // Ties go to the smallest class
                self.classes[super::argmax(votes)]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regressor_averages_neighbors() {
        let x = array![[0.0], [1.0], [2.0], [10.0]];
        let y = array![0.0, 2.0, 4.0, 100.0];
        let params = KNeighborsParams {
            n_neighbors: 3,
            ..Default::default()
        };
        let model = KNeighborsRegressor::fit(params, &x, &y).unwrap();
        assert_eq!(model.predict(&array![[1.0]]), array![2.0]);
    }

    #[test]
    fn test_distance_weights_exact_match() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 10.0, 20.0];
        let params = KNeighborsParams {
            n_neighbors: 3,
            weights: Weights::Distance,
            p: 2,
        };
        let model = KNeighborsRegressor::fit(params, &x, &y).unwrap();
        assert_eq!(model.predict(&array![[1.0]]), array![10.0]);

        // 0.5 away from 0 and 1, 1.5 away from 2
        let pred = model.predict(&array![[0.5]])[0];
        let expected = (2.0 * 0.0 + 2.0 * 10.0 + 20.0 / 1.5) / (2.0 + 2.0 + 1.0 / 1.5);
        assert!((pred - expected).abs() < 1e-12);
    }

    #[test]
    fn test_classifier_majority_vote() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [5.0, 5.0], [5.0, 6.0]];
        let y = array![1.0, 1.0, 1.0, 2.0, 2.0];
        let params = KNeighborsParams {
            n_neighbors: 3,
            p: 1,
            ..Default::default()
        };
        let model = KNeighborsClassifier::fit(params, &x, &y).unwrap();
        assert_eq!(model.predict(&array![[0.5, 0.5], [5.0, 5.5]]), array![1.0, 2.0]);
    }

    #[test]
    fn test_classifier_tie_goes_to_smallest_class() {
        let x = array![[-1.0], [1.0]];
        let y = array![4.0, 3.0];
        let params = KNeighborsParams {
            n_neighbors: 2,
            ..Default::default()
        };
        let model = KNeighborsClassifier::fit(params, &x, &y).unwrap();
        assert_eq!(model.predict(&array![[0.0]]), array![3.0]);
    }

    #[test]
    fn test_validation() {
        let params = KNeighborsParams::default();
        assert!(params.validate(3, 1).is_err());
        assert!(params.validate(5, 1).is_ok());

        let params = KNeighborsParams {
            p: 3,
            ..Default::default()
        };
        assert!(params.validate(10, 1).is_err());

        let parsed: KNeighborsParams =
            serde_json::from_value(serde_json::json!({"weights": "distance"})).unwrap();
        assert_eq!(parsed.weights, Weights::Distance);
    }
}
