//! CART decision trees.
//!
//! Trees are grown depth-first from an explicit work stack. At each node the
//! candidate features are scanned in sorted order and the threshold with the
//! lowest weighted child impurity wins; thresholds sit halfway between
//! neighbouring distinct values. Importances are the total impurity decrease
//! per feature, normalized to sum to one.

use super::{Estimator, Hyperparameters, argmax, class_indices};
use crate::error::{Result, TabforgeError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Gini,
    #[serde(alias = "log_loss")]
    Entropy,
    SquaredError,
    AbsoluteError,
}

impl Criterion {
    fn for_classification(self) -> bool {
        matches!(self, Self::Gini | Self::Entropy)
    }
}

/// Number of features examined at each split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxFeatures {
    Count(usize),
    Fraction(f64),
    /// `"sqrt"` or `"log2"`.
    Named(String),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> std::result::Result<usize, String> {
        let d = n_features as f64;
        let k = match self {
            Self::Count(k) if (1..=n_features).contains(k) => *k,
            Self::Count(k) => {
                return Err(format!(
                    "max_features must be between 1 and {n_features}, got {k}"
                ));
            }
            Self::Fraction(f) if *f > 0.0 && *f <= 1.0 => (f * d).floor() as usize,
            Self::Fraction(f) => {
                return Err(format!("max_features fraction must be in (0, 1], got {f}"));
            }
            Self::Named(name) => match name.as_str() {
                "sqrt" => d.sqrt().floor() as usize,
                "log2" => d.log2().floor() as usize,
                other => {
                    return Err(format!(
                        "max_features must be a count, a fraction, 'sqrt' or 'log2', got '{other}'"
                    ));
                }
            },
        };
        Ok(k.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionTreeParams {
    /// Defaults to `gini` for classifiers and `squared_error` for regressors.
    pub criterion: Option<Criterion>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: Option<MaxFeatures>,
    pub random_state: Option<u64>,
}

impl Default for DecisionTreeParams {
    fn default() -> Self {
        Self {
            criterion: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
        }
    }
}

impl Hyperparameters for DecisionTreeParams {
    fn validate(&self, _n_samples: usize, n_features: usize) -> std::result::Result<(), String> {
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

pub(crate) fn validate_growth(
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
) -> std::result::Result<(), String> {
    if max_depth == Some(0) {
        return Err("max_depth must be at least 1".to_string());
    }
    if min_samples_split < 2 {
        return Err(format!(
            "min_samples_split must be at least 2, got {min_samples_split}"
        ));
    }
    if min_samples_leaf == 0 {
        return Err("min_samples_leaf must be at least 1".to_string());
    }
    Ok(())
}

/// Pick the task's default criterion or reject one meant for the other task.
pub(crate) fn resolve_criterion(
    criterion: Option<Criterion>,
    classification: bool,
    model: &str,
) -> Result<Criterion> {
    match criterion {
        None if classification => Ok(Criterion::Gini),
        None => Ok(Criterion::SquaredError),
        Some(c) if c.for_classification() == classification => Ok(c),
        Some(c) => Err(TabforgeError::InvalidHyperparameters {
            model: model.to_string(),
            message: format!("criterion {c:?} does not apply to this model"),
        }),
    }
}

/// Resolved growth limits for one tree.
#[derive(Debug, Clone)]
pub(crate) struct TreeSettings {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: usize,
}

/// What the tree is fitted to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Targets<'a> {
    Classes { labels: &'a [usize], n_classes: usize },
    Values(&'a [f64]),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    /// Class proportions, or a single regression value.
    Leaf { value: Vec<f64> },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    child_impurity: f64,
}

struct Grower<'a> {
    x: &'a Array2<f64>,
    targets: Targets<'a>,
    settings: &'a TreeSettings,
    rng: &'a mut StdRng,
}

impl Tree {
    /// Grow a tree on the given training rows (which may repeat).
    pub(crate) fn grow(
        x: &Array2<f64>,
        targets: Targets<'_>,
        rows: Vec<usize>,
        settings: &TreeSettings,
        rng: &mut StdRng,
    ) -> Self {
        let mut grower = Grower {
            x,
            targets,
            settings,
            rng,
        };
        let mut importances = vec![0.0; x.ncols()];
        let mut nodes = vec![Node::Leaf { value: Vec::new() }];
        let mut stack = vec![(0usize, rows, 0usize)];

        while let Some((id, rows, depth)) = stack.pop() {
            let impurity = grower.impurity(&rows);
            let split = if grower.can_split(rows.len(), depth, impurity) {
                grower.best_split(&rows)
            } else {
                None
            };

            match split {
                None => nodes[id] = Node::Leaf {
                    value: grower.leaf_value(&rows),
                },
                Some(split) => {
                    let decrease = (impurity - split.child_impurity).max(0.0);
                    importances[split.feature] += rows.len() as f64 * decrease;

                    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                        .into_iter()
                        .partition(|&r| x[[r, split.feature]] <= split.threshold);
                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf { value: Vec::new() });
                    nodes.push(Node::Leaf { value: Vec::new() });
                    nodes[id] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left,
                        right,
                    };
                    stack.push((right, right_rows, depth + 1));
                    stack.push((left, left_rows, depth + 1));
                }
            }
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        Self { nodes, importances }
    }

    /// Value of the leaf `row` falls into.
    pub(crate) fn leaf_value(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub(crate) fn importances(&self) -> &[f64] {
        &self.importances
    }

    pub(crate) fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

impl Grower<'_> {
    fn can_split(&self, n: usize, depth: usize, impurity: f64) -> bool {
        let s = self.settings;
        s.max_depth.is_none_or(|max| depth < max)
            && n >= s.min_samples_split
            && n >= 2 * s.min_samples_leaf
            && impurity > 1e-12
    }

    fn class_counts(&self, rows: &[usize], labels: &[usize], n_classes: usize) -> Vec<f64> {
        let mut counts = vec![0.0; n_classes];
        for &r in rows {
            counts[labels[r]] += 1.0;
        }
        counts
    }

    fn impurity(&self, rows: &[usize]) -> f64 {
        match self.targets {
            Targets::Classes { labels, n_classes } => {
                let counts = self.class_counts(rows, labels, n_classes);
                class_impurity(&counts, rows.len() as f64, self.settings.criterion)
            }
            Targets::Values(values) => {
                let ys: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
                value_impurity(&ys, self.settings.criterion)
            }
        }
    }

    fn leaf_value(&self, rows: &[usize]) -> Vec<f64> {
        match self.targets {
            Targets::Classes { labels, n_classes } => {
                let total = rows.len().max(1) as f64;
                self.class_counts(rows, labels, n_classes)
                    .into_iter()
                    .map(|c| c / total)
                    .collect()
            }
            Targets::Values(values) => {
                let ys: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
                let value = match self.settings.criterion {
                    Criterion::AbsoluteError => median(&ys),
                    _ => mean(&ys),
                };
                vec![value]
            }
        }
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let d = self.x.ncols();
        if self.settings.max_features >= d {
            (0..d).collect()
        } else {
            rand::seq::index::sample(&mut *self.rng, d, self.settings.max_features).into_vec()
        }
    }

    fn best_split(&mut self, rows: &[usize]) -> Option<BestSplit> {
        let mut best: Option<BestSplit> = None;
        for feature in self.candidate_features() {
            let mut sorted = rows.to_vec();
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            if let Some((position, child_impurity)) = self.scan_feature(feature, &sorted)
                && best
                    .as_ref()
                    .is_none_or(|b| child_impurity < b.child_impurity)
            {
                let lo = self.x[[sorted[position - 1], feature]];
                let hi = self.x[[sorted[position], feature]];
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    child_impurity,
                });
            }
        }
        best
    }

    /// Best cut position in `sorted` (rows `..pos` go left) and its weighted
    /// child impurity.
    fn scan_feature(&self, feature: usize, sorted: &[usize]) -> Option<(usize, f64)> {
        let n = sorted.len();
        let n_f = n as f64;
        let min_leaf = self.settings.min_samples_leaf;
        let criterion = self.settings.criterion;
        let value_at = |i: usize| self.x[[sorted[i], feature]];
        let mut best: Option<(usize, f64)> = None;
        let mut consider = |pos: usize, child: f64| {
            if best.is_none_or(|(_, b)| child < b) {
                best = Some((pos, child));
            }
        };

        match self.targets {
            Targets::Classes { labels, n_classes } => {
                let mut left = vec![0.0; n_classes];
                let mut right = self.class_counts(sorted, labels, n_classes);
                for pos in 1..n {
                    let moved = labels[sorted[pos - 1]];
                    left[moved] += 1.0;
                    right[moved] -= 1.0;
                    if pos < min_leaf || n - pos < min_leaf || value_at(pos - 1) >= value_at(pos) {
                        continue;
                    }
                    let (nl, nr) = (pos as f64, (n - pos) as f64);
                    let child = (nl * class_impurity(&left, nl, criterion)
                        + nr * class_impurity(&right, nr, criterion))
                        / n_f;
                    consider(pos, child);
                }
            }
            Targets::Values(values) => {
                let ys: Vec<f64> = sorted.iter().map(|&r| values[r]).collect();
                let (mut sum_l, mut sq_l) = (0.0, 0.0);
                let sum_all: f64 = ys.iter().sum();
                let sq_all: f64 = ys.iter().map(|v| v * v).sum();
                for pos in 1..n {
                    let moved = ys[pos - 1];
                    sum_l += moved;
                    sq_l += moved * moved;
                    if pos < min_leaf || n - pos < min_leaf || value_at(pos - 1) >= value_at(pos) {
                        continue;
                    }
                    let (nl, nr) = (pos as f64, (n - pos) as f64);
                    let child = match criterion {
                        Criterion::AbsoluteError => {
                            (nl * mean_absolute_deviation(&ys[..pos])
                                + nr * mean_absolute_deviation(&ys[pos..]))
                                / n_f
                        }
                        _ => {
                            let var_l = (sq_l / nl - (sum_l / nl).powi(2)).max(0.0);
                            let (sum_r, sq_r) = (sum_all - sum_l, sq_all - sq_l);
                            let var_r = (sq_r / nr - (sum_r / nr).powi(2)).max(0.0);
                            (nl * var_l + nr * var_r) / n_f
                        }
                    };
                    consider(pos, child);
                }
            }
        }
        best
    }
}

fn class_impurity(counts: &[f64], total: f64, criterion: Criterion) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    match criterion {
        Criterion::Entropy => counts
            .iter()
            .filter(|&&c| c > 0.0)
            .map(|&c| {
                let p = c / total;
                -p * p.log2()
            })
            .sum(),
        _ => 1.0 - counts.iter().map(|&c| (c / total).powi(2)).sum::<f64>(),
    }
}

fn value_impurity(ys: &[f64], criterion: Criterion) -> f64 {
    match criterion {
        Criterion::AbsoluteError => mean_absolute_deviation(ys),
        _ => {
            let m = mean(ys);
            ys.iter().map(|v| (v - m).powi(2)).sum::<f64>() / ys.len().max(1) as f64
        }
    }
}

fn mean(ys: &[f64]) -> f64 {
    ys.iter().sum::<f64>() / ys.len().max(1) as f64
}

fn median(ys: &[f64]) -> f64 {
    if ys.is_empty() {
        return 0.0;
    }
    let mut sorted = ys.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn mean_absolute_deviation(ys: &[f64]) -> f64 {
    let m = median(ys);
    ys.iter().map(|v| (v - m).abs()).sum::<f64>() / ys.len().max(1) as f64
}

fn tree_settings(
    params: &DecisionTreeParams,
    criterion: Criterion,
    n_features: usize,
) -> TreeSettings {
    TreeSettings {
        criterion,
        max_depth: params.max_depth,
        min_samples_split: params.min_samples_split,
        min_samples_leaf: params.min_samples_leaf,
        max_features: params
            .max_features
            .as_ref()
            .and_then(|m| m.resolve(n_features).ok())
            .unwrap_or(n_features),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    classes: Vec<f64>,
    tree: Tree,
}

impl DecisionTreeClassifier {
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn feature_importances(&self) -> &[f64] {
        self.tree.importances()
    }

    pub fn depth(&self) -> usize {
        self.tree.depth()
    }
}

impl Estimator for DecisionTreeClassifier {
    type Params = DecisionTreeParams;

    fn fit(params: Self::Params, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let criterion = resolve_criterion(params.criterion, true, "DecisionTreeClassifier")?;
        let settings = tree_settings(&params, criterion, x.ncols());
        let (classes, labels) = class_indices(y);
        let mut rng = StdRng::seed_from_u64(params.random_state.unwrap_or_default());

        let targets = Targets::Classes {
            labels: &labels,
            n_classes: classes.len(),
        };
        let tree = Tree::grow(x, targets, (0..x.nrows()).collect(), &settings, &mut rng);
        Ok(Self { classes, tree })
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| self.classes[argmax(self.tree.leaf_value(row).iter().copied())])
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    tree: Tree,
}

impl DecisionTreeRegressor {
    pub fn feature_importances(&self) -> &[f64] {
        self.tree.importances()
    }

    pub fn n_nodes(&self) -> usize {
        self.tree.n_nodes()
    }
}

impl Estimator for DecisionTreeRegressor {
    type Params = DecisionTreeParams;

    fn fit(params: Self::Params, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let criterion = resolve_criterion(params.criterion, false, "DecisionTreeRegressor")?;
        let settings = tree_settings(&params, criterion, x.ncols());
        let mut rng = StdRng::seed_from_u64(params.random_state.unwrap_or_default());

        let values = y.to_vec();
        let tree = Tree::grow(
            x,
            Targets::Values(&values),
            (0..x.nrows()).collect(),
            &settings,
            &mut rng,
        );
        Ok(Self { tree })
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| self.tree.leaf_value(row)[0])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classifier_learns_xor() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 1.0, 1.0, 0.0];
        let model = DecisionTreeClassifier::fit(DecisionTreeParams::default(), &x, &y).unwrap();
        assert_eq!(model.predict(&x), y);
        assert_eq!(model.depth(), 2);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = Array2::from_shape_fn((16, 1), |(r, _)| r as f64);
        let y = Array1::from_iter((0..16).map(|r| (r % 2) as f64));
        let params = DecisionTreeParams {
            max_depth: Some(2),
            ..Default::default()
        };
        let model = DecisionTreeClassifier::fit(params, &x, &y).unwrap();
        assert!(model.depth() <= 2);
    }

    #[test]
    fn test_threshold_between_values() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![5.0, 5.0, 9.0, 9.0];
        let model = DecisionTreeRegressor::fit(DecisionTreeParams::default(), &x, &y).unwrap();
        assert_eq!(model.predict(&array![[2.4], [2.6]]), array![5.0, 9.0]);
        assert_eq!(model.n_nodes(), 3);
    }

    #[test]
    fn test_importances_follow_informative_feature() {
        // Column 0 is noise, column 1 decides the class
        let x = array![
            [3.0, 0.0],
            [1.0, 0.0],
            [2.0, 0.0],
            [3.0, 1.0],
            [1.0, 1.0],
            [2.0, 1.0]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let model = DecisionTreeClassifier::fit(DecisionTreeParams::default(), &x, &y).unwrap();
        assert_eq!(model.feature_importances(), &[0.0, 1.0]);
    }

    #[test]
    fn test_min_samples_leaf() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 10.0, 10.0, 10.0];
        let params = DecisionTreeParams {
            min_samples_leaf: 2,
            ..Default::default()
        };
        let model = DecisionTreeRegressor::fit(params, &x, &y).unwrap();
        // The only legal cut is in the middle
        assert_eq!(model.predict(&array![[1.0], [4.0]]), array![5.0, 10.0]);
    }

    #[test]
    fn test_absolute_error_uses_median() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = array![1.0, 2.0, 30.0];
        let params = DecisionTreeParams {
            criterion: Some(Criterion::AbsoluteError),
            ..Default::default()
        };
        let model = DecisionTreeRegressor::fit(params, &x, &y).unwrap();
        assert_eq!(model.predict(&array![[1.0]]), array![2.0]);
    }

    #[test]
    fn test_criterion_must_match_task() {
        let x = array![[1.0], [2.0]];
        let y = array![0.0, 1.0];
        let params = DecisionTreeParams {
            criterion: Some(Criterion::Gini),
            ..Default::default()
        };
        let err = DecisionTreeRegressor::fit(params, &x, &y).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_HYPERPARAMETERS");
    }

    #[test]
    fn test_max_features_parsing() {
        let parse = |v: serde_json::Value| -> MaxFeatures { serde_json::from_value(v).unwrap() };
        assert_eq!(parse(serde_json::json!(3)).resolve(10), Ok(3));
        assert_eq!(parse(serde_json::json!(0.5)).resolve(10), Ok(5));
        assert_eq!(parse(serde_json::json!("sqrt")).resolve(10), Ok(3));
        assert_eq!(parse(serde_json::json!("log2")).resolve(10), Ok(3));
        assert!(parse(serde_json::json!(11)).resolve(10).is_err());
        assert!(parse(serde_json::json!("half")).resolve(10).is_err());

        let params: DecisionTreeParams =
            serde_json::from_value(serde_json::json!({"criterion": "entropy", "max_depth": 4}))
                .unwrap();
        assert_eq!(params.criterion, Some(Criterion::Entropy));
        assert!(params.validate(10, 2).is_ok());
        assert!(
            DecisionTreeParams {
                min_samples_split: 1,
                ..Default::default()
            }
            .validate(10, 2)
            .is_err()
        );
    }
}
