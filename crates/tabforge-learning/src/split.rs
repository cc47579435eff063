//! Train/test splitting.
//!
//! Splits are computed over row indices and then gathered, so the same
//! indices can be applied to the raw feature table and to the target.

use crate::error::{Result, TabforgeError};
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::debug;

/// Row indices of the two partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// A gathered split.
#[derive(Debug, Clone)]
pub struct SplitData {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
}

/// Seeded train/test splitter.
pub struct Splitter;

impl Splitter {
    /// Number of test rows for `n` rows: `ceil(test_size * n)`.
    pub fn test_count(n: usize, test_size: f64) -> usize {
        (test_size * n as f64).ceil() as usize
    }

    /// Partition row indices of `y`.
    ///
    /// With `stratify`, every class contributes test rows in proportion to
    /// its size, rounded by largest remainder. Each class (or the whole
    /// index range, without stratification) is shuffled with a `StdRng`
    /// seeded from `random_state`.
    ///
    /// # Errors
    ///
    /// [`TabforgeError::InvalidConfig`] when either partition would be empty.
    pub fn split_indices(
        y: &[f64],
        test_size: f64,
        random_state: u64,
        stratify: bool,
    ) -> Result<SplitIndices> {
        let n = y.len();
        let n_test = Self::test_count(n, test_size);
        if n_test == 0 || n_test >= n {
            return Err(TabforgeError::InvalidConfig(format!(
                "test_size {test_size} on {n} rows leaves {n_test} test and {} train rows; both need at least one",
                n.saturating_sub(n_test)
            )));
        }

        let mut rng = StdRng::seed_from_u64(random_state);

        let (mut train, mut test) = if stratify {
            Self::stratified(y, n_test, &mut rng)
        } else {
            let mut indices: Vec<usize> = (0..n).collect();
            indices.shuffle(&mut rng);
            let train = indices.split_off(n_test);
            (train, indices)
        };

        train.shuffle(&mut rng);
        test.shuffle(&mut rng);
        debug!(train = train.len(), test = test.len(), stratify, "Split rows");
        Ok(SplitIndices { train, test })
    }

    fn stratified(y: &[f64], n_test: usize, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
        let n = y.len();
        let mut classes: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (idx, label) in y.iter().enumerate() {
            classes.entry(label.to_bits()).or_default().push(idx);
        }

        // Largest-remainder allocation of the test rows.
        let quotas: Vec<f64> = classes
            .values()
            .map(|rows| n_test as f64 * rows.len() as f64 / n as f64)
            .collect();
        let mut allocation: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();
        let mut remaining = n_test - allocation.iter().sum::<usize>();

        let mut by_remainder: Vec<usize> = (0..quotas.len()).collect();
        by_remainder.sort_by(|&a, &b| {
            let ra = quotas[a] - quotas[a].floor();
            let rb = quotas[b] - quotas[b].floor();
            rb.total_cmp(&ra).then(a.cmp(&b))
        });
        for class in by_remainder {
            if remaining == 0 {
                break;
            }
            allocation[class] += 1;
            remaining -= 1;
        }

        let mut train = Vec::with_capacity(n - n_test);
        let mut test = Vec::with_capacity(n_test);
        for (rows, take) in classes.into_values().zip(allocation) {
            let mut rows = rows;
            rows.shuffle(rng);
            let rest = rows.split_off(take.min(rows.len()));
            test.extend(rows);
            train.extend(rest);
        }
        (train, test)
    }

    /// Split a feature matrix and target together.
    pub fn split(
        x: &Array2<f64>,
        y: &Array1<f64>,
        test_size: f64,
        random_state: u64,
        stratify: bool,
    ) -> Result<SplitData> {
        let y_values = y.to_vec();
        let indices = Self::split_indices(&y_values, test_size, random_state, stratify)?;
        Ok(Self::gather(x, y, &indices))
    }

    /// Gather the rows of `indices` from `x` and `y`.
    pub fn gather(x: &Array2<f64>, y: &Array1<f64>, indices: &SplitIndices) -> SplitData {
        SplitData {
            x_train: x.select(Axis(0), &indices.train),
            x_test: x.select(Axis(0), &indices.test),
            y_train: y.select(Axis(0), &indices.train),
            y_test: y.select(Axis(0), &indices.test),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_counts() {
        let y: Vec<f64> = (0..10).map(f64::from).collect();
        let split = Splitter::split_indices(&y, 0.25, 42, false).unwrap();
        assert_eq!(split.test.len(), 3);
        assert_eq!(split.train.len(), 7);

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_deterministic_for_seed() {
        let y: Vec<f64> = (0..50).map(|i| f64::from(i % 3)).collect();
        let a = Splitter::split_indices(&y, 0.2, 7, true).unwrap();
        let b = Splitter::split_indices(&y, 0.2, 7, true).unwrap();
        assert_eq!(a, b);

        let c = Splitter::split_indices(&y, 0.2, 8, true).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_degenerate_split_rejected() {
        assert!(matches!(
            Splitter::split_indices(&[1.0], 0.5, 0, false),
            Err(TabforgeError::InvalidConfig(_))
        ));
        assert!(Splitter::split_indices(&[1.0, 2.0], 0.9, 0, false).is_err());
        assert!(Splitter::split_indices(&[1.0, 2.0], 0.5, 0, false).is_ok());
    }

    #[test]
    fn test_stratified_proportions() {
        // 30 of class 0, 10 of class 1
        let y: Vec<f64> = (0..40).map(|i| if i < 30 { 0.0 } else { 1.0 }).collect();
        let split = Splitter::split_indices(&y, 0.25, 42, true).unwrap();

        // Quotas are 7.5 and 2.5; the tied remainder goes to the first class.
        let test_ones = split.test.iter().filter(|&&i| y[i] == 1.0).count();
        assert_eq!(split.test.len(), 10);
        assert_eq!(test_ones, 2);
        assert_eq!(split.test.len() - test_ones, 8);
    }

    #[test]
    fn test_split_gathers_rows() {
        let x = Array2::from_shape_fn((6, 2), |(r, c)| (r * 10 + c) as f64);
        let y = Array1::from_iter((0..6).map(|r| r as f64));
        let data = Splitter::split(&x, &y, 0.5, 1, false).unwrap();

        assert_eq!(data.x_test.nrows(), 3);
        for (row, label) in data.x_train.rows().into_iter().zip(&data.y_train) {
            assert_eq!(row[0], label * 10.0);
        }
    }

    proptest! {
        #[test]
        fn prop_stratified_within_one_row(
            labels in prop::collection::vec(0u8..4, 4..80),
            test_size in 0.1f64..0.9,
            seed in any::<u64>(),
        ) {
            let y: Vec<f64> = labels.iter().map(|&l| f64::from(l)).collect();
            let n = y.len();
            let n_test = Splitter::test_count(n, test_size);
            prop_assume!(n_test >= 1 && n_test < n);

            let split = Splitter::split_indices(&y, test_size, seed, true).unwrap();
            prop_assert_eq!(split.test.len(), n_test);
            prop_assert_eq!(split.train.len() + split.test.len(), n);

            for class in 0u8..4 {
                let total = labels.iter().filter(|&&l| l == class).count();
                let in_test = split.test.iter().filter(|&&i| labels[i] == class).count();
                let expected = n_test as f64 * total as f64 / n as f64;
                prop_assert!((in_test as f64 - expected).abs() < 1.0);
            }

            let again = Splitter::split_indices(&y, test_size, seed, true).unwrap();
            prop_assert_eq!(split, again);
        }
    }
}
