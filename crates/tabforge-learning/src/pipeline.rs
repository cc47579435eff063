//! Training pipeline implementation.
//!
//! This module provides the [`Pipeline`] struct and its builder for running
//! one training job end to end.
//!
//! # Overview
//!
//! The training pipeline executes these stages in order:
//!
//! 1. **Validation** - Check that the configured columns exist
//! 2. **Profiling** - Classify features as categorical or numerical
//! 3. **Cleaning** - Impute missing values and drop outlier rows
//! 4. **Splitting** - Seeded train/test partition, optionally stratified
//! 5. **Preprocessing** - Fit the encoder and scaler on the training rows
//! 6. **Training** - Fit the configured estimator
//! 7. **Evaluation** - Score the held-out rows and derive feature importance
//!
//! # Example
//!
//! ```rust,ignore
//! use tabforge_learning::{ModelKind, Pipeline, PipelineConfig, ProblemType};
//!
//! let config = PipelineConfig::builder()
//!     .features(["age", "city"])
//!     .target("bought")
//!     .model_type(ModelKind::LogisticRegression)
//!     .problem_type(ProblemType::Classification)
//!     .build()?;
//!
//! let pipeline = Pipeline::builder().config(config).build()?;
//! let outcome = pipeline.train(&dataframe)?;
//! println!("Score: {}", outcome.score);
//!
//! outcome.artifacts.save("model.json")?;
//! ```
//!
//! # Error Boundary
//!
//! Data-shape problems (missing columns, text without an encoder, a split
//! that leaves a partition empty) fail with their own kind. Failures inside
//! the numeric stage are logged once here and reported as
//! [`TabforgeError::TrainingFailed`]; client-caused kinds such as
//! [`TabforgeError::InvalidHyperparameters`] pass through unchanged.

use crate::artifacts::{FittedArtifacts, TrainingOutcome};
use crate::config::{PipelineConfig, ProblemType};
use crate::encoding::{EncodedTarget, FeatureEncoder, FeatureTable, encode_target};
use crate::error::{Result, TabforgeError};
use crate::metrics::{Evaluator, MetricsBundle, round2};
use crate::models::FittedModel;
use crate::scaling::FittedScaler;
use crate::split::Splitter;
use crate::trainer::Trainer;
use chrono::Utc;
use ndarray::{Array1, Axis};
use polars::prelude::DataFrame;
use std::path::Path;
use std::time::Instant;
use tabforge_processing::{Cleaner, FeatureProfiler, TabularLoader};
use tracing::{debug, error, info};

/// The training pipeline.
///
/// Use [`Pipeline::builder()`] to construct a pipeline with the builder pattern.
///
/// A pipeline holds only its configuration; every fitted object is part of
/// the returned [`TrainingOutcome`], so one pipeline can train any number
/// of datasets.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = Pipeline::builder()
///     .config(config)
///     .build()?;
///
/// let outcome = pipeline.train(&df)?;
/// let label = outcome.artifacts.predict(&values, &columns)?;
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new builder for `Pipeline`.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let pipeline = Pipeline::builder()
    ///     .config(config)
    ///     .build()?;
    /// ```
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Get the pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the training pipeline on `df`.
    ///
    /// # Arguments
    ///
    /// * `df` - The raw dataset. It must contain every configured feature
    ///   and the target. Every column takes part in cleaning, so an outlier
    ///   in a column that is not a feature still drops its row.
    ///
    /// # Returns
    ///
    /// A [`TrainingOutcome`] with the feature profile, the cleaning report,
    /// metrics on the held-out rows and the fitted artifacts.
    ///
    /// # Errors
    ///
    /// - [`ColumnNotFound`](TabforgeError::ColumnNotFound): a configured column is missing
    /// - [`InvalidConfig`](TabforgeError::InvalidConfig): text features without an
    ///   encoder, a text target for regression, or a split with an empty partition
    /// - [`InvalidHyperparameters`](TabforgeError::InvalidHyperparameters): the
    ///   parameters do not fit the model
    /// - [`TrainingFailed`](TabforgeError::TrainingFailed): no rows survive
    ///   cleaning, or the estimator cannot be fitted
    pub fn train(&self, df: &DataFrame) -> Result<TrainingOutcome> {
        let started = Instant::now();
        let config = &self.config;
        info!(
            model = %config.model_type,
            problem = %config.problem_type,
            rows = df.height(),
            "Starting training"
        );

        self.check_columns(df)?;
        let profile = FeatureProfiler::profile(df, &config.features)?;

        let (cleaned, cleaning) = Cleaner::clean_with_report(df.clone())?;
        if cleaned.height() == 0 {
            return Err(TabforgeError::TrainingFailed(
                "no rows left after cleaning".to_string(),
            ));
        }
        debug!(
            rows_before = cleaning.rows_before,
            rows_after = cleaning.rows_after,
            "Cleaned dataset"
        );

        let table = FeatureTable::from_frame(&cleaned, &config.features)?;
        let EncodedTarget {
            values: target_values,
            encoder: target_encoder,
        } = encode_target(&cleaned, &config.target)?;
        if target_encoder.is_some() && config.problem_type == ProblemType::Regression {
            return Err(TabforgeError::InvalidConfig(format!(
                "regression needs a numeric target, '{}' holds text",
                config.target
            )));
        }

        let stratify = config.stratify && target_encoder.is_some();
        let indices = Splitter::split_indices(
            &target_values,
            config.test_size,
            config.random_state,
            stratify,
        )?;
        let train_table = table.select_rows(&indices.train);
        let test_table = table.select_rows(&indices.test);
        let y = Array1::from(target_values);
        let y_train = y.select(Axis(0), &indices.train);
        let y_test = y.select(Axis(0), &indices.test);

        let feature_encoder = FeatureEncoder::fit(config.encoder, &train_table)?;

        let (scaler, model, metrics) = self
            .fit_and_evaluate(
                &feature_encoder,
                &train_table,
                &test_table,
                &y_train,
                &y_test,
                target_encoder.as_ref().map(|e| e.classes()),
            )
            .map_err(|e| match e {
                TabforgeError::InvalidHyperparameters { .. }
                | TabforgeError::UnknownModel(_)
                | TabforgeError::InvalidConfig(_)
                | TabforgeError::TrainingFailed(_) => {
                    error!(model = %config.model_type, error = %e, "Training failed");
                    e
                }
                other => {
                    error!(model = %config.model_type, error = %other, "Training failed");
                    TabforgeError::TrainingFailed(other.to_string())
                }
            })?;

        let artifacts = FittedArtifacts::new(
            config.problem_type,
            config.target.clone(),
            feature_encoder,
            scaler,
            target_encoder,
            model,
        );

        let score = metrics.headline_score();
        let training_time_seconds = round2(started.elapsed().as_secs_f64());
        info!(
            model = %config.model_type,
            score,
            seconds = training_time_seconds,
            "Training complete"
        );

        Ok(TrainingOutcome {
            feature_types: profile.feature_types,
            categorical_values: profile.categorical_values,
            training_time_seconds,
            score,
            metrics,
            cleaning,
            artifacts,
            trained_at: Utc::now(),
        })
    }

    /// Load `bytes` as the file `name` and train on it.
    ///
    /// The extension of `name` picks the reader (`.csv`, `.xls`, `.xlsx`).
    ///
    /// # Errors
    ///
    /// [`UnsupportedFormat`](TabforgeError::UnsupportedFormat) and
    /// [`ParseError`](TabforgeError::ParseError) from loading, then
    /// everything [`train()`](Self::train) returns.
    pub fn train_from_file(&self, name: &str, bytes: &[u8]) -> Result<TrainingOutcome> {
        let df = TabularLoader::load(name, bytes)?;
        self.train(&df)
    }

    /// Read the dataset at `path` and train on it.
    pub fn train_from_path(&self, path: impl AsRef<Path>) -> Result<TrainingOutcome> {
        let df = TabularLoader::load_path(path)?;
        self.train(&df)
    }

    /// Fail with the first configured column `df` does not have.
    fn check_columns(&self, df: &DataFrame) -> Result<()> {
        let config = &self.config;
        match config
            .features
            .iter()
            .chain(std::iter::once(&config.target))
            .find(|c| df.column(c).is_err())
        {
            Some(missing) => Err(TabforgeError::ColumnNotFound(missing.clone())),
            None => Ok(()),
        }
    }

    /// Encode, scale, fit and score. Errors here are numeric-stage failures.
    fn fit_and_evaluate(
        &self,
        feature_encoder: &FeatureEncoder,
        train_table: &FeatureTable,
        test_table: &FeatureTable,
        y_train: &Array1<f64>,
        y_test: &Array1<f64>,
        class_names: Option<&[String]>,
    ) -> Result<(Option<FittedScaler>, FittedModel, MetricsBundle)> {
        let config = &self.config;
        let mut x_train = feature_encoder.transform(train_table)?;
        let mut x_test = feature_encoder.transform(test_table)?;

        let output_names = feature_encoder.output_names();
        let scaler = FittedScaler::fit(config.scaler, &x_train, &output_names);
        if let Some(scaler) = &scaler {
            x_train = scaler.transform(&x_train, &output_names)?;
            x_test = scaler.transform(&x_test, &output_names)?;
        }

        let model = Trainer::train(
            config.model_type,
            &config.parameters,
            &x_train,
            y_train,
            config.random_state,
        )?;
        let predictions = model.predict(&x_test);

        let metrics = Evaluator::evaluate(
            y_test,
            &predictions,
            config.problem_type,
            feature_encoder.features(),
            &model,
            &feature_encoder.source_feature_indices(),
            class_names,
        );
        Ok((scaler, model, metrics))
    }
}

/// Builder for [`Pipeline`].
///
/// Created via [`Pipeline::builder()`]. Use method chaining to configure
/// the pipeline, then call [`build()`](Self::build) to create the pipeline.
///
/// # Required Configuration
///
/// - [`config()`](Self::config): Pipeline configuration (required)
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
}

impl PipelineBuilder {
    /// Set the pipeline configuration (required).
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = PipelineConfig::builder()
    ///     .features(["age"])
    ///     .target("price")
    ///     .model_type(ModelKind::Ridge)
    ///     .problem_type(ProblemType::Regression)
    ///     .build()?;
    ///
    /// let pipeline = Pipeline::builder()
    ///     .config(config)
    ///     .build()?;
    /// ```
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`TabforgeError::InvalidConfig`] if no configuration was set.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config.ok_or_else(|| {
            TabforgeError::InvalidConfig("Pipeline config is required".to_string())
        })?;
        Ok(Pipeline { config })
    }
}
