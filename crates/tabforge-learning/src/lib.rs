//! tabforge-learning: supervised-learning training and prediction over
//! tabular datasets.
//!
//! This crate turns a loaded dataset plus a [`PipelineConfig`] into a fitted
//! estimator, its evaluation metrics and everything needed to replay the
//! preprocessing at prediction time. Loading, profiling and cleaning come
//! from the `tabforge-processing` crate.
//!
//! # Features
//!
//! - **Preprocessing**: label or one-hot encoding of text features, standard
//!   or min-max scaling, all fitted on the training rows only
//! - **Model Catalog**: linear and ridge regression, logistic regression,
//!   k-nearest neighbours, decision trees, random forests and SVC
//! - **Evaluation**: accuracy/precision/recall/F1 with confusion matrix and
//!   report, or R²/MSE/MAE/RMSE, plus per-feature importance
//! - **Prediction**: single-record inference through the fitted artifacts
//! - **Persistence**: artifacts as plain JSON files or bytes
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tabforge_learning::{
//!     EncoderKind, ModelKind, Pipeline, PipelineConfig, ProblemType, Scalar, ScalerKind,
//! };
//!
//! let config = PipelineConfig::builder()
//!     .features(["age", "city"])
//!     .target("bought")
//!     .encoder(EncoderKind::Label)
//!     .scaler(ScalerKind::Standard)
//!     .model_type(ModelKind::LogisticRegression)
//!     .problem_type(ProblemType::Classification)
//!     .build()?;
//!
//! let pipeline = Pipeline::builder().config(config).build()?;
//! let outcome = pipeline.train_from_path("customers.csv")?;
//! println!("Accuracy: {}%", outcome.score);
//!
//! let label = outcome.artifacts.predict(
//!     &[Scalar::from(35.0), Scalar::from("Paris")],
//!     &["age".to_string(), "city".to_string()],
//! )?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! DataFrame ──► profile ──► clean ──► split ──► encode ──► scale ──► fit ──► evaluate
//!                                                 │          │        │
//!                                                 └──────────┴────────┴──► FittedArtifacts
//!                                                                              │
//! raw values ──────────────────────────────────────────────────────────────► predict
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T>`], an alias over
//! [`TabforgeError`]. Each variant has a stable code from
//! [`TabforgeError::error_code()`] and a client/server classification from
//! [`TabforgeError::is_client_error()`].
//!
//! # Thread Safety
//!
//! Nothing here holds global state. A [`Pipeline`] is plain configuration and
//! [`FittedArtifacts`] are immutable, `Send + Sync` values.
//!
//! # Modules
//!
//! - [`models`] - The estimator implementations behind [`ModelKind`]

mod artifacts;
mod config;
mod encoding;
mod error;
mod metrics;
pub mod models;
mod pipeline;
mod predict;
mod scaling;
mod split;
mod trainer;

// Re-export public API
//
// Configuration types
pub use config::{
    EncoderKind, ModelKind, Parameters, PipelineConfig, PipelineConfigBuilder, ProblemType,
    ScalerKind, clean_parameters, select_preprocessors,
};
// Error types
pub use error::{Result, TabforgeError};
// Preprocessing
pub use encoding::{
    EncodedTarget, EncodingMode, FeatureColumn, FeatureEncoder, FeatureTable, LabelEncoder,
    OneHotColumn, OneHotEncoder, encode_target,
};
pub use scaling::{FittedScaler, MinMaxScaler, StandardScaler};
pub use split::{SplitData, SplitIndices, Splitter};
// Training and evaluation
pub use metrics::{
    ClassScores, ClassificationMetrics, ClassificationReport, ConfusionMatrix, Evaluator,
    FeatureImportance, MetricsBundle, RegressionMetrics, Scores,
};
pub use models::FittedModel;
pub use trainer::Trainer;
// Pipeline types
pub use artifacts::{FittedArtifacts, TrainingOutcome};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use predict::{Prediction, PredictionPipeline, Scalar};
