//! Fitted artifacts and training outcomes.
//!
//! [`FittedArtifacts`] bundles everything a prediction needs to replay the
//! training-time preprocessing: the feature order, the fitted feature
//! encoder, the optional scaler and target encoder, and the estimator.
//!
//! # Persistence
//!
//! Artifacts serialize to plain JSON with `serde_json`:
//!
//! | Method | Use Case |
//! |--------|----------|
//! | [`save()`](FittedArtifacts::save) / [`load()`](FittedArtifacts::load) | File-based persistence |
//! | [`to_bytes()`](FittedArtifacts::to_bytes) / [`from_bytes()`](FittedArtifacts::from_bytes) | Database or network transfer |
//!
//! # Thread Safety
//!
//! Artifacts are immutable after training and are `Send + Sync`, so one set
//! can be shared across worker threads behind an `Arc`.

use crate::config::{ModelKind, ProblemType};
use crate::encoding::{FeatureEncoder, LabelEncoder};
use crate::error::{Result, TabforgeError};
use crate::metrics::MetricsBundle;
use crate::models::FittedModel;
use crate::scaling::FittedScaler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use static_assertions::assert_impl_all;
use std::path::Path;
use tabforge_processing::{CategoricalValues, CleaningReport, FeatureTypeMap};
use tracing::{debug, info};

/// The preprocessing and model fitted by one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedArtifacts {
    model_kind: ModelKind,
    problem_type: ProblemType,
    features: Vec<String>,
    target: String,
    feature_encoder: FeatureEncoder,
    scaler: Option<FittedScaler>,
    target_encoder: Option<LabelEncoder>,
    model: FittedModel,
}

assert_impl_all!(FittedArtifacts: Send, Sync);

impl FittedArtifacts {
    pub(crate) fn new(
        problem_type: ProblemType,
        target: String,
        feature_encoder: FeatureEncoder,
        scaler: Option<FittedScaler>,
        target_encoder: Option<LabelEncoder>,
        model: FittedModel,
    ) -> Self {
        Self {
            model_kind: model.kind(),
            problem_type,
            features: feature_encoder.features().to_vec(),
            target,
            feature_encoder,
            scaler,
            target_encoder,
            model,
        }
    }

    /// Features in training order; prediction inputs follow this order.
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.features
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn model_kind(&self) -> ModelKind {
        self.model_kind
    }

    #[must_use]
    pub fn problem_type(&self) -> ProblemType {
        self.problem_type
    }

    #[must_use]
    pub fn model(&self) -> &FittedModel {
        &self.model
    }

    #[must_use]
    pub fn feature_encoder(&self) -> &FeatureEncoder {
        &self.feature_encoder
    }

    #[must_use]
    pub fn scaler(&self) -> Option<&FittedScaler> {
        self.scaler.as_ref()
    }

    #[must_use]
    pub fn target_encoder(&self) -> Option<&LabelEncoder> {
        self.target_encoder.as_ref()
    }

    /// Class names of a text target, in code order.
    #[must_use]
    pub fn class_labels(&self) -> Option<&[String]> {
        self.target_encoder.as_ref().map(LabelEncoder::classes)
    }

    /// Write the artifacts to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TabforgeError::Io`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), model = %self.model_kind, "Saved artifacts");
        Ok(())
    }

    /// Read artifacts written by [`save()`](Self::save).
    ///
    /// # Errors
    ///
    /// - [`TabforgeError::ModelNotFound`] if `path` does not exist
    /// - [`TabforgeError::Json`] if the file is not an artifact document
    #[must_use = "returns the loaded artifacts; use them or handle the error"]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TabforgeError::ModelNotFound {
                path: path.display().to_string(),
            });
        }
        let bytes = std::fs::read(path)?;
        let artifacts = Self::from_bytes(&bytes)?;
        debug!(path = %path.display(), model = %artifacts.model_kind, "Loaded artifacts");
        Ok(artifacts)
    }

    /// Serialize to compact JSON bytes.
    #[must_use = "returns serialized artifact bytes; use them or handle the error"]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes produced by [`to_bytes()`](Self::to_bytes) or
    /// [`save()`](Self::save).
    ///
    /// # Errors
    ///
    /// [`TabforgeError::Json`] for malformed input and
    /// [`TabforgeError::InvalidConfig`] when the recorded model kind does
    /// not match the stored estimator or the scaler statistics do not cover
    /// its columns.
    #[must_use = "returns the loaded artifacts; use them or handle the error"]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let artifacts: Self = serde_json::from_slice(bytes)?;
        if artifacts.model.kind() != artifacts.model_kind {
            return Err(TabforgeError::InvalidConfig(format!(
                "artifacts record model {} but contain {}",
                artifacts.model_kind,
                artifacts.model.kind()
            )));
        }
        if let Some(scaler) = &artifacts.scaler {
            scaler.check_shape()?;
        }
        Ok(artifacts)
    }
}

/// Everything one successful training run produces.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct TrainingOutcome {
    /// Categorical/numerical classification of each feature.
    pub feature_types: FeatureTypeMap,

    /// Distinct values of each categorical feature, for building input forms.
    pub categorical_values: CategoricalValues,

    /// Wall-clock time of the whole run, rounded to two decimals.
    pub training_time_seconds: f64,

    /// Accuracy or R² as a percentage, rounded to two decimals.
    pub score: f64,

    pub metrics: MetricsBundle,

    /// What cleaning did to the dataset.
    pub cleaning: CleaningReport,

    /// The fitted preprocessing and model.
    pub artifacts: FittedArtifacts,

    pub trained_at: DateTime<Utc>,
}
