//! Configuration types for the training pipeline.
//!
//! This module provides [`PipelineConfig`] and its builder, the catalogs the
//! configuration selects from ([`ProblemType`], [`EncoderKind`],
//! [`ScalerKind`], [`ModelKind`]) and [`clean_parameters`] for
//! hyperparameters submitted as form strings.
//!
//! # Example
//!
//! ```
//! use tabforge_learning::{EncoderKind, ModelKind, PipelineConfig, ProblemType, ScalerKind};
//!
//! let config = PipelineConfig::builder()
//!     .features(["age", "city"])
//!     .target("bought")
//!     .encoder(EncoderKind::Label)
//!     .scaler(ScalerKind::Standard)
//!     .model_type(ModelKind::LogisticRegression)
//!     .problem_type(ProblemType::Classification)
//!     .test_size(0.2)
//!     .build()
//!     .expect("valid config");
//! ```

use crate::error::{Result, TabforgeError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Hyperparameter name → value, as submitted by the caller.
pub type Parameters = Map<String, Value>;

// =============================================================================
// Catalogs
// =============================================================================

/// The type of machine learning problem to solve.
///
/// This determines which metrics are computed and which models are allowed:
/// - [`Classification`](Self::Classification): accuracy, weighted F1, precision, recall
/// - [`Regression`](Self::Regression): R², MSE, MAE, RMSE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    /// Predicting discrete classes.
    #[default]
    Classification,

    /// Predicting continuous values.
    Regression,
}

impl ProblemType {
    /// Returns the wire name.
    ///
    /// # Examples
    ///
    /// ```
    /// use tabforge_learning::ProblemType;
    ///
    /// assert_eq!(ProblemType::Classification.as_str(), "classification");
    /// assert_eq!(ProblemType::Regression.as_str(), "regression");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::Classification => "classification",
            ProblemType::Regression => "regression",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemType {
    type Err = TabforgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "classification" => Ok(Self::Classification),
            "regression" => Ok(Self::Regression),
            other => Err(TabforgeError::InvalidConfig(format!(
                "problem_type must be 'classification' or 'regression', got '{other}'"
            ))),
        }
    }
}

/// Encoding applied to categorical features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Option<String>", into = "String")]
pub enum EncoderKind {
    /// No encoding. Only valid when every feature is numeric.
    #[default]
    None,
    /// One label encoder per categorical column.
    Label,
    /// One joint one-hot encoder over all categorical columns.
    OneHot,
}

impl EncoderKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderKind::None => "None",
            EncoderKind::Label => "LabelEncoder",
            EncoderKind::OneHot => "OneHotEncoder",
        }
    }
}

impl FromStr for EncoderKind {
    type Err = TabforgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "None" | "none" | "null" => Ok(Self::None),
            "LabelEncoder" => Ok(Self::Label),
            "OneHotEncoder" => Ok(Self::OneHot),
            other => Err(TabforgeError::UnknownEncoder(other.to_string())),
        }
    }
}

impl TryFrom<Option<String>> for EncoderKind {
    type Error = TabforgeError;

    fn try_from(value: Option<String>) -> Result<Self> {
        value.as_deref().map_or(Ok(Self::None), str::parse)
    }
}

impl From<EncoderKind> for String {
    fn from(kind: EncoderKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Scaling applied to the encoded feature matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Option<String>", into = "String")]
pub enum ScalerKind {
    /// No scaling.
    #[default]
    None,
    /// Zero mean, unit variance.
    Standard,
    /// Rescale into `[0, 1]`.
    MinMax,
}

impl ScalerKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalerKind::None => "None",
            ScalerKind::Standard => "StandardScaler",
            ScalerKind::MinMax => "MinMaxScaler",
        }
    }
}

impl FromStr for ScalerKind {
    type Err = TabforgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "None" | "none" | "null" => Ok(Self::None),
            "StandardScaler" => Ok(Self::Standard),
            "MinMaxScaler" => Ok(Self::MinMax),
            other => Err(TabforgeError::UnknownScaler(other.to_string())),
        }
    }
}

impl TryFrom<Option<String>> for ScalerKind {
    type Error = TabforgeError;

    fn try_from(value: Option<String>) -> Result<Self> {
        value.as_deref().map_or(Ok(Self::None), str::parse)
    }
}

impl From<ScalerKind> for String {
    fn from(kind: ScalerKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Parse encoder and scaler names in one step.
///
/// # Errors
///
/// [`TabforgeError::UnknownEncoder`] or [`TabforgeError::UnknownScaler`] for
/// names outside the catalogs.
pub fn select_preprocessors(encoder: &str, scaler: &str) -> Result<(EncoderKind, ScalerKind)> {
    Ok((encoder.parse()?, scaler.parse()?))
}

/// The fixed catalog of trainable models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelKind {
    LinearRegression,
    LogisticRegression,
    Ridge,
    KNeighborsRegressor,
    KNeighborsClassifier,
    DecisionTreeRegressor,
    DecisionTreeClassifier,
    RandomForestRegressor,
    RandomForestClassifier,
    Svc,
}

impl ModelKind {
    /// Every model in the catalog.
    pub const ALL: [ModelKind; 10] = [
        ModelKind::LinearRegression,
        ModelKind::LogisticRegression,
        ModelKind::Ridge,
        ModelKind::KNeighborsRegressor,
        ModelKind::KNeighborsClassifier,
        ModelKind::DecisionTreeRegressor,
        ModelKind::DecisionTreeClassifier,
        ModelKind::RandomForestRegressor,
        ModelKind::RandomForestClassifier,
        ModelKind::Svc,
    ];

    /// Returns the catalog name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "LinearRegression",
            ModelKind::LogisticRegression => "LogisticRegression",
            ModelKind::Ridge => "Ridge",
            ModelKind::KNeighborsRegressor => "KNeighborsRegressor",
            ModelKind::KNeighborsClassifier => "KNeighborsClassifier",
            ModelKind::DecisionTreeRegressor => "DecisionTreeRegressor",
            ModelKind::DecisionTreeClassifier => "DecisionTreeClassifier",
            ModelKind::RandomForestRegressor => "RandomForestRegressor",
            ModelKind::RandomForestClassifier => "RandomForestClassifier",
            ModelKind::Svc => "SVC",
        }
    }

    /// The problem type this model solves.
    #[must_use]
    pub fn problem_type(&self) -> ProblemType {
        match self {
            ModelKind::LogisticRegression
            | ModelKind::KNeighborsClassifier
            | ModelKind::DecisionTreeClassifier
            | ModelKind::RandomForestClassifier
            | ModelKind::Svc => ProblemType::Classification,
            ModelKind::LinearRegression
            | ModelKind::Ridge
            | ModelKind::KNeighborsRegressor
            | ModelKind::DecisionTreeRegressor
            | ModelKind::RandomForestRegressor => ProblemType::Regression,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = TabforgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TabforgeError::UnknownModel(s.to_string()))
    }
}

impl TryFrom<String> for ModelKind {
    type Error = TabforgeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ModelKind> for String {
    fn from(kind: ModelKind) -> Self {
        kind.as_str().to_string()
    }
}

// =============================================================================
// Pipeline configuration
// =============================================================================

/// Configuration of one training run.
///
/// Use [`PipelineConfig::builder()`] to construct a configuration in code, or
/// [`PipelineConfig::from_json()`] to read the JSON shape submitted by a
/// hosting layer.
///
/// # Validation
///
/// [`build()`](PipelineConfigBuilder::build) checks that:
/// - `features` is non-empty and has no duplicates
/// - `target` is set and is not one of the features
/// - `test_size` is in range `(0.0, 1.0)` (exclusive)
/// - `model_type` solves `problem_type`
///
/// Column existence is checked against the dataset when training starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPipelineConfig")]
pub struct PipelineConfig {
    /// Feature columns, in the order the model sees them.
    pub features: Vec<String>,

    /// Column to predict.
    pub target: String,

    /// Categorical feature encoding (default: none).
    pub encoder: EncoderKind,

    /// Feature scaling (default: none).
    pub scaler: ScalerKind,

    /// Fraction of rows held out for evaluation (default: 0.2).
    pub test_size: f64,

    /// Seed for the split and for randomized estimators (default: 42).
    pub random_state: u64,

    /// Preserve class proportions in the split (default: false).
    ///
    /// Only applies when the target is text and therefore label-encoded.
    pub stratify: bool,

    /// The model to train.
    pub model_type: ModelKind,

    /// Hyperparameters, using the estimator's parameter names.
    pub parameters: Parameters,

    /// Classification or regression.
    pub problem_type: ProblemType,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            features: Vec::new(),
            target: String::new(),
            encoder: EncoderKind::None,
            scaler: ScalerKind::None,
            test_size: 0.2,
            random_state: 42,
            stratify: false,
            model_type: ModelKind::LogisticRegression,
            parameters: Parameters::new(),
            problem_type: ProblemType::Classification,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Parse and validate a JSON configuration.
    ///
    /// Unlike a plain `serde_json::from_str`, catalog errors keep their own
    /// kind ([`TabforgeError::UnknownModel`] and friends).
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawPipelineConfig = serde_json::from_str(json)?;
        raw.try_into()
    }

    /// The encoder and scaler this configuration selects.
    #[must_use]
    pub fn preprocessors(&self) -> (EncoderKind, ScalerKind) {
        (self.encoder, self.scaler)
    }
}

/// Builder for [`PipelineConfig`].
///
/// Created via [`PipelineConfig::builder()`]. All setters return `self` to allow
/// method chaining.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the feature columns, replacing any previously set.
    #[must_use]
    pub fn features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.features = features.into_iter().map(Into::into).collect();
        self
    }

    /// Append one feature column.
    #[must_use]
    pub fn feature(mut self, feature: impl Into<String>) -> Self {
        self.config.features.push(feature.into());
        self
    }

    /// Set the target column name.
    #[must_use]
    pub fn target(mut self, column: impl Into<String>) -> Self {
        self.config.target = column.into();
        self
    }

    /// Set the categorical encoder (default: none).
    #[must_use]
    pub fn encoder(mut self, encoder: EncoderKind) -> Self {
        self.config.encoder = encoder;
        self
    }

    /// Set the scaler (default: none).
    #[must_use]
    pub fn scaler(mut self, scaler: ScalerKind) -> Self {
        self.config.scaler = scaler;
        self
    }

    /// Set the test size fraction (default: 0.2).
    ///
    /// [`build()`](Self::build) returns an error if `size <= 0.0` or `size >= 1.0`.
    #[must_use]
    pub fn test_size(mut self, size: f64) -> Self {
        self.config.test_size = size;
        self
    }

    /// Set the random seed for reproducibility (default: 42).
    #[must_use]
    pub fn random_state(mut self, seed: u64) -> Self {
        self.config.random_state = seed;
        self
    }

    /// Enable or disable stratified splitting (default: false).
    #[must_use]
    pub fn stratify(mut self, stratify: bool) -> Self {
        self.config.stratify = stratify;
        self
    }

    /// Set the model to train.
    #[must_use]
    pub fn model_type(mut self, model: ModelKind) -> Self {
        self.config.model_type = model;
        self
    }

    /// Set all hyperparameters, replacing any previously set.
    #[must_use]
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.config.parameters = parameters;
        self
    }

    /// Set one hyperparameter.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.parameters.insert(name.into(), value.into());
        self
    }

    /// Set the problem type (default: classification).
    #[must_use]
    pub fn problem_type(mut self, problem_type: ProblemType) -> Self {
        self.config.problem_type = problem_type;
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns [`TabforgeError::InvalidConfig`] if:
    /// - `features` is empty or lists a column twice
    /// - `target` is empty or is also a feature
    /// - `test_size` is not in range `(0.0, 1.0)`
    /// - `model_type` does not solve `problem_type`
    pub fn build(self) -> Result<PipelineConfig> {
        let config = self.config;

        if config.features.is_empty() {
            return Err(TabforgeError::InvalidConfig(
                "at least one feature is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = config.features.iter().find(|f| !seen.insert(f.as_str())) {
            return Err(TabforgeError::InvalidConfig(format!(
                "feature '{duplicate}' is listed more than once"
            )));
        }

        if config.target.is_empty() {
            return Err(TabforgeError::InvalidConfig(
                "target column is required".to_string(),
            ));
        }

        if config.features.contains(&config.target) {
            return Err(TabforgeError::InvalidConfig(format!(
                "target '{}' cannot also be a feature",
                config.target
            )));
        }

        if !(config.test_size > 0.0 && config.test_size < 1.0) {
            return Err(TabforgeError::InvalidConfig(
                "test_size must be between 0.0 and 1.0 (exclusive)".to_string(),
            ));
        }

        if config.model_type.problem_type() != config.problem_type {
            return Err(TabforgeError::InvalidConfig(format!(
                "{} cannot be used for {}",
                config.model_type, config.problem_type
            )));
        }

        Ok(config)
    }
}

/// The JSON shape of a configuration before catalog names are resolved.
#[derive(Debug, Deserialize)]
struct RawPipelineConfig {
    features: Vec<String>,
    #[serde(alias = "target_column")]
    target: String,
    #[serde(default)]
    encoder: Option<String>,
    #[serde(default)]
    scaler: Option<String>,
    #[serde(default = "default_test_size")]
    test_size: f64,
    #[serde(default = "default_random_state")]
    random_state: u64,
    #[serde(default)]
    stratify: bool,
    model_type: String,
    #[serde(default)]
    parameters: Option<Parameters>,
    problem_type: String,
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_state() -> u64 {
    42
}

impl TryFrom<RawPipelineConfig> for PipelineConfig {
    type Error = TabforgeError;

    fn try_from(raw: RawPipelineConfig) -> Result<Self> {
        PipelineConfig::builder()
            .features(raw.features)
            .target(raw.target)
            .encoder(EncoderKind::try_from(raw.encoder)?)
            .scaler(ScalerKind::try_from(raw.scaler)?)
            .test_size(raw.test_size)
            .random_state(raw.random_state)
            .stratify(raw.stratify)
            .model_type(raw.model_type.parse()?)
            .parameters(clean_parameters(raw.parameters.unwrap_or_default()))
            .problem_type(raw.problem_type.parse()?)
            .build()
    }
}

// =============================================================================
// Hyperparameter cleaning
// =============================================================================

/// Normalize hyperparameters submitted as form strings.
///
/// - `null` and `""` entries are dropped
/// - a string of ASCII digits becomes an integer
/// - a string that parses as a float becomes a float
/// - `"true"`/`"false"` (any case) become booleans
/// - `"None"`/`"null"` become `null`
/// - everything else is kept as-is
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tabforge_learning::clean_parameters;
///
/// let raw = json!({"max_depth": "5", "C": "0.5", "kernel": "rbf", "gamma": ""});
/// let cleaned = clean_parameters(raw.as_object().unwrap().clone());
/// assert_eq!(serde_json::Value::Object(cleaned), json!({"max_depth": 5, "C": 0.5, "kernel": "rbf"}));
/// ```
pub fn clean_parameters(parameters: Parameters) -> Parameters {
    parameters
        .into_iter()
        .filter_map(|(name, value)| match value {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some((name, clean_parameter_string(s))),
            other => Some((name, other)),
        })
        .collect()
}

fn clean_parameter_string(s: String) -> Value {
    let trimmed = s.trim();

    if trimmed.bytes().all(|b| b.is_ascii_digit())
        && let Ok(n) = trimmed.parse::<u64>()
    {
        return Value::from(n);
    }
    if let Ok(f) = trimmed.parse::<f64>()
        && f.is_finite()
    {
        return Value::from(f);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "none" | "null" => Value::Null,
        _ => Value::String(s),
    }
}
