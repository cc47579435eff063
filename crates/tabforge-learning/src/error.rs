//! Error types for the tabforge-learning crate.
//!
//! This module defines [`TabforgeError`], the main error type used throughout
//! the crate. All public API functions return `Result<T, TabforgeError>`.
//!
//! # Error Handling
//!
//! Errors are designed to be:
//! - **Descriptive**: Each variant includes context about what went wrong
//! - **Classifiable**: [`is_client_error()`](TabforgeError::is_client_error)
//!   separates bad input from internal failures
//! - **Serializable**: Errors serialize as `{code, message}` objects
//!
//! # Example
//!
//! ```no_run
//! use tabforge_learning::{PipelineConfig, TabforgeError};
//!
//! fn configure() -> Result<PipelineConfig, TabforgeError> {
//!     // Errors are automatically propagated with ?
//!     let config = PipelineConfig::builder()
//!         .features(["age", "city"])
//!         .target("bought")
//!         .build()?;
//!     Ok(config)
//! }
//! ```

use serde::Serialize;
use serde::ser::SerializeStruct;
use tabforge_processing::ProcessingError;
use thiserror::Error;

/// The main error type for tabforge-learning operations.
///
/// This enum covers all error conditions that can occur during:
/// - Pipeline configuration and validation
/// - Dataset loading and cleaning
/// - Encoding, scaling and splitting
/// - Model training and evaluation
/// - Prediction on a single record
/// - Artifact persistence
///
/// # Error Conversion
///
/// [`ProcessingError`]s are converted to the matching variant:
/// - `UnsupportedFormat` → [`UnsupportedFormat`](Self::UnsupportedFormat)
/// - `ParseError` / `Spreadsheet` → [`ParseError`](Self::ParseError)
/// - `ColumnNotFound` → [`ColumnNotFound`](Self::ColumnNotFound)
/// - Everything else → [`Processing`](Self::Processing)
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TabforgeError {
    /// Invalid configuration provided to the pipeline.
    ///
    /// Check the error message for details on which configuration value is invalid
    /// and what values are accepted.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The uploaded file is neither `.csv`, `.xls` nor `.xlsx`.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The uploaded file could not be parsed into a table.
    ///
    /// Common causes:
    /// - The file is empty or only has a header row
    /// - The file is not valid CSV or is a corrupted workbook
    #[error("Failed to parse file: {0}")]
    ParseError(String),

    /// A configured column does not exist in the dataset.
    ///
    /// Column names are case-sensitive.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// The encoder name is not one of `None`, `LabelEncoder`, `OneHotEncoder`.
    #[error("Unknown encoder '{0}'")]
    UnknownEncoder(String),

    /// The scaler name is not one of `None`, `StandardScaler`, `MinMaxScaler`.
    #[error("Unknown scaler '{0}'")]
    UnknownScaler(String),

    /// The model name is not part of the catalog.
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    /// Hyperparameters could not be applied to the selected model.
    ///
    /// Raised for unknown parameter names, wrong value types and
    /// out-of-range values.
    #[error("Invalid hyperparameters for {model}: {message}")]
    InvalidHyperparameters {
        /// The model the parameters were meant for.
        model: String,
        /// What was wrong with them.
        message: String,
    },

    /// The number of prediction inputs does not match the number of columns.
    #[error("Expected {expected} values, got {actual}")]
    ColumnCountMismatch {
        /// Number of features the model was trained on.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A prediction input was missing.
    ///
    /// A single record has no statistics to impute from, so every feature
    /// must be provided.
    #[error("Missing value for required column '{0}'")]
    MissingRequiredValue(String),

    /// A value cannot be used for its column, such as text in a numeric
    /// feature.
    #[error("Invalid value '{value}' for column '{column}': {reason}")]
    InvalidValue {
        column: String,
        value: String,
        reason: String,
    },

    /// Prediction failed. The cause is available through
    /// [`std::error::Error::source`].
    #[error("Prediction failed: {source}")]
    PredictionFailed {
        /// The error that stopped the prediction.
        #[source]
        source: Box<TabforgeError>,
    },

    /// No saved artifacts exist at the given path.
    #[error("Model not found at '{path}'")]
    ModelNotFound {
        /// The path that was looked up.
        path: String,
    },

    /// Training failed inside the estimator or the numeric preprocessing.
    #[error("Model training failed: {0}")]
    TrainingFailed(String),

    /// Loading or cleaning failed for a reason not covered by another variant.
    #[error("Processing error: {0}")]
    Processing(#[source] ProcessingError),

    /// Polars error while reshaping the dataset.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a configuration or artifact file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TabforgeError {
    /// Wrap an error raised on the prediction path.
    ///
    /// Errors that are already wrapped are returned unchanged.
    pub fn prediction_failed(source: TabforgeError) -> Self {
        match source {
            already @ Self::PredictionFailed { .. } => already,
            other => Self::PredictionFailed {
                source: Box::new(other),
            },
        }
    }

    /// Stable, machine-readable code for the error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::UnknownEncoder(_) => "UNKNOWN_ENCODER",
            Self::UnknownScaler(_) => "UNKNOWN_SCALER",
            Self::UnknownModel(_) => "UNKNOWN_MODEL",
            Self::InvalidHyperparameters { .. } => "INVALID_HYPERPARAMETERS",
            Self::ColumnCountMismatch { .. } => "COLUMN_COUNT_MISMATCH",
            Self::MissingRequiredValue(_) => "MISSING_REQUIRED_VALUE",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::PredictionFailed { .. } => "PREDICTION_FAILED",
            Self::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            Self::TrainingFailed(_) => "TRAINING_FAILED",
            Self::Processing(e) => e.error_code(),
            Self::Polars(_) => "POLARS_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Whether the error was caused by the caller's input rather than by an
    /// internal failure.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidConfig(_)
            | Self::UnsupportedFormat(_)
            | Self::ParseError(_)
            | Self::ColumnNotFound(_)
            | Self::UnknownEncoder(_)
            | Self::UnknownScaler(_)
            | Self::UnknownModel(_)
            | Self::InvalidHyperparameters { .. }
            | Self::ColumnCountMismatch { .. }
            | Self::MissingRequiredValue(_)
            | Self::InvalidValue { .. }
            | Self::ModelNotFound { .. }
            | Self::Json(_) => true,
            Self::PredictionFailed { source } => source.is_client_error(),
            Self::TrainingFailed(_) | Self::Processing(_) | Self::Polars(_) | Self::Io(_) => false,
        }
    }
}

impl From<ProcessingError> for TabforgeError {
    fn from(err: ProcessingError) -> Self {
        match err.root() {
            ProcessingError::UnsupportedFormat(name) => Self::UnsupportedFormat(name.clone()),
            ProcessingError::ParseError(message) => Self::ParseError(message.clone()),
            ProcessingError::Spreadsheet(e) => Self::ParseError(e.to_string()),
            ProcessingError::ColumnNotFound(column) => Self::ColumnNotFound(column.clone()),
            _ => Self::Processing(err),
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for TabforgeError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("TabforgeError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for tabforge-learning operations.
pub type Result<T> = std::result::Result<T, TabforgeError>;
