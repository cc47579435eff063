//! Tabular Dataset Processing Library
//!
//! Loading, profiling and cleaning of tabular datasets ahead of supervised
//! learning, built on Polars.
//!
//! # Overview
//!
//! - **Loading**: `.csv` files through the Polars CSV reader, `.xls`/`.xlsx`
//!   workbooks through calamine ([`TabularLoader`])
//! - **Profiling**: categorical/numerical classification of the selected
//!   features and their distinct values ([`FeatureProfiler`])
//! - **Cleaning**: mean/mode imputation and IQR outlier removal ([`Cleaner`])
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tabforge_processing::{Cleaner, FeatureProfiler, TabularLoader};
//!
//! let df = TabularLoader::load_path("customers.csv")?;
//!
//! let profile = FeatureProfiler::profile(&df, &["age", "city"])?;
//! println!("Feature types: {:?}", profile.feature_types);
//!
//! let (cleaned, report) = Cleaner::clean_with_report(df)?;
//! println!("Dropped {} rows", report.rows_removed());
//! ```

pub mod cleaner;
pub mod error;
pub mod loader;
pub mod profiler;
pub mod utils;

// Re-exports for convenient access
pub use cleaner::{Cleaner, CleaningReport, OutlierBounds};
pub use error::{ProcessingError, Result as ProcessingResult, ResultExt};
pub use loader::{FileFormat, TabularLoader};
pub use profiler::{
    CATEGORICAL_THRESHOLD, CategoricalValues, FeatureProfile, FeatureProfiler, FeatureType,
    FeatureTypeMap,
};
pub use utils::{format_category, is_numeric_dtype, parse_numeric_string, series_categories};

// Polars is part of the public API (datasets are DataFrames).
pub use polars;
