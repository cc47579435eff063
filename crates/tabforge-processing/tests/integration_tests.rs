//! Integration tests for loading, profiling and cleaning.
//!
//! These tests run the processing stages on the fixture files the way the
//! training pipeline chains them.

use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::PathBuf;
use tabforge_processing::polars::prelude::*;
use tabforge_processing::{
    Cleaner, FeatureProfiler, FeatureType, ProcessingError, TabularLoader,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_customers() -> DataFrame {
    TabularLoader::load_path(fixtures_path().join("customers.csv"))
        .expect("Failed to load customers fixture")
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_fixture_keeps_header_and_rows() {
    let df = load_customers();

    assert_eq!(df.shape(), (40, 4));
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(names, vec!["age", "city", "income", "bought"]);
    assert_eq!(df.column("age").unwrap().null_count(), 2);
    assert_eq!(df.column("city").unwrap().null_count(), 1);
}

#[test]
fn test_load_from_temp_file_with_uppercase_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SCORES.CSV");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "name,score\nann,1.5\nbob,2.5").unwrap();
    drop(file);

    let df = TabularLoader::load_path(&path).unwrap();
    assert_eq!(df.shape(), (2, 2));
}

#[test]
fn test_load_missing_file_is_io_error() {
    let err = TabularLoader::load_path(fixtures_path().join("does_not_exist.csv")).unwrap_err();
    assert!(matches!(err, ProcessingError::Io(_)));
}

#[test]
fn test_load_xlsx_fixture() {
    let df = TabularLoader::load_path(fixtures_path().join("customers.xlsx"))
        .expect("Failed to load spreadsheet fixture");

    assert_eq!(df.shape(), (3, 4));
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    // The third header cell is blank.
    assert_eq!(names, vec!["age", "city", "column_3", "score"]);

    assert_eq!(df.column("age").unwrap().dtype(), &DataType::Int64);
    assert_eq!(df.column("city").unwrap().dtype(), &DataType::String);
    assert_eq!(df.column("column_3").unwrap().dtype(), &DataType::Int64);
    assert_eq!(df.column("score").unwrap().dtype(), &DataType::Float64);

    // The last row stops after column C and has no city.
    assert_eq!(df.column("city").unwrap().null_count(), 1);
    assert_eq!(df.column("score").unwrap().null_count(), 1);
    let cities = df.column("city").unwrap().as_materialized_series();
    assert_eq!(cities.str().unwrap().get(1), Some("Nice"));
}

#[test]
fn test_load_xlsx_bytes_with_uppercase_extension() {
    let bytes = std::fs::read(fixtures_path().join("customers.xlsx")).unwrap();
    let df = TabularLoader::load("CUSTOMERS.XLSX", &bytes).unwrap();
    assert_eq!(df.shape(), (3, 4));

    let profile = FeatureProfiler::profile(&df, &["age", "score"]).unwrap();
    assert_eq!(profile.feature_types["score"], FeatureType::Categorical);
}

#[test]
fn test_load_rejects_unknown_extension() {
    let err = TabularLoader::load("report.pdf", b"%PDF").unwrap_err();
    assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
}

// ============================================================================
// Profiling
// ============================================================================

#[test]
fn test_profile_fixture() {
    let df = load_customers();
    let profile = FeatureProfiler::profile(&df, &["age", "city", "income"]).unwrap();

    assert_eq!(profile.feature_types["age"], FeatureType::Numerical);
    assert_eq!(profile.feature_types["city"], FeatureType::Categorical);
    assert_eq!(profile.feature_types["income"], FeatureType::Numerical);

    // Four cities plus the missing sentinel
    let cities = &profile.categorical_values["city"];
    assert_eq!(cities.len(), 5);
    assert!(cities.contains(&serde_json::Value::Null));
    assert_eq!(cities[0], serde_json::json!("Nice"));
}

// ============================================================================
// Cleaning
// ============================================================================

#[test]
fn test_clean_fixture() {
    let df = load_customers();
    let (cleaned, report) = Cleaner::clean_with_report(df).unwrap();

    for name in ["age", "city", "income", "bought"] {
        assert_eq!(cleaned.column(name).unwrap().null_count(), 0, "{name}");
    }
    assert_eq!(report.imputed_cells.get("age"), Some(&2));
    assert_eq!(report.imputed_cells.get("city"), Some(&1));
    assert!(report.outlier_rows_dropped.get("income").is_some_and(|n| *n >= 1));
    assert_eq!(report.rows_after, cleaned.height());

    let max_income = cleaned
        .column("income")
        .unwrap()
        .as_materialized_series()
        .max::<f64>()
        .unwrap()
        .unwrap();
    assert!(max_income < 2_500_000.0);
}

#[test]
fn test_cleaning_twice_changes_nothing_more_than_outliers() {
    let df = load_customers();
    let once = Cleaner::clean(df).unwrap();
    let (_, report) = Cleaner::clean_with_report(once).unwrap();

    assert!(report.imputed_cells.is_empty());
}
