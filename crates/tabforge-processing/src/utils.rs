//! Shared utilities for loading, profiling and cleaning.
//!
//! This module contains common helper functions used across multiple modules
//! (and by the learning crate) so dtype checks, numeric parsing and the
//! canonical category representation stay consistent between training and
//! prediction.

use polars::prelude::*;
use std::collections::BTreeMap;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is an integer type.
#[inline]
pub fn is_integer_dtype(dtype: &DataType) -> bool {
    is_numeric_dtype(dtype) && !matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Check if a Series stores numbers.
#[inline]
pub fn is_numeric_series(series: &Series) -> bool {
    is_numeric_dtype(series.dtype())
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Try to parse a string as a finite numeric value (f64).
///
/// Surrounding whitespace is ignored. `NaN` and infinities are rejected so a
/// parsed value can always be fed to an estimator.
///
/// # Example
///
/// ```rust
/// use tabforge_processing::utils::parse_numeric_string;
///
/// assert_eq!(parse_numeric_string(" 42 "), Some(42.0));
/// assert_eq!(parse_numeric_string("Paris"), None);
/// ```
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Canonical string form of a number used as a category label.
///
/// Integral floats print without a fractional part (`3.0` → `"3"`), so a
/// value read as `Int64` at training time and one coerced from text at
/// prediction time map to the same category.
pub fn format_category(value: f64) -> String {
    format!("{value}")
}

// =============================================================================
// Series Statistics Utilities
// =============================================================================

/// Most frequent value among `values`.
///
/// Ties resolve to the smallest value in ascending string order.
pub fn mode_of<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for val in values {
        *counts.entry(val).or_insert(0) += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (val, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((val, count));
        }
    }
    best.map(|(val, _)| val.to_string())
}

/// Calculate the mode (most frequent value) of a Series as a string.
pub fn string_mode(series: &Series) -> Option<String> {
    let categories = series_categories(series).ok()?;
    mode_of(categories.iter().flatten().map(String::as_str))
}

/// Quantile of already sorted values using linear interpolation between the
/// two closest ranks.
pub fn quantile_linear(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

// =============================================================================
// Series Conversion Utilities
// =============================================================================

/// Read a numeric Series as `Option<f64>` values.
pub fn series_f64(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let float_series = series.cast(&DataType::Float64)?;
    Ok(float_series.f64()?.into_iter().collect())
}

/// Read any Series as canonical category strings (`None` for missing).
///
/// Numbers go through [`format_category`]; everything else through its
/// string cast.
pub fn series_categories(series: &Series) -> PolarsResult<Vec<Option<String>>> {
    if is_numeric_series(series) {
        return Ok(series_f64(series)?
            .into_iter()
            .map(|v| v.map(format_category))
            .collect());
    }

    let str_series = series.cast(&DataType::String)?;
    Ok(str_series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Fill null values in a numeric Series with a specific value.
///
/// The result is always `Float64`.
pub fn fill_numeric_nulls(series: &Series, fill_value: f64) -> PolarsResult<Series> {
    let filled: Vec<f64> = series_f64(series)?
        .into_iter()
        .map(|v| v.unwrap_or(fill_value))
        .collect();
    Ok(Series::new(series.name().clone(), filled))
}

/// Fill null values in a Series with a string value.
///
/// The result is always a `String` Series.
pub fn fill_string_nulls(series: &Series, fill_value: &str) -> PolarsResult<Series> {
    let str_series = series.cast(&DataType::String)?;
    let filled: Vec<String> = str_series
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or(fill_value).to_string())
        .collect();
    Ok(Series::new(series.name().clone(), filled))
}

/// Convert a single cell to JSON, keeping integers integral.
pub fn any_value_to_json(value: &AnyValue<'_>) -> serde_json::Value {
    use serde_json::Value;

    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::String(s) => Value::String((*s).to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(v) => Value::from(*v),
        AnyValue::Int16(v) => Value::from(*v),
        AnyValue::Int32(v) => Value::from(*v),
        AnyValue::Int64(v) => Value::from(*v),
        AnyValue::UInt8(v) => Value::from(*v),
        AnyValue::UInt16(v) => Value::from(*v),
        AnyValue::UInt32(v) => Value::from(*v),
        AnyValue::UInt64(v) => Value::from(*v),
        AnyValue::Float32(v) => Value::from(f64::from(*v)),
        AnyValue::Float64(v) => Value::from(*v),
        other => Value::String(other.to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
        assert!(is_integer_dtype(&DataType::UInt8));
        assert!(!is_integer_dtype(&DataType::Float32));
    }

    #[test]
    fn test_parse_numeric_string() {
        assert_eq!(parse_numeric_string("42"), Some(42.0));
        assert_eq!(parse_numeric_string("  -3.5 "), Some(-3.5));
        assert_eq!(parse_numeric_string("1e3"), Some(1000.0));
        assert_eq!(parse_numeric_string(""), None);
        assert_eq!(parse_numeric_string("hello"), None);
        assert_eq!(parse_numeric_string("NaN"), None);
        assert_eq!(parse_numeric_string("inf"), None);
    }

    #[test]
    fn test_format_category() {
        assert_eq!(format_category(3.0), "3");
        assert_eq!(format_category(2.5), "2.5");
        assert_eq!(format_category(-1.0), "-1");
    }

    #[test]
    fn test_mode_of_prefers_smallest_on_tie() {
        assert_eq!(mode_of(["b", "a", "b", "a"]), Some("a".to_string()));
        assert_eq!(mode_of(["z", "y", "z"]), Some("z".to_string()));
        assert_eq!(mode_of(Vec::<&str>::new()), None);
    }

    #[test]
    fn test_string_mode() {
        let series = Series::new("test".into(), &[Some("a"), Some("b"), None, Some("a")]);
        assert_eq!(string_mode(&series), Some("a".to_string()));
    }

    #[test]
    fn test_quantile_linear() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_linear(&sorted, 0.25), Some(1.75));
        assert_eq!(quantile_linear(&sorted, 0.5), Some(2.5));
        assert_eq!(quantile_linear(&sorted, 0.75), Some(3.25));
        assert_eq!(quantile_linear(&[7.0], 0.25), Some(7.0));
        assert_eq!(quantile_linear(&[], 0.5), None);
    }

    #[test]
    fn test_series_categories_canonical_numbers() {
        let ints = Series::new("i".into(), &[Some(1i64), None, Some(3)]);
        assert_eq!(
            series_categories(&ints).unwrap(),
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );

        let floats = Series::new("f".into(), &[1.0f64, 2.5]);
        assert_eq!(
            series_categories(&floats).unwrap(),
            vec![Some("1".to_string()), Some("2.5".to_string())]
        );
    }

    #[test]
    fn test_fill_numeric_nulls() {
        let series = Series::new("test".into(), &[Some(1.0), None, Some(3.0)]);
        let filled = fill_numeric_nulls(&series, 0.0).unwrap();

        assert_eq!(filled.null_count(), 0);
        assert_eq!(filled.get(1).unwrap().try_extract::<f64>().unwrap(), 0.0);
        assert_eq!(filled.get(2).unwrap().try_extract::<f64>().unwrap(), 3.0);
    }

    #[test]
    fn test_fill_string_nulls() {
        let series = Series::new("test".into(), &[Some("a"), None]);
        let filled = fill_string_nulls(&series, "z").unwrap();
        let values: Vec<Option<&str>> = filled.str().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some("a"), Some("z")]);
    }

    #[test]
    fn test_any_value_to_json() {
        assert_eq!(any_value_to_json(&AnyValue::Null), serde_json::Value::Null);
        assert_eq!(any_value_to_json(&AnyValue::Int64(3)), serde_json::json!(3));
        assert_eq!(any_value_to_json(&AnyValue::String("x")), serde_json::json!("x"));
        assert_eq!(any_value_to_json(&AnyValue::Float64(1.5)), serde_json::json!(1.5));
    }
}
