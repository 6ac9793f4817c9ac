//! Pivots warehouse rows into chart-ready data.
//!
//! Rows are grouped by the x-axis value (and optionally a group-by column),
//! the y-axis values of each bucket are aggregated, and one [`Datum`] is
//! emitted per distinct x value in first-seen order. Coercion is permissive:
//! anything that does not read as a number counts as `0` so a malformed cell
//! never fails a chart.

pub mod series;

use indexmap::IndexMap;
use serde::{
    de::Deserializer,
    ser::{SerializeMap, Serializer},
    Deserialize, Serialize,
};
use serde_json::Value;
use thiserror::Error;

/// One result row, keyed by column name in warehouse column order.
pub type Row = IndexMap<String, Scalar>;

/// A single warehouse cell.
///
/// `Temporal` wraps the inner value of DATE/DATETIME/TIMESTAMP cells, which
/// travel over JSON as `{"value": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Number(f64),
    Text(String),
    Temporal(Box<Scalar>),
}

static NULL: Scalar = Scalar::Null;

impl Scalar {
    pub fn temporal(inner: impl Into<Scalar>) -> Self {
        Self::Temporal(Box::new(inner.into()))
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(mut map) if map.contains_key("value") => {
                let inner = map.remove("value").unwrap_or(Value::Null);
                Self::Temporal(Box::new(Self::flat_from_json(inner)))
            }
            other => Self::flat_from_json(other),
        }
    }

    fn flat_from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Number(number) => number.as_f64().map_or(Self::Null, Self::Number),
            Value::String(text) => Self::Text(text),
            Value::Bool(flag) => Self::Text(flag.to_string()),
            nested @ (Value::Array(_) | Value::Object(_)) => Self::Text(nested.to_string()),
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_none(),
            Scalar::Number(number) => serializer.serialize_f64(*number),
            Scalar::Text(text) => serializer.serialize_str(text),
            Scalar::Temporal(inner) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("value", inner)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Scalar::from_json)
    }
}

/// A coerced cell as it appears in chart data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartValue {
    Number(f64),
    Text(String),
}

impl ChartValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ChartValue::Number(number) => Some(*number),
            ChartValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for ChartValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChartValue::Number(number) => f.write_str(&format_number(*number)),
            ChartValue::Text(text) => f.write_str(text),
        }
    }
}

/// One chart point: the x-axis column plus either the y-axis column or one
/// entry per group value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Datum(IndexMap<String, ChartValue>);

impl Datum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ChartValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ChartValue> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, ChartValue)> for Datum {
    fn from_iter<I: IntoIterator<Item = (K, ChartValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    /// Folds a bucket of values. Every function yields `0` for an empty
    /// bucket, including `min` and `max`.
    pub fn apply(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }

        match self {
            Aggregate::Sum => values.iter().sum(),
            Aggregate::Count => values.len() as f64,
            Aggregate::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Aggregate::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregate::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformOptions {
    pub x_axis: String,
    pub y_axis: String,
    pub aggregate: Aggregate,
    pub group_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("X-axis column \"{0}\" not found in data")]
    MissingXAxis(String),

    #[error("Y-axis column \"{0}\" not found in data")]
    MissingYAxis(String),

    #[error("Group by column \"{0}\" not found in data")]
    MissingGroupBy(String),
}

/// Column names of the first row, in that row's order.
pub fn available_columns(rows: &[Row]) -> Vec<String> {
    rows.first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default()
}

/// Checks that the chosen axes exist among `columns`. An empty group-by is
/// treated as no grouping.
pub fn validate_config(
    columns: &[String],
    x_axis: &str,
    y_axis: &str,
    group_by: Option<&str>,
) -> Result<(), ConfigError> {
    let has = |name: &str| columns.iter().any(|column| column == name);

    if !has(x_axis) {
        return Err(ConfigError::MissingXAxis(x_axis.to_string()));
    }
    if !has(y_axis) {
        return Err(ConfigError::MissingYAxis(y_axis.to_string()));
    }
    if let Some(group_by) = group_by.filter(|column| !column.is_empty()) {
        if !has(group_by) {
            return Err(ConfigError::MissingGroupBy(group_by.to_string()));
        }
    }

    Ok(())
}

/// Aggregation-path coercion: null is `0`, temporal values are unwrapped and
/// anything that reads as a finite number becomes one. Blank text counts as
/// `0`, so blank x cells share the `"0"` bucket.
pub fn extract_chart_value(value: &Scalar) -> ChartValue {
    match value {
        Scalar::Null => ChartValue::Number(0.0),
        Scalar::Temporal(inner) => extract_chart_value(inner),
        Scalar::Number(number) if number.is_finite() => ChartValue::Number(*number),
        Scalar::Number(number) => ChartValue::Text(number.to_string()),
        Scalar::Text(text) => match parse_finite(text) {
            Some(number) => ChartValue::Number(number),
            None => ChartValue::Text(text.clone()),
        },
    }
}

/// Numeric form used for y-axis values; non-numeric cells count as `0`.
pub fn numeric_value(value: &Scalar) -> f64 {
    extract_chart_value(value).as_number().unwrap_or(0.0)
}

/// Display-path coercion for raw result tables: null renders as `NULL`.
pub fn display_value(value: &Scalar) -> String {
    match value {
        Scalar::Null => "NULL".to_string(),
        Scalar::Temporal(inner) => match inner.as_ref() {
            Scalar::Null => "null".to_string(),
            other => display_value(other),
        },
        Scalar::Number(number) => format_number(*number),
        Scalar::Text(text) => text.clone(),
    }
}

/// Groups `rows` and aggregates the y-axis per bucket.
///
/// Column references are assumed valid (see [`validate_config`]); a missing
/// cell reads as null.
pub fn transform(rows: &[Row], options: &TransformOptions) -> Vec<Datum> {
    if rows.is_empty() {
        return Vec::new();
    }

    match options.group_by.as_deref().filter(|column| !column.is_empty()) {
        None => transform_ungrouped(rows, options),
        Some(group_by) => transform_grouped(rows, options, group_by),
    }
}

fn transform_ungrouped(rows: &[Row], options: &TransformOptions) -> Vec<Datum> {
    let mut buckets: IndexMap<String, Vec<f64>> = IndexMap::new();

    for row in rows {
        let x = chart_key(cell(row, &options.x_axis));
        let y = numeric_value(cell(row, &options.y_axis));
        buckets.entry(x).or_default().push(y);
    }

    buckets
        .into_iter()
        .map(|(x, values)| {
            let mut datum = Datum::new();
            datum.insert(options.x_axis.clone(), ChartValue::Text(x));
            datum.insert(
                options.y_axis.clone(),
                ChartValue::Number(options.aggregate.apply(&values)),
            );
            datum
        })
        .collect()
}

fn transform_grouped(rows: &[Row], options: &TransformOptions, group_by: &str) -> Vec<Datum> {
    let mut buckets: IndexMap<String, IndexMap<String, Vec<f64>>> = IndexMap::new();

    for row in rows {
        let x = chart_key(cell(row, &options.x_axis));
        let y = numeric_value(cell(row, &options.y_axis));
        let group = chart_key(cell(row, group_by));
        buckets
            .entry(x)
            .or_default()
            .entry(group)
            .or_default()
            .push(y);
    }

    buckets
        .into_iter()
        .map(|(x, groups)| {
            let mut datum = Datum::new();
            datum.insert(options.x_axis.clone(), ChartValue::Text(x));
            for (group, values) in groups {
                datum.insert(group, ChartValue::Number(options.aggregate.apply(&values)));
            }
            datum
        })
        .collect()
}

fn cell<'a>(row: &'a Row, column: &str) -> &'a Scalar {
    row.get(column).unwrap_or(&NULL)
}

fn chart_key(value: &Scalar) -> String {
    extract_chart_value(value).to_string()
}

fn parse_finite(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|number| number.is_finite())
}

pub(crate) fn format_number(number: f64) -> String {
    if number == 0.0 {
        // Avoid rendering negative zero as "-0".
        return "0".to_string();
    }
    number.to_string()
}
