//! Named `:param` placeholders in SQL templates.
//!
//! Extraction reports the parameters a template references; substitution
//! renders caller-supplied values into the template before it is sent to the
//! warehouse. Neither operation fails: unknown placeholders pass through.

use crate::models::ParameterDefinition;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z0-9_]+)").expect("placeholder pattern is valid"));

/// Declared type of a query parameter. Only `Number` is rendered unquoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    #[default]
    Text,
    Number,
    Date,
    Datetime,
}

impl ParameterType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "datetime" => Some(Self::Datetime),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Datetime => "datetime",
        }
    }
}

/// Returns every distinct parameter name in order of first appearance.
pub fn extract_parameters(template: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// Replaces each `:name` that has a value with its formatted literal.
///
/// A match must end on a word boundary, so a value for `start` leaves
/// `:start_date` untouched. Types are looked up by name; a missing or
/// unrecognised type is rendered like `text`.
pub fn substitute_parameters(
    template: &str,
    values: &BTreeMap<String, String>,
    types: &BTreeMap<String, String>,
) -> String {
    let mut result = template.to_string();

    for (name, value) in values {
        let declared = types.get(name).and_then(|raw| ParameterType::parse(raw));
        let literal = format_literal(value, declared);
        result = replace_placeholder(&result, name, &literal);
    }

    result
}

fn replace_placeholder(sql: &str, name: &str, literal: &str) -> String {
    let needle = format!(":{name}");
    let bytes = sql.as_bytes();
    // A boundary sits between a word and a non-word byte, so what must follow
    // depends on how the needle itself ends.
    let ends_in_word = needle.bytes().last().is_some_and(is_word_byte);
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0usize;

    for (start, _) in sql.match_indices(&needle) {
        let end = start + needle.len();
        let next_is_word = bytes.get(end).is_some_and(|b| is_word_byte(*b));
        if next_is_word == ends_in_word {
            continue;
        }
        out.push_str(&sql[copied..start]);
        out.push_str(literal);
        copied = end;
    }

    out.push_str(&sql[copied..]);
    out
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

// Quotes are escaped with a backslash, which BigQuery accepts but standard SQL
// does not (`''`). Callers rely on the exact output.
fn format_literal(value: &str, declared: Option<ParameterType>) -> String {
    match declared {
        Some(ParameterType::Number) => value.to_string(),
        _ => format!("'{}'", value.replace('\'', "\\'")),
    }
}

/// Reconciles stored definitions with the placeholders a template now uses.
///
/// Existing definitions survive untouched, new names start as empty `text`
/// parameters and names no longer referenced are dropped.
pub fn sync_definitions(
    template: &str,
    existing: &[ParameterDefinition],
) -> Vec<ParameterDefinition> {
    let known: HashMap<&str, &ParameterDefinition> = existing
        .iter()
        .map(|definition| (definition.name.as_str(), definition))
        .collect();

    extract_parameters(template)
        .into_iter()
        .map(|name| match known.get(name.as_str()) {
            Some(definition) => (*definition).clone(),
            None => ParameterDefinition {
                name,
                param_type: ParameterType::Text,
                default_value: String::new(),
            },
        })
        .collect()
}

/// Builds the value and type maps consumed by [`substitute_parameters`].
pub fn values_and_types(
    definitions: &[ParameterDefinition],
    overrides: &HashMap<String, String>,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut values = BTreeMap::new();
    let mut types = BTreeMap::new();

    for definition in definitions {
        let value = overrides
            .get(&definition.name)
            .cloned()
            .unwrap_or_else(|| definition.default_value.clone());
        values.insert(definition.name.clone(), value);
        types.insert(
            definition.name.clone(),
            definition.param_type.as_str().to_string(),
        );
    }

    (values, types)
}
