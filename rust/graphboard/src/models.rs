//! Persisted graph definitions and the request/response bodies of the API.

use crate::{
    chart::{Aggregate, Datum, Row, TransformOptions},
    chart::series::ChartSeries,
    params::ParameterType,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BarLayout {
    #[default]
    Grouped,
    Stacked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    pub x_axis: String,
    pub y_axis: String,
    pub aggregate: Aggregate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bar_layout: Option<BarLayout>,
}

impl ChartConfig {
    /// Group-by column, treating an empty selection as no grouping.
    pub fn group_by(&self) -> Option<&str> {
        self.group_by.as_deref().filter(|column| !column.is_empty())
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            x_axis: self.x_axis.clone(),
            y_axis: self.y_axis.clone(),
            aggregate: self.aggregate,
            group_by: self.group_by().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParameterType,
    #[serde(default)]
    pub default_value: String,
}

/// A stored dashboard graph: one query and how to chart its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphConfig {
    pub id: String,
    pub name: String,
    pub query: String,
    pub location: String,
    pub chart_type: ChartType,
    pub chart_config: ChartConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<ParameterDefinition>>,
}

impl GraphConfig {
    pub fn parameters(&self) -> &[ParameterDefinition] {
        self.parameters.as_deref().unwrap_or_default()
    }
}

/// Body accepted by both create and update. Every field is optional so the
/// handlers can report missing fields and apply partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub chart_type: Option<ChartType>,
    #[serde(default)]
    pub chart_config: Option<ChartConfig>,
    #[serde(default)]
    pub parameters: Option<Vec<ParameterDefinition>>,
}

impl GraphPayload {
    /// Applies the payload over an existing record, keeping stored values for
    /// omitted fields.
    pub fn merge_into(self, existing: GraphConfig) -> GraphConfig {
        GraphConfig {
            id: existing.id,
            name: self.name.unwrap_or(existing.name),
            query: self.query.unwrap_or(existing.query),
            location: self.location.unwrap_or(existing.location),
            chart_type: self.chart_type.unwrap_or(existing.chart_type),
            chart_config: self.chart_config.unwrap_or(existing.chart_config),
            parameters: self.parameters.or(existing.parameters),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub parameter_types: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub success: bool,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametersRequest {
    pub query: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParametersResponse {
    pub success: bool,
    pub parameters: Vec<ParameterDefinition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphResponse {
    pub success: bool,
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphListResponse {
    pub success: bool,
    pub graphs: Vec<GraphConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartResponse {
    pub success: bool,
    pub graph: GraphConfig,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub data: Vec<Datum>,
    pub series: ChartSeries,
}
