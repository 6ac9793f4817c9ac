//! Chart-specific shapes built from [`transform`](super::transform) output.

use super::{ChartValue, Datum};
use crate::models::{BarLayout, ChartConfig, ChartType};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChartSeries {
    #[serde(rename_all = "camelCase")]
    Bar {
        keys: Vec<String>,
        index_by: String,
        layout: BarLayout,
        data: Vec<Datum>,
    },
    Line { series: Vec<LineSeries> },
    Pie { slices: Vec<PieSlice> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub id: String,
    pub data: Vec<LinePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinePoint {
    pub x: String,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub id: String,
    pub label: String,
    pub value: f64,
}

pub fn build_series(chart_type: ChartType, data: &[Datum], config: &ChartConfig) -> ChartSeries {
    match chart_type {
        ChartType::Bar => bar(data, config),
        ChartType::Line => ChartSeries::Line {
            series: line(data, config),
        },
        ChartType::Pie => ChartSeries::Pie {
            slices: pie(data, config),
        },
    }
}

/// Keys holding aggregated values in grouped data, in first-seen order.
pub fn group_keys(data: &[Datum], config: &ChartConfig) -> Vec<String> {
    let group_by = config.group_by();
    let keys: IndexSet<&str> = data
        .iter()
        .flat_map(Datum::keys)
        .filter(|key| *key != config.x_axis && Some(*key) != group_by)
        .collect();
    keys.into_iter().map(str::to_string).collect()
}

fn bar(data: &[Datum], config: &ChartConfig) -> ChartSeries {
    let keys = if config.group_by().is_some() {
        group_keys(data, config)
    } else {
        vec![config.y_axis.clone()]
    };

    ChartSeries::Bar {
        keys,
        index_by: config.x_axis.clone(),
        layout: config.bar_layout.unwrap_or_default(),
        data: data.to_vec(),
    }
}

fn line(data: &[Datum], config: &ChartConfig) -> Vec<LineSeries> {
    if config.group_by().is_none() {
        return vec![LineSeries {
            id: config.y_axis.clone(),
            data: data
                .iter()
                .map(|datum| point(datum, &config.x_axis, &config.y_axis))
                .collect(),
        }];
    }

    group_keys(data, config)
        .into_iter()
        .map(|group| LineSeries {
            data: data
                .iter()
                .filter(|datum| datum.get(&group).is_some())
                .map(|datum| point(datum, &config.x_axis, &group))
                .collect(),
            id: group,
        })
        .collect()
}

fn pie(data: &[Datum], config: &ChartConfig) -> Vec<PieSlice> {
    if config.group_by().is_none() {
        return data
            .iter()
            .map(|datum| {
                let label = label(datum, &config.x_axis);
                PieSlice {
                    id: label.clone(),
                    label,
                    value: number(datum, &config.y_axis),
                }
            })
            .collect();
    }

    let mut totals: IndexMap<String, f64> = IndexMap::new();
    for group in group_keys(data, config) {
        let total = data.iter().map(|datum| number(datum, &group)).sum();
        totals.insert(group, total);
    }

    totals
        .into_iter()
        .map(|(group, value)| PieSlice {
            id: group.clone(),
            label: group,
            value,
        })
        .collect()
}

fn point(datum: &Datum, x_axis: &str, key: &str) -> LinePoint {
    LinePoint {
        x: label(datum, x_axis),
        y: number(datum, key),
    }
}

fn label(datum: &Datum, key: &str) -> String {
    datum.get(key).map(ChartValue::to_string).unwrap_or_default()
}

fn number(datum: &Datum, key: &str) -> f64 {
    datum.get(key).and_then(ChartValue::as_number).unwrap_or(0.0)
}
