//! Chart construction
//!
//! Turns a result set and the planner's chart request into a
//! Plotly-compatible figure document (`{data, layout}`).

use crate::db::Row;
use crate::error::{NlSqlError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
}

impl ChartKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_lowercase().as_str() {
            "bar" => Some(ChartKind::Bar),
            "line" => Some(ChartKind::Line),
            "scatter" => Some(ChartKind::Scatter),
            "pie" => Some(ChartKind::Pie),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
            ChartKind::Pie => "pie",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart object as the planner returned it; nothing is checked yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub x: String,
    pub y: Option<String>,
    pub title: String,
}

impl ChartSpec {
    /// Missing type means bar, missing title means "Visualization".
    pub fn resolve(request: &ChartRequest) -> Result<Self> {
        let raw_kind = non_empty(&request.kind).unwrap_or("bar");
        let kind = ChartKind::parse(raw_kind)
            .ok_or_else(|| NlSqlError::ChartSpecInvalid(format!("Unsupported chart type: {}", raw_kind)))?;

        let x = non_empty(&request.x)
            .ok_or_else(|| NlSqlError::ChartSpecInvalid("Chart spec missing x axis.".to_string()))?;
        let y = non_empty(&request.y);
        if kind != ChartKind::Pie && y.is_none() {
            return Err(NlSqlError::ChartSpecInvalid("Chart spec missing y axis.".to_string()));
        }

        Ok(Self {
            kind,
            x: x.to_string(),
            y: y.map(str::to_string),
            title: non_empty(&request.title).unwrap_or("Visualization").to_string(),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn extract(rows: &[Row], column: &str) -> Result<Vec<Value>> {
    rows.iter()
        .map(|row| {
            row.get(column).cloned().ok_or_else(|| {
                NlSqlError::ChartSpecInvalid(format!("Chart column not in result set: {}", column))
            })
        })
        .collect()
}

/// Build the figure. Checks, in order: rows present, chart type, axes, columns.
pub fn build_figure(rows: &[Row], request: &ChartRequest) -> Result<Value> {
    if rows.is_empty() {
        return Err(NlSqlError::ChartSpecInvalid(
            "Visualization query returned no data to plot.".to_string(),
        ));
    }
    let spec = ChartSpec::resolve(request)?;

    let trace = match spec.kind {
        ChartKind::Pie => {
            let values_col = spec.y.as_deref().unwrap_or(&spec.x);
            json!({
                "type": "pie",
                "labels": extract(rows, &spec.x)?,
                "values": extract(rows, values_col)?,
            })
        }
        kind => {
            let y_col = spec.y.as_deref().unwrap_or_default();
            let x = extract(rows, &spec.x)?;
            let y = extract(rows, y_col)?;
            match kind {
                ChartKind::Bar => json!({"type": "bar", "x": x, "y": y}),
                ChartKind::Line => json!({"type": "scatter", "mode": "lines", "x": x, "y": y}),
                _ => json!({"type": "scatter", "mode": "markers", "x": x, "y": y}),
            }
        }
    };

    let hovermode = match spec.kind {
        ChartKind::Bar | ChartKind::Line => "x unified",
        ChartKind::Scatter | ChartKind::Pie => "closest",
    };

    Ok(json!({
        "data": [trace],
        "layout": {
            "title": {"text": spec.title},
            "hovermode": hovermode,
        }
    }))
}
