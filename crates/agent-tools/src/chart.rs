//! Chart Tool
//!
//! Validates a Chart.js-style config and hands it to a [`ChartSink`]. The
//! rendered chart is the result; the tool turn only gets a confirmation.

use std::sync::Arc;

use agent_core::tool::{ParameterSchema, Tool, ToolDeclaration};
use agent_core::Result as CoreResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Result, ToolError};

/// Chart types the renderer understands
pub const CHART_TYPES: [&str; 6] = ["bar", "line", "pie", "doughnut", "radar", "polarArea"];

/// Receives validated chart configs for display
pub trait ChartSink: Send + Sync {
    fn render_chart(&self, config: Value);
}

/// Validated chart config
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub chart_type: String,
    pub data: ChartData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<f64>,
    /// Styling keys (colors, borders) passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChartConfig {
    pub fn from_value(value: &Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value.clone())
            .map_err(|e| ToolError::InvalidChart(e.to_string()))?;

        if !CHART_TYPES.contains(&config.chart_type.as_str()) {
            return Err(ToolError::InvalidChart(format!(
                "unsupported chart type '{}', expected one of {}",
                config.chart_type,
                CHART_TYPES.join(", ")
            )));
        }
        Ok(config)
    }
}

/// `createChart(chartConfig)`
pub struct ChartTool {
    sink: Arc<dyn ChartSink>,
}

impl ChartTool {
    pub fn new(sink: Arc<dyn ChartSink>) -> Self {
        Self { sink }
    }

    fn config_schema() -> Value {
        json!({
            "properties": {
                "type": {"type": "string", "enum": CHART_TYPES},
                "data": {
                    "type": "object",
                    "properties": {
                        "labels": {"type": "array", "items": {"type": "string"}},
                        "datasets": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "label": {"type": "string"},
                                    "data": {"type": "array", "items": {"type": "number"}}
                                },
                                "required": ["label", "data"]
                            }
                        }
                    },
                    "required": ["labels", "datasets"]
                },
                "options": {"type": "object"}
            },
            "required": ["type", "data"]
        })
    }
}

#[async_trait]
impl Tool for ChartTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: "createChart".into(),
            description: "Create a chart or graph visualization using Chart.js. Supports types like 'bar', 'line', 'pie', 'doughnut', and 'radar'.".into(),
            parameters: vec![ParameterSchema::new(
                "chartConfig",
                "object",
                "A configuration object that follows the Chart.js structure. It must include 'type', 'data', and optionally 'options'. The 'data' object needs 'labels' (an array of strings) and 'datasets' (an array of objects, each with a 'label' and a 'data' array of numbers).",
                true,
            )
            .with_schema(Self::config_schema())],
        }
    }

    async fn invoke(&self, argument: Value) -> CoreResult<String> {
        let config = ChartConfig::from_value(&argument)?;
        tracing::debug!(chart_type = %config.chart_type, datasets = config.data.datasets.len(), "Rendering chart");

        self.sink.render_chart(argument);
        Ok(format!(
            "Chart rendered: {} chart with {} dataset(s).",
            config.chart_type,
            config.data.datasets.len()
        ))
    }

    fn is_quiet(&self) -> bool {
        true
    }
}
