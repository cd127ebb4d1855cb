use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Increase,
    Decrease,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFormat {
    Number,
    Currency,
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Platform,
    Environmental,
    Financial,
    User,
}

/// A named value compared against its previous-period counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsMetric {
    pub id: String,
    pub name: String,
    pub value: f64,
    pub previous_value: f64,
    /// Absolute percentage delta; never negative.
    pub change: f64,
    pub change_type: ChangeType,
    pub unit: String,
    pub format: MetricFormat,
    pub category: MetricCategory,
    pub description: String,
}

/// The parts of a metric that do not depend on the data.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricMeta {
    pub id: &'static str,
    pub name: &'static str,
    pub unit: &'static str,
    pub format: MetricFormat,
    pub category: MetricCategory,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDataPoint {
    pub label: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Area,
}

/// Chart series ready for an external renderer. `data` is time-ascending
/// for line/bar/area charts and in first-seen order for pie charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsChart {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub data: Vec<ChartDataPoint>,
    pub metrics: Vec<String>,
    pub timeframe: String,
    pub category: MetricCategory,
}

/// Dashboard payload: metrics plus charts for one timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub timeframe: String,
    pub generated_at: DateTime<Utc>,
    pub metrics: Vec<AnalyticsMetric>,
    pub charts: Vec<AnalyticsChart>,
}
