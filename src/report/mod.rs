//! Project progress reports: timeline synthesis, period comparison and
//! composition of the full report.

pub mod composer;
pub mod insights;
pub mod timeline;
pub mod types;

pub use composer::{compose_report, ComposeOptions, ReportInputs};
pub use insights::{compare, period_metrics, Comparison, PeriodMetrics};
pub use timeline::{synthesize_timeline, timeline_health};
pub use types::*;
