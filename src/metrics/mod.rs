//! Metrics collection and export

mod counters;
mod exporter;

pub use counters::{Metrics, MetricsSnapshot, METRICS};
pub use exporter::init_metrics;
