//! Metric functions and their result types

pub mod engine;
pub mod models;

pub use engine::{month_window, MetricsEngine, DEPLOYMENT_SHEET_HEADER};
pub use models::{DeploymentCount, Metric, OutageTotals, Rounding};
