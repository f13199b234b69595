//! Delivery-performance metrics (DORA and ad-hoc KPIs) aggregated from
//! Jira, Bitbucket, Pingdom and Metabase.

pub mod cache;
pub mod calendar;
pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod pagination;
pub mod resolver;
pub mod sources;
pub mod stats;
pub mod storage;
pub mod timeline;

pub use error::{MetricsError, Result};
