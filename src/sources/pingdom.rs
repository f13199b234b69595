use serde::Deserialize;
use std::sync::Arc;

use crate::calendar::DateWindow;
use crate::config::PingdomConfig;
use crate::error::{Result, Source};
use crate::fetch::{fetch_json, Auth, FetchRequest, Fetcher};

#[derive(Debug, Clone, Deserialize)]
struct OutageSummary {
    #[serde(default)]
    summary: Option<OutageStates>,
}

#[derive(Debug, Clone, Deserialize)]
struct OutageStates {
    #[serde(default)]
    states: Vec<OutageInterval>,
}

/// One state interval of a monitored check (unix seconds)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutageInterval {
    pub status: String,
    pub timefrom: i64,
    pub timeto: i64,
}

impl OutageInterval {
    pub fn is_down(&self) -> bool {
        self.status == "down"
    }

    /// Seconds of downtime, never negative; 0 for non-down states
    pub fn downtime_seconds(&self) -> i64 {
        if self.is_down() {
            (self.timeto - self.timefrom).max(0)
        } else {
            0
        }
    }
}

#[derive(Clone)]
pub struct PingdomClient {
    fetcher: Arc<dyn Fetcher>,
    config: PingdomConfig,
}

impl PingdomClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: PingdomConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn check_ids(&self) -> &[String] {
        &self.config.check_ids
    }

    /// Outage summary of one check over the window
    pub async fn outages(&self, check_id: &str, window: &DateWindow) -> Result<Vec<OutageInterval>> {
        let request = FetchRequest::get(
            Source::Pingdom,
            format!(
                "{}/summary.outage/{check_id}",
                self.config.api_url.trim_end_matches('/')
            ),
        )
        .query("from", window.start_instant().timestamp())
        .query("to", window.end_instant().timestamp())
        .auth(Auth::Bearer(self.config.api_token.clone()))
        .header("Accept", "application/json");

        let summary: OutageSummary = fetch_json(self.fetcher.as_ref(), &request).await?;
        Ok(summary.summary.map(|s| s.states).unwrap_or_default())
    }
}
