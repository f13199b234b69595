#![allow(dead_code)]

use async_trait::async_trait;
use dora_metrics::config::Config;
use dora_metrics::error::{MetricsError, Result};
use dora_metrics::fetch::{FetchRequest, FetchResponse, Fetcher};
use std::sync::Mutex;

/// Scripted `Fetcher`: answers from `(url fragment, status, body)` routes,
/// first match wins, and records every URL requested.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Vec<(String, u16, String)>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, fragment: &str, status: u16, body: impl ToString) -> Self {
        self.routes
            .push((fragment.to_string(), status, body.to_string()));
        self
    }

    pub fn request_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn requests_matching(&self, fragment: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(fragment))
            .count()
    }
}

fn full_url(request: &FetchRequest) -> String {
    let query: Vec<String> = request
        .query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    if query.is_empty() {
        request.url.clone()
    } else {
        format!("{}?{}", request.url, query.join("&"))
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = full_url(request);
        self.seen.lock().unwrap().push(url.clone());

        self.routes
            .iter()
            .find(|(fragment, _, _)| url.contains(fragment.as_str()))
            .map(|(_, status, body)| FetchResponse {
                status: *status,
                body: body.clone(),
            })
            .ok_or_else(|| MetricsError::unavailable(request.source, format!("no route for {url}")))
    }
}

/// Template config pointed at fake hosts
pub fn test_config() -> Config {
    let mut config = Config::template();
    config.jira.base_url = "https://jira.test".to_string();
    config.jira.epic_key = "ENG-40".to_string();
    config.bitbucket.api_url = "https://bitbucket.test/2.0".to_string();
    config.bitbucket.workspace = "acme".to_string();
    config.bitbucket.allowed_repos = vec!["api".to_string()];
    config.pingdom.api_url = "https://pingdom.test/api/3.1".to_string();
    config.pingdom.check_ids = vec!["101".to_string(), "102".to_string()];
    config.metabase.url = "https://metabase.test".to_string();
    config
}
