use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::calendar::DateWindow;
use crate::config::JiraConfig;
use crate::error::{Result, Source};
use crate::fetch::{fetch_json, Auth, FetchRequest, Fetcher};
use crate::pagination::{Page, Pagination, Paginator};
use crate::timeline::{IssueRecord, StatusTransition, StatusVocabulary};

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl Page for SearchPage {
    type Item = Issue;

    fn total(&self) -> Option<u64> {
        Some(self.total.unwrap_or(0))
    }

    fn into_items(self) -> Vec<Issue> {
        self.issues
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: Option<IssueFields>,
    #[serde(default)]
    pub changelog: Option<Changelog>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub parent: Option<IssueRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueRef {
    pub key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Changelog {
    #[serde(default)]
    pub histories: Vec<History>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct History {
    pub created: String,
    #[serde(default)]
    pub items: Vec<ChangeItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeItem {
    pub field: String,
    #[serde(rename = "fromString", default)]
    pub from_string: Option<String>,
    #[serde(rename = "toString", default)]
    pub to_string: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CountResponse {
    #[serde(default)]
    total: Option<u64>,
}

/// Parse Jira timestamps such as `2024-01-08T09:15:00.000+0000`
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl Issue {
    pub fn parent_key(&self) -> Option<&str> {
        self.fields
            .as_ref()
            .and_then(|f| f.parent.as_ref())
            .map(|p| p.key.as_str())
    }

    /// Status transitions from the changelog. Histories with unparseable
    /// timestamps are dropped.
    pub fn to_record(&self, vocabulary: &StatusVocabulary) -> IssueRecord {
        let histories = self
            .changelog
            .as_ref()
            .map_or(&[][..], |c| c.histories.as_slice());

        let mut transitions = Vec::new();
        for history in histories {
            let Some(at) = parse_timestamp(&history.created) else {
                continue;
            };
            for item in history.items.iter().filter(|i| i.field == "status") {
                let Some(to) = item.to_string.as_deref() else {
                    continue;
                };
                transitions.push(StatusTransition {
                    at,
                    from: item.from_string.as_deref().map(|s| vocabulary.classify(s)),
                    to: vocabulary.classify(to),
                });
            }
        }

        IssueRecord {
            key: self.key.clone(),
            transitions,
        }
    }
}

#[derive(Clone)]
pub struct JiraClient {
    fetcher: Arc<dyn Fetcher>,
    config: JiraConfig,
}

impl JiraClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: JiraConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &JiraConfig {
        &self.config
    }

    fn request(&self, request: FetchRequest) -> FetchRequest {
        request
            .auth(Auth::Basic {
                username: self.config.email.clone(),
                password: self.config.api_token.clone(),
            })
            .header("Accept", "application/json")
    }

    fn search_url(&self) -> String {
        format!("{}/rest/api/3/search", self.config.base_url.trim_end_matches('/'))
    }

    /// Issues of the project that reached a done status since the window start
    pub fn done_issues_jql(&self, window: &DateWindow) -> String {
        let done: Vec<String> = self
            .config
            .statuses
            .done
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect();
        format!(
            "project = {} AND status in ({}) AND statusCategoryChangedDate >= \"{}\" ORDER BY updated DESC",
            self.config.project_key,
            done.join(", "),
            window.start().format("%Y-%m-%d")
        )
    }

    pub fn bugs_jql(&self, window: &DateWindow) -> String {
        format!(
            "project = {} AND {} AND created >= \"{}\" AND created <= \"{}\"",
            self.config.project_key,
            self.config.bug_filter,
            window.start().format("%Y-%m-%d"),
            window.end().format("%Y-%m-%d")
        )
    }

    fn pagination(&self) -> Pagination {
        Pagination::Counted {
            start_param: "startAt",
            size_param: "maxResults",
            page_size: self.config.page_size,
        }
    }

    /// Done issues with their change history expanded
    pub fn done_issues_with_changelog(&self, window: &DateWindow) -> Paginator<'_, SearchPage> {
        let request = self.request(
            FetchRequest::get(Source::Jira, self.search_url())
                .query("jql", self.done_issues_jql(window))
                .query("expand", "changelog"),
        );
        Paginator::new(self.fetcher.as_ref(), request, self.pagination())
    }

    /// Done issues with only their parent link
    pub fn done_issues_with_parent(&self, window: &DateWindow) -> Paginator<'_, SearchPage> {
        let request = self.request(
            FetchRequest::get(Source::Jira, self.search_url())
                .query("jql", self.done_issues_jql(window))
                .query("fields", "parent"),
        );
        Paginator::new(self.fetcher.as_ref(), request, self.pagination())
    }

    /// Number of bugs created inside the window, read from the search total
    pub async fn count_bugs(&self, window: &DateWindow) -> Result<u64> {
        let body = json!({
            "jql": self.bugs_jql(window),
            "maxResults": 0,
        });
        let request = self.request(FetchRequest::post(Source::Jira, self.search_url(), body));

        let response: CountResponse = fetch_json(self.fetcher.as_ref(), &request).await?;
        Ok(response.total.unwrap_or(0))
    }
}
