use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::BitbucketConfig;
use crate::error::{Result, Source};
use crate::fetch::{fetch_json, Auth, FetchRequest, Fetcher};
use crate::pagination::{Page, Pagination, Paginator};

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryPage {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub values: Vec<Repository>,
}

impl Page for RepositoryPage {
    type Item = Repository;

    fn next_link(&self) -> Option<String> {
        self.next.clone()
    }

    fn into_items(self) -> Vec<Repository> {
        self.values
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentPage {
    #[serde(default)]
    pub values: Vec<Deployment>,
}

impl Page for DeploymentPage {
    type Item = Deployment;

    fn into_items(self) -> Vec<Deployment> {
        self.values
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub environment: Option<EnvironmentRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentRef {
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub name: Option<String>,
}

/// A deployment with everything needed to classify it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub created_at: DateTime<Utc>,
    pub environment_id: String,
    pub repository: String,
}

impl Deployment {
    /// `None` when the creation time or environment reference is missing
    /// or unreadable.
    pub fn to_record(&self, repository: &str) -> Option<DeploymentRecord> {
        let created_at = self
            .created_on
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())?
            .with_timezone(&Utc);
        let environment_id = self.environment.as_ref()?.uuid.clone()?;

        Some(DeploymentRecord {
            created_at,
            environment_id,
            repository: repository.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct BitbucketClient {
    fetcher: Arc<dyn Fetcher>,
    config: BitbucketConfig,
}

impl BitbucketClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: BitbucketConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &BitbucketConfig {
        &self.config
    }

    pub fn is_allowed(&self, slug: &str) -> bool {
        self.config.allowed_repos.iter().any(|r| r == slug)
    }

    fn request(&self, url: String) -> FetchRequest {
        FetchRequest::get(Source::Bitbucket, url)
            .auth(Auth::Basic {
                username: self.config.username.clone(),
                password: self.config.app_password.clone(),
            })
            .header("Accept", "application/json")
    }

    fn repositories_url(&self) -> String {
        format!(
            "{}/repositories/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.workspace
        )
    }

    /// Repositories of the workspace, following `next` links
    pub fn repositories(&self) -> Paginator<'_, RepositoryPage> {
        let request = self
            .request(self.repositories_url())
            .query("pagelen", self.config.page_size);
        Paginator::new(self.fetcher.as_ref(), request, Pagination::Cursor)
    }

    /// Deployments of one repository; the listing reports neither a total
    /// nor a next link, so a short page ends the walk.
    pub fn deployments(&self, slug: &str) -> Paginator<'_, DeploymentPage> {
        let request = self.request(format!("{}/{slug}/deployments/", self.repositories_url()));
        let pagination = Pagination::Heuristic {
            page_param: "page",
            size_param: "pagelen",
            page_size: self.config.page_size,
        };
        Paginator::new(self.fetcher.as_ref(), request, pagination)
    }

    /// Look up one environment; `uuid` must already be stripped of braces
    pub async fn environment(&self, slug: &str, uuid: &str) -> Result<Environment> {
        let request = self.request(format!(
            "{}/{slug}/environments/%7B{uuid}%7D",
            self.repositories_url()
        ));
        fetch_json(self.fetcher.as_ref(), &request).await
    }
}
