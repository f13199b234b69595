//! Memoized environment-id to environment-name lookups
//!
//! A resolver lives for one aggregation run only. Every run builds a fresh
//! one, so renamed environments are picked up on the next run.

use std::collections::HashMap;
use tracing::debug;

use crate::error::Result;
use crate::sources::BitbucketClient;

/// Strip the braces Bitbucket wraps around environment UUIDs
pub fn normalize_environment_id(id: &str) -> String {
    id.trim().replace(['{', '}'], "")
}

/// Case-insensitive environment name comparison
pub fn environment_matches(name: &str, target: &str) -> bool {
    name.to_lowercase() == target.to_lowercase()
}

pub struct EnvironmentResolver<'a> {
    client: &'a BitbucketClient,
    names: HashMap<String, String>,
    lookups: usize,
}

impl<'a> EnvironmentResolver<'a> {
    pub fn new(client: &'a BitbucketClient) -> Self {
        Self {
            client,
            names: HashMap::new(),
            lookups: 0,
        }
    }

    /// Resolve an environment name, asking the source at most once per
    /// distinct id. Environments without a name resolve to "".
    pub async fn resolve(&mut self, repository: &str, environment_id: &str) -> Result<String> {
        let id = normalize_environment_id(environment_id);
        if let Some(name) = self.names.get(&id) {
            return Ok(name.clone());
        }

        let environment = self.client.environment(repository, &id).await?;
        self.lookups += 1;

        let name = environment.name.unwrap_or_default();
        debug!(environment = %id, name = %name, "resolved environment");
        self.names.insert(id, name.clone());
        Ok(name)
    }

    /// External lookups issued so far
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::MetricsError;
    use crate::fetch::testing::RouteFetcher;
    use std::sync::Arc;

    fn client(fetcher: Arc<RouteFetcher>) -> BitbucketClient {
        let mut config = Config::template().bitbucket;
        config.api_url = "https://bb.test/2.0".to_string();
        config.workspace = "acme".to_string();
        BitbucketClient::new(fetcher, config)
    }

    #[test]
    fn test_normalize_environment_id() {
        assert_eq!(normalize_environment_id("{abc-123}"), "abc-123");
        assert_eq!(normalize_environment_id("abc-123"), "abc-123");
        assert_eq!(normalize_environment_id(" {abc}\n"), "abc");
    }

    #[test]
    fn test_environment_matches_ignores_case() {
        assert!(environment_matches("PRODUCTION", "Production"));
        assert!(environment_matches("production", "Production"));
        assert!(!environment_matches("Staging", "Production"));
        assert!(!environment_matches("", "Production"));
    }

    #[tokio::test]
    async fn test_one_lookup_per_distinct_id() {
        let fetcher = Arc::new(
            RouteFetcher::new()
                .route("environments/%7Bprod%7D", 200, r#"{"name": "Production"}"#)
                .route("environments/%7Bstage%7D", 200, r#"{"name": "Staging"}"#),
        );
        let client = client(fetcher.clone());
        let mut resolver = EnvironmentResolver::new(&client);

        for _ in 0..5 {
            assert_eq!(resolver.resolve("api", "{prod}").await.unwrap(), "Production");
        }
        assert_eq!(resolver.resolve("api", "prod").await.unwrap(), "Production");
        assert_eq!(resolver.resolve("web", "{stage}").await.unwrap(), "Staging");

        assert_eq!(resolver.lookups(), 2);
        assert_eq!(fetcher.requests_matching("environments/%7Bprod%7D"), 1);
    }

    #[tokio::test]
    async fn test_unnamed_environment_resolves_empty() {
        let fetcher = Arc::new(RouteFetcher::new().route("environments/", 200, "{}"));
        let client = client(fetcher);
        let mut resolver = EnvironmentResolver::new(&client);

        assert_eq!(resolver.resolve("api", "{x}").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_failed_lookup_propagates() {
        let fetcher = Arc::new(RouteFetcher::new().route("environments/", 404, "missing"));
        let client = client(fetcher);
        let mut resolver = EnvironmentResolver::new(&client);

        let result = resolver.resolve("api", "{x}").await;
        assert!(matches!(result, Err(MetricsError::SourceUnavailable { .. })));
        assert_eq!(resolver.lookups(), 0);
    }
}
