use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use crate::timeline::StatusVocabulary;

const DEFAULT_BUG_FILTER: &str = "status not in (\"WON'T DO\") AND type = Bug AND (labels NOT IN (\"user-error\", \"pre-existing\") OR labels IS EMPTY)";

fn default_page_size() -> u64 {
    100
}

fn default_bug_filter() -> String {
    DEFAULT_BUG_FILTER.to_string()
}

fn default_bitbucket_api() -> String {
    "https://api.bitbucket.org/2.0".to_string()
}

fn default_environment() -> String {
    "Production".to_string()
}

fn default_deployment_sheet() -> String {
    "ENG: Deployment Stats".to_string()
}

fn default_pingdom_api() -> String {
    "https://api.pingdom.com/api/3.1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraConfig {
    pub base_url: String,
    pub project_key: String,
    pub email: String,
    pub api_token: String,
    /// Epic whose children count toward epic coverage
    pub epic_key: String,
    #[serde(default)]
    pub statuses: StatusVocabulary,
    /// JQL clause applied to bug counts, ANDed with project and date bounds
    #[serde(default = "default_bug_filter")]
    pub bug_filter: String,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitbucketConfig {
    #[serde(default = "default_bitbucket_api")]
    pub api_url: String,
    pub workspace: String,
    pub username: String,
    pub app_password: String,
    /// Environment name counted as a deployment (case-insensitive)
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Repository slugs whose deployments are counted
    #[serde(default)]
    pub allowed_repos: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_deployment_sheet")]
    pub sheet_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingdomConfig {
    #[serde(default = "default_pingdom_api")]
    pub api_url: String,
    pub api_token: String,
    #[serde(default)]
    pub check_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetabaseConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 1500,
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub jira: JiraConfig,
    pub bitbucket: BitbucketConfig,
    pub pingdom: PingdomConfig,
    pub metabase: MetabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    pub fn config_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("DORA_METRICS_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("~/.config"))
                .join("dora-metrics")
        }
    }

    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_file();
        let content = fs::read_to_string(&path).with_context(|| {
            format!(
                "Not initialized. Run: dora-metrics init\n  (expected config at {})",
                path.display()
            )
        })?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;
        // Restrict config dir permissions
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;

        let path = Self::config_file();
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, &content)?;
        // Config carries API tokens
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        Ok(())
    }

    /// Placeholder configuration written by `init`
    pub fn template() -> Self {
        Self {
            jira: JiraConfig {
                base_url: "https://your-instance.atlassian.net".to_string(),
                project_key: "ENG".to_string(),
                email: "you@example.com".to_string(),
                api_token: "your_jira_api_token".to_string(),
                epic_key: "ENG-40".to_string(),
                statuses: StatusVocabulary::default(),
                bug_filter: default_bug_filter(),
                page_size: default_page_size(),
            },
            bitbucket: BitbucketConfig {
                api_url: default_bitbucket_api(),
                workspace: "your-workspace".to_string(),
                username: "your-username".to_string(),
                app_password: "your_app_password".to_string(),
                environment: default_environment(),
                allowed_repos: vec!["repo-1".to_string(), "repo-2".to_string()],
                page_size: default_page_size(),
                sheet_name: default_deployment_sheet(),
            },
            pingdom: PingdomConfig {
                api_url: default_pingdom_api(),
                api_token: "your_pingdom_api_token".to_string(),
                check_ids: vec!["check_id_1".to_string(), "check_id_2".to_string()],
            },
            metabase: MetabaseConfig {
                url: "https://your-instance.metabaseapp.com".to_string(),
                api_key: "your_metabase_api_key".to_string(),
            },
            cache: CacheConfig::default(),
            http: HttpConfig::default(),
        }
    }
}
