//! Typed clients for each system of record

pub mod bitbucket;
pub mod jira;
pub mod metabase;
pub mod pingdom;

pub use bitbucket::BitbucketClient;
pub use jira::JiraClient;
pub use metabase::MetabaseClient;
pub use pingdom::PingdomClient;
