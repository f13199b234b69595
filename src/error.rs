use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetricsError>;

/// External system a request was sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Jira,
    Bitbucket,
    Pingdom,
    Metabase,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Jira => write!(f, "jira"),
            Source::Bitbucket => write!(f, "bitbucket"),
            Source::Pingdom => write!(f, "pingdom"),
            Source::Metabase => write!(f, "metabase"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MetricsError {
    /// Transport failure, timeout or non-2xx status
    #[error("{service} unavailable: {message}")]
    SourceUnavailable { service: Source, message: String },

    /// Body could not be decoded into the expected shape
    #[error("malformed response from {service}: {message}")]
    MalformedResponse { service: Source, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl MetricsError {
    pub fn unavailable(service: Source, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            service,
            message: message.into(),
        }
    }

    pub fn malformed(service: Source, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            service,
            message: message.into(),
        }
    }
}
