//! Rebuild work-start / work-finish instants from issue status history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{business_days, DateWindow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueStatus {
    InProgress,
    Done,
    Other(String),
}

/// Raw status names from the issue tracker that map onto [`IssueStatus`].
/// Matching is exact, since tracker workflows often carry near-duplicate names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusVocabulary {
    #[serde(default = "default_in_progress")]
    pub in_progress: Vec<String>,
    #[serde(default = "default_done")]
    pub done: Vec<String>,
}

fn default_in_progress() -> Vec<String> {
    vec!["In Progress".to_string()]
}

fn default_done() -> Vec<String> {
    vec!["Done".to_string()]
}

impl Default for StatusVocabulary {
    fn default() -> Self {
        Self {
            in_progress: default_in_progress(),
            done: default_done(),
        }
    }
}

impl StatusVocabulary {
    pub fn classify(&self, raw: &str) -> IssueStatus {
        if self.in_progress.iter().any(|s| s == raw) {
            IssueStatus::InProgress
        } else if self.done.iter().any(|s| s == raw) {
            IssueStatus::Done
        } else {
            IssueStatus::Other(raw.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub at: DateTime<Utc>,
    pub from: Option<IssueStatus>,
    pub to: IssueStatus,
}

#[derive(Debug, Clone)]
pub struct IssueRecord {
    pub key: String,
    pub transitions: Vec<StatusTransition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueTimeline {
    pub first_in_progress: Option<DateTime<Utc>>,
    pub last_done: Option<DateTime<Utc>>,
}

impl IssueTimeline {
    /// Scan transitions in chronological order. The first move into
    /// "in progress" wins even if the issue is later reopened; the last move
    /// into "done" that falls inside `window` wins.
    pub fn reconstruct(transitions: &[StatusTransition], window: &DateWindow) -> Self {
        let mut ordered: Vec<&StatusTransition> = transitions.iter().collect();
        ordered.sort_by_key(|t| t.at);

        let mut timeline = Self::default();
        for transition in ordered {
            match transition.to {
                IssueStatus::InProgress if timeline.first_in_progress.is_none() => {
                    timeline.first_in_progress = Some(transition.at);
                }
                IssueStatus::Done if window.contains(transition.at) => {
                    timeline.last_done = Some(transition.at);
                }
                _ => {}
            }
        }
        timeline
    }

    /// Business days from first start to final completion. `None` unless both
    /// ends exist and completion comes strictly after the start.
    pub fn lead_time_days(&self) -> Option<u32> {
        match (self.first_in_progress, self.last_done) {
            (Some(started), Some(done)) if done > started => Some(business_days(started, done)),
            _ => None,
        }
    }
}

impl IssueRecord {
    pub fn timeline(&self, window: &DateWindow) -> IssueTimeline {
        IssueTimeline::reconstruct(&self.transitions, window)
    }
}
