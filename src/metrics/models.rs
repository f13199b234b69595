use std::fmt;

use crate::sources::pingdom::OutageInterval;
use crate::stats;

/// Reporting precision applied to a metric value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Up(i32),
    Down(i32),
    Nearest(i32),
    Exact,
}

impl Rounding {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Up(decimals) => stats::round_up(value, decimals),
            Self::Down(decimals) => stats::round_down(value, decimals),
            Self::Nearest(decimals) => stats::round_to(value, decimals),
            Self::Exact => value,
        }
    }
}

/// Metrics served through the value cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Kpi,
    LeadTime,
    EpicCoverage,
    Uptime,
    RecoveryTime,
    BugCount,
    ChangeFailureRate,
}

impl Metric {
    /// Prefix of the cache key
    pub fn cache_name(self) -> &'static str {
        match self {
            Self::Kpi => "metabase",
            Self::LeadTime => "jira-leadtime",
            Self::EpicCoverage => "jira-epic-coverage",
            Self::Uptime => "pingdom-uptime",
            Self::RecoveryTime => "pingdom-recovery",
            Self::BugCount => "jira-bugs",
            Self::ChangeFailureRate => "change-failure-rate",
        }
    }

    pub fn rounding(self) -> Rounding {
        match self {
            Self::Kpi | Self::LeadTime => Rounding::Up(1),
            Self::Uptime | Self::RecoveryTime => Rounding::Down(2),
            Self::EpicCoverage | Self::ChangeFailureRate => Rounding::Nearest(1),
            Self::BugCount => Rounding::Exact,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Kpi | Self::BugCount => "",
            Self::LeadTime => "business days",
            Self::EpicCoverage | Self::Uptime | Self::ChangeFailureRate => "%",
            Self::RecoveryTime => "minutes",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Kpi => "KPI",
            Self::LeadTime => "Lead time",
            Self::EpicCoverage => "Epic coverage",
            Self::Uptime => "Uptime",
            Self::RecoveryTime => "Average recovery time",
            Self::BugCount => "Bugs created",
            Self::ChangeFailureRate => "Change failure rate",
        };
        write!(f, "{label}")
    }
}

/// Deployment count for one calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentCount {
    pub year: i32,
    pub month: u32,
    pub count: u64,
}

/// Downtime across every check of a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutageTotals {
    pub downtime_seconds: i64,
    pub outages: u64,
}

impl OutageTotals {
    /// Sum down intervals. Only intervals with positive duration count as
    /// an outage.
    pub fn from_intervals<'a>(intervals: impl IntoIterator<Item = &'a OutageInterval>) -> Self {
        intervals
            .into_iter()
            .filter(|i| i.is_down())
            .fold(Self::default(), |mut totals, interval| {
                let seconds = interval.downtime_seconds();
                totals.downtime_seconds += seconds;
                if seconds > 0 {
                    totals.outages += 1;
                }
                totals
            })
    }

    /// Share of `possible_seconds` not spent down, as a percentage
    #[allow(clippy::cast_precision_loss)]
    pub fn uptime_percentage(&self, possible_seconds: i64) -> f64 {
        if possible_seconds <= 0 {
            return 100.0;
        }
        let possible = possible_seconds as f64;
        (possible - self.downtime_seconds as f64) / possible * 100.0
    }

    /// Mean outage length in minutes, `None` without outages
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_recovery_minutes(&self) -> Option<f64> {
        (self.outages > 0)
            .then(|| self.downtime_seconds as f64 / self.outages as f64 / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down(from: i64, to: i64) -> OutageInterval {
        OutageInterval {
            status: "down".to_string(),
            timefrom: from,
            timeto: to,
        }
    }

    #[test]
    fn test_rounding_policies() {
        assert!((Metric::LeadTime.rounding().apply(2.01) - 2.1).abs() < 1e-12);
        assert!((Metric::Uptime.rounding().apply(99.999) - 99.99).abs() < 1e-12);
        assert!((Metric::EpicCoverage.rounding().apply(33.333) - 33.3).abs() < 1e-12);
        assert!((Metric::BugCount.rounding().apply(7.0) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_outage_totals() {
        let up = OutageInterval {
            status: "up".to_string(),
            timefrom: 0,
            timeto: 10_000,
        };
        let intervals = vec![down(0, 600), up, down(1000, 2800), down(5000, 5000)];
        let totals = OutageTotals::from_intervals(&intervals);

        assert_eq!(totals.downtime_seconds, 2400);
        assert_eq!(totals.outages, 2);
        assert_eq!(totals.mean_recovery_minutes(), Some(20.0));
    }

    #[test]
    fn test_no_outages() {
        let intervals: Vec<OutageInterval> = Vec::new();
        let totals = OutageTotals::from_intervals(&intervals);
        assert_eq!(totals.mean_recovery_minutes(), None);
        assert!((totals.uptime_percentage(86_400) - 100.0).abs() < f64::EPSILON);
    }
}
