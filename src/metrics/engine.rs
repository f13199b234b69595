//! Metric functions composed from the sources, calculators and cache
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use chrono::{Datelike, NaiveDate};
use futures::future::try_join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{MetricCache, MetricKey};
use crate::calendar::{parse_month, DateWindow};
use crate::config::{CacheConfig, Config};
use crate::error::{MetricsError, Result};
use crate::fetch::Fetcher;
use crate::resolver::{environment_matches, EnvironmentResolver};
use crate::sources::{BitbucketClient, JiraClient, MetabaseClient, PingdomClient};
use crate::stats::median;
use crate::storage::RowStore;

use super::models::{DeploymentCount, Metric, OutageTotals};

pub const DEPLOYMENT_SHEET_HEADER: [&str; 3] = ["Year", "Month", "Deployment Count"];

pub struct MetricsEngine {
    cache_config: CacheConfig,
    jira: JiraClient,
    bitbucket: BitbucketClient,
    pingdom: PingdomClient,
    metabase: MetabaseClient,
    cache: Arc<dyn MetricCache>,
    rows: Arc<dyn RowStore>,
}

impl MetricsEngine {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<dyn MetricCache>,
        rows: Arc<dyn RowStore>,
    ) -> Self {
        Self {
            cache_config: config.cache,
            jira: JiraClient::new(fetcher.clone(), config.jira),
            bitbucket: BitbucketClient::new(fetcher.clone(), config.bitbucket),
            pingdom: PingdomClient::new(fetcher.clone(), config.pingdom),
            metabase: MetabaseClient::new(fetcher, config.metabase),
            cache,
            rows,
        }
    }

    /// Serve `key` from the cache or compute, round and store it.
    /// `None` from `compute` means no qualifying samples: 0 is returned and
    /// nothing is cached.
    async fn cached<F, Fut>(&self, metric: Metric, key: MetricKey, compute: F) -> Result<f64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<f64>>>,
    {
        let rounding = metric.rounding();

        if let Some(cached) = self.cache.get(&key) {
            info!(key = %key, value = cached, "cache hit");
            return Ok(rounding.apply(cached));
        }
        debug!(key = %key, "cache miss");

        let Some(raw) = compute().await? else {
            info!(metric = %metric, key = %key, "no qualifying samples");
            return Ok(0.0);
        };

        self.cache.put(&key, raw, self.cache_config.ttl());
        let value = rounding.apply(raw);
        info!(metric = %metric, key = %key, value, "computed");
        Ok(value)
    }

    /// Single value of a saved analytics question for `reference`
    pub async fn kpi(&self, question_id: &str, reference: NaiveDate) -> Result<f64> {
        let key = MetricKey::new(
            format!("{}-{question_id}", Metric::Kpi.cache_name()),
            reference,
        );
        self.cached(Metric::Kpi, key, move || async move {
            self.metabase
                .query_scalar(question_id, reference)
                .await
                .map(Some)
        })
        .await
    }

    /// Median business days from first "in progress" to final "done" over
    /// the trailing window
    pub async fn lead_time(&self, reference: NaiveDate) -> Result<f64> {
        let key = MetricKey::new(Metric::LeadTime.cache_name(), reference);
        self.cached(Metric::LeadTime, key, move || self.median_lead_time(reference))
            .await
    }

    async fn median_lead_time(&self, reference: NaiveDate) -> Result<Option<f64>> {
        let window = DateWindow::trailing(reference);
        let vocabulary = &self.jira.config().statuses;

        let mut samples = Vec::new();
        let mut pages = self.jira.done_issues_with_changelog(&window);
        while let Some(issues) = pages.next_page().await? {
            for issue in &issues {
                let record = issue.to_record(vocabulary);
                if let Some(days) = record.timeline(&window).lead_time_days() {
                    debug!(issue = %record.key, days, "lead time sample");
                    samples.push(f64::from(days));
                }
            }
        }

        if samples.is_empty() {
            return Ok(None);
        }
        Ok(Some(median(&samples)))
    }

    /// Percentage of done issues in the trailing window whose parent is the
    /// configured epic
    pub async fn epic_coverage(&self, reference: NaiveDate) -> Result<f64> {
        let key = MetricKey::new(Metric::EpicCoverage.cache_name(), reference);
        self.cached(Metric::EpicCoverage, key, move || async move {
            let window = DateWindow::trailing(reference);
            let epic = self.jira.config().epic_key.as_str();

            let (mut total, mut linked) = (0u64, 0u64);
            let mut pages = self.jira.done_issues_with_parent(&window);
            while let Some(issues) = pages.next_page().await? {
                total += issues.len() as u64;
                linked += issues
                    .iter()
                    .filter(|issue| issue.parent_key() == Some(epic))
                    .count() as u64;
            }

            if total == 0 {
                return Ok(None);
            }
            Ok(Some(linked as f64 / total as f64 * 100.0))
        })
        .await
    }

    /// Share of the trailing window all monitored checks were up
    pub async fn uptime(&self, reference: NaiveDate) -> Result<f64> {
        let key = MetricKey::new(Metric::Uptime.cache_name(), reference);
        self.cached(Metric::Uptime, key, move || async move {
            let window = DateWindow::trailing(reference);
            let totals = self.outage_totals(&window).await?;
            let checks = self.pingdom.check_ids().len() as i64;
            Ok(Some(totals.uptime_percentage(window.seconds() * checks)))
        })
        .await
    }

    /// Mean minutes per outage across all monitored checks
    pub async fn recovery_time(&self, reference: NaiveDate) -> Result<f64> {
        let key = MetricKey::new(Metric::RecoveryTime.cache_name(), reference);
        self.cached(Metric::RecoveryTime, key, move || async move {
            let window = DateWindow::trailing(reference);
            let totals = self.outage_totals(&window).await?;
            Ok(totals.mean_recovery_minutes())
        })
        .await
    }

    async fn outage_totals(&self, window: &DateWindow) -> Result<OutageTotals> {
        let checks = self.pingdom.check_ids();
        if checks.is_empty() {
            return Err(MetricsError::InvalidArgument(
                "no Pingdom checks configured".to_string(),
            ));
        }

        let summaries = try_join_all(checks.iter().map(|id| self.pingdom.outages(id, window))).await?;
        let totals = OutageTotals::from_intervals(summaries.iter().flatten());
        debug!(
            checks = checks.len(),
            downtime_seconds = totals.downtime_seconds,
            outages = totals.outages,
            "outage totals"
        );
        Ok(totals)
    }

    /// Deployments to the target environment in the month of `reference`.
    /// The count is also written to the deployment sheet.
    pub async fn deployments(&self, reference: NaiveDate) -> Result<DeploymentCount> {
        let window = DateWindow::month_of(reference);
        let count = self.count_deployments(&window).await?;
        let (year, month) = (window.start().year(), window.start().month());

        let sheet = &self.bitbucket.config().sheet_name;
        if let Err(e) = self
            .rows
            .upsert_monthly(sheet, &DEPLOYMENT_SHEET_HEADER, year, month, count as f64)
        {
            warn!(sheet = %sheet, error = %e, "failed to record deployment count");
        }

        info!(year, month, count, "deployments this month");
        Ok(DeploymentCount { year, month, count })
    }

    async fn count_deployments(&self, window: &DateWindow) -> Result<u64> {
        let target = self.bitbucket.config().environment.as_str();
        let mut resolver = EnvironmentResolver::new(&self.bitbucket);
        let mut count = 0u64;

        let mut repositories = self.bitbucket.repositories();
        while let Some(repos) = repositories.next_page().await? {
            for repo in repos.iter().filter(|r| self.bitbucket.is_allowed(&r.slug)) {
                let mut deployments = self.bitbucket.deployments(&repo.slug);
                while let Some(page) = deployments.next_page().await? {
                    for record in page.iter().filter_map(|d| d.to_record(&repo.slug)) {
                        if !window.contains(record.created_at) {
                            continue;
                        }
                        let name = resolver
                            .resolve(&record.repository, &record.environment_id)
                            .await?;
                        if environment_matches(&name, target) {
                            count += 1;
                        }
                    }
                }
            }
        }

        debug!(lookups = resolver.lookups(), count, "counted deployments");
        Ok(count)
    }

    /// Bugs created in the given month of the reference year; `None` means
    /// the reference month
    pub async fn bug_count(&self, month: Option<&str>, reference: NaiveDate) -> Result<u64> {
        let window = month_window(month, reference)?;
        let key = MetricKey::new(Metric::BugCount.cache_name(), window.start());
        let value = self
            .cached(Metric::BugCount, key, move || async move {
                let total = self.jira.count_bugs(&window).await?;
                Ok(Some(total as f64))
            })
            .await?;
        Ok(value as u64)
    }

    /// Bugs created per production deployment in a month, as a percentage
    pub async fn change_failure_rate(&self, month: Option<&str>, reference: NaiveDate) -> Result<f64> {
        let window = month_window(month, reference)?;
        let key = MetricKey::new(Metric::ChangeFailureRate.cache_name(), window.start());
        self.cached(Metric::ChangeFailureRate, key, move || async move {
            let deployments = self.count_deployments(&window).await?;
            if deployments == 0 {
                return Ok(None);
            }
            let bugs = self.jira.count_bugs(&window).await?;
            Ok(Some(bugs as f64 / deployments as f64 * 100.0))
        })
        .await
    }
}

/// Month named by a three-letter abbreviation in the reference year
pub fn month_window(month: Option<&str>, reference: NaiveDate) -> Result<DateWindow> {
    let number = match month {
        Some(abbrev) => parse_month(abbrev).ok_or_else(|| {
            MetricsError::InvalidArgument(format!("invalid month abbreviation '{abbrev}'"))
        })?,
        None => reference.month(),
    };

    DateWindow::month(reference.year(), number).ok_or_else(|| {
        MetricsError::InvalidArgument(format!("no month {number} in {}", reference.year()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_window_from_abbreviation() {
        let window = month_window(Some("APR"), date(2024, 9, 10)).unwrap();
        assert_eq!(window.start(), date(2024, 4, 1));
        assert_eq!(window.end(), date(2024, 4, 30));
    }

    #[test]
    fn test_month_window_defaults_to_reference_month() {
        let window = month_window(None, date(2024, 2, 10)).unwrap();
        assert_eq!(window.start(), date(2024, 2, 1));
        assert_eq!(window.end(), date(2024, 2, 29));
    }

    #[test]
    fn test_month_window_rejects_unknown_abbreviation() {
        let err = month_window(Some("sept"), date(2024, 2, 10)).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidArgument(_)));
        assert!(err.to_string().contains("sept"));
    }
}
