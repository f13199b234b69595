use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::config::MetabaseConfig;
use crate::error::{MetricsError, Result, Source};
use crate::fetch::{fetch_json, FetchRequest, Fetcher};

#[derive(Clone)]
pub struct MetabaseClient {
    fetcher: Arc<dyn Fetcher>,
    config: MetabaseConfig,
}

impl MetabaseClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: MetabaseConfig) -> Self {
        Self { fetcher, config }
    }

    /// Run a saved question with its `reference_date` parameter bound and
    /// read the first column of the first row.
    pub async fn query_scalar(&self, question_id: &str, reference: NaiveDate) -> Result<f64> {
        let body = json!({
            "parameters": [{
                "type": "date/single",
                "target": ["variable", ["template-tag", "reference_date"]],
                "value": reference.format("%Y-%m-%d").to_string(),
            }]
        });
        let request = FetchRequest::post(
            Source::Metabase,
            format!(
                "{}/api/card/{question_id}/query/json",
                self.config.url.trim_end_matches('/')
            ),
            body,
        )
        .header("x-api-key", self.config.api_key.clone());

        let rows: Vec<Map<String, Value>> = fetch_json(self.fetcher.as_ref(), &request).await?;
        first_scalar(&rows)
    }
}

fn first_scalar(rows: &[Map<String, Value>]) -> Result<f64> {
    let value = rows
        .first()
        .and_then(|row| row.values().next())
        .ok_or_else(|| MetricsError::malformed(Source::Metabase, "query returned no rows"))?;

    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| MetricsError::malformed(Source::Metabase, format!("non-numeric value {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(value: Value) -> Vec<Map<String, Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_first_scalar_reads_first_column() {
        let data = rows(json!([{"count": 42.5, "other": 1}, {"count": 3}]));
        assert!((first_scalar(&data).unwrap() - 42.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_first_scalar_accepts_numeric_strings() {
        let data = rows(json!([{"ratio": "0.75"}]));
        assert!((first_scalar(&data).unwrap() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_first_scalar_rejects_empty_result() {
        let err = first_scalar(&[]).unwrap_err();
        assert!(matches!(
            err,
            MetricsError::MalformedResponse {
                service: Source::Metabase,
                ..
            }
        ));
    }

    #[test]
    fn test_first_scalar_rejects_non_numeric() {
        let data = rows(json!([{"name": "n/a"}]));
        assert!(first_scalar(&data).is_err());
    }
}
