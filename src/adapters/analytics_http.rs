//! Analytics warehouse client: one GET, one JSON aggregate report.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::domain::AggregateReport;
use crate::error::{Result, SyncError};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    async fn fetch_report(&self) -> Result<AggregateReport>;
}

#[derive(Clone)]
pub struct HttpAnalyticsClient {
    http: Client,
    endpoint: String,
}

impl HttpAnalyticsClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.trim().to_string();
        url::Url::parse(&endpoint)
            .map_err(|e| SyncError::Validation(format!("invalid analytics endpoint: {}", e)))?;

        let http = Client::builder()
            .user_agent("dealsync-analytics/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| {
                SyncError::Internal(format!("failed to build analytics HTTP client: {}", e))
            })?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnalyticsSource for HttpAnalyticsClient {
    async fn fetch_report(&self) -> Result<AggregateReport> {
        let resp = self
            .http
            .get(&self.endpoint)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(SyncError::Http(format!(
                "analytics GET {} failed: status={} body={}",
                self.endpoint,
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        debug!("analytics report received ({} bytes)", text.len());
        parse_report(&text)
    }
}

fn parse_report(text: &str) -> Result<AggregateReport> {
    if text.trim().is_empty() {
        return Err(SyncError::Poll("empty analytics response".to_string()));
    }
    serde_json::from_str(text)
        .map_err(|e| SyncError::Json(format!("invalid analytics report: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_endpoint() {
        let err = HttpAnalyticsClient::new("not a url", Duration::from_secs(1)).err();
        assert!(matches!(err, Some(SyncError::Validation(_))));
    }

    #[test]
    fn test_parse_report() {
        let report = parse_report(r#"{"totalStartups": 42, "closedDeals": 7}"#).unwrap();
        assert_eq!(report.total_startups, 42);
        assert_eq!(report.closed_deals, 7);
    }

    #[test]
    fn test_parse_report_errors() {
        assert!(matches!(parse_report("  "), Err(SyncError::Poll(_))));
        assert!(matches!(parse_report("{"), Err(SyncError::Json(_))));
    }
}
