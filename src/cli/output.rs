//! Output formatting for `dealsync` commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::config::AppConfig;
use crate::domain::{AggregateReport, Notification};
use crate::services::HybridView;

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct SummaryRow {
    pub field: String,
    pub value: String,
}

impl SummaryRow {
    fn new(field: &str, value: impl ToString) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct NotificationRow {
    pub time: String,
    #[tabled(rename = "type")]
    pub kind: String,
    pub severity: String,
    pub title: String,
    pub message: String,
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        Self {
            time: n.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            kind: n.kind.as_str().to_string(),
            severity: format!("{:?}", n.severity).to_lowercase(),
            title: n.title.clone(),
            message: n.message.clone(),
        }
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn view_rows(view: &HybridView) -> Vec<SummaryRow> {
    let stats = &view.stats;
    let mut rows = vec![
        SummaryRow::new("provenance", view.provenance),
        SummaryRow::new("loading", view.loading),
        SummaryRow::new("pending memos", stats.pending_memos),
        SummaryRow::new("approved memos", stats.approved_memos),
        SummaryRow::new("rejected memos", stats.rejected_memos),
        SummaryRow::new("draft memos", stats.draft_memos),
        SummaryRow::new("investors", stats.total_investors),
        SummaryRow::new("founders", stats.total_founders),
        SummaryRow::new("startups", view.total_startups),
        SummaryRow::new("deals", format!("{} ({} closed)", view.total_deals, view.closed_deals)),
        SummaryRow::new("deal volume", view.deal_volume.round_dp(2)),
        SummaryRow::new("conversion", format!("{:.1}%", view.conversion_rate * 100.0)),
        SummaryRow::new(
            "analytics updated",
            or_dash(view.last_analytics_update.map(|t| t.format("%H:%M:%S"))),
        ),
    ];
    for (name, value) in &stats.latest_metrics {
        rows.push(SummaryRow::new(&format!("metric {name}"), value));
    }
    if let Some(e) = &view.live_error {
        rows.push(SummaryRow::new("live error", e));
    }
    if let Some(e) = &view.analytics_error {
        rows.push(SummaryRow::new("analytics error", e));
    }
    rows
}

pub fn report_rows(report: &AggregateReport) -> Vec<SummaryRow> {
    vec![
        SummaryRow::new("startups", report.total_startups),
        SummaryRow::new("deals", report.total_deals),
        SummaryRow::new("closed deals", report.closed_deals),
        SummaryRow::new("deal volume", report.deal_volume.round_dp(2)),
        SummaryRow::new("conversion", format!("{:.1}%", report.conversion_rate * 100.0)),
        SummaryRow::new("avg days to close", format!("{:.1}", report.avg_days_to_close)),
        SummaryRow::new("deal flow points", report.deal_flow.len()),
        SummaryRow::new("engagement points", report.investor_engagement.len()),
        SummaryRow::new("generated", or_dash(report.generated_at)),
    ]
}

pub fn config_rows(config: &AppConfig) -> Vec<SummaryRow> {
    vec![
        SummaryRow::new("store.ws_url", &config.store.ws_url),
        SummaryRow::new("store.readiness_attempts", config.store.readiness_attempts),
        SummaryRow::new("store.readiness_delay_ms", config.store.readiness_delay_ms),
        SummaryRow::new("store.reconnect_delay_ms", config.store.reconnect_delay_ms),
        SummaryRow::new("store.max_reconnect_delay_ms", config.store.max_reconnect_delay_ms),
        SummaryRow::new("analytics.endpoint", &config.analytics.endpoint),
        SummaryRow::new("analytics.poll_interval_secs", config.analytics.poll_interval_secs),
        SummaryRow::new("analytics.request_timeout_secs", config.analytics.request_timeout_secs),
        SummaryRow::new("dashboard.notification_cap", config.dashboard.notification_cap),
        SummaryRow::new("dashboard.activity_limit", config.dashboard.activity_limit),
        SummaryRow::new("dashboard.metrics_limit", config.dashboard.metrics_limit),
        SummaryRow::new("logging.level", &config.logging.level),
        SummaryRow::new("logging.json", config.logging.json),
    ]
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
    }
    Ok(())
}

pub fn print_view(view: &HybridView, mode: OutputMode) -> anyhow::Result<()> {
    print_items(&view_rows(view), mode)?;
    let notifications: Vec<NotificationRow> =
        view.notifications.iter().map(NotificationRow::from).collect();
    print_items(&notifications, mode)
}

pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m{msg}\x1b[0m");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Provenance;

    #[test]
    fn test_view_rows_show_errors_and_metrics() {
        let mut view = HybridView {
            provenance: Provenance::Hybrid,
            analytics_error: Some(crate::error::SyncError::Http("503".into())),
            ..Default::default()
        };
        view.stats.latest_metrics.insert("active_users".into(), 12.0);

        let rows = view_rows(&view);
        assert_eq!(rows[0].value, "hybrid");
        assert!(rows.iter().any(|r| r.field == "metric active_users" && r.value == "12"));
        assert!(rows.iter().any(|r| r.field == "analytics error"));
        assert!(!rows.iter().any(|r| r.field == "live error"));
    }

    #[test]
    fn test_report_rows_default_report() {
        let rows = report_rows(&AggregateReport::default());
        assert_eq!(rows[0].value, "0");
        assert_eq!(rows.last().unwrap().value, "-");
    }
}
