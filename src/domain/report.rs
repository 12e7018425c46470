use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One point of a warehouse time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Read-only summary produced by the analytics warehouse.
///
/// Every field defaults so a partial report still decodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateReport {
    pub total_startups: u64,
    pub total_deals: u64,
    pub closed_deals: u64,
    pub deal_volume: Decimal,
    pub conversion_rate: f64,
    pub avg_days_to_close: f64,
    pub deal_flow: Vec<SeriesPoint>,
    pub investor_engagement: Vec<SeriesPoint>,
    pub generated_at: Option<DateTime<Utc>>,
}
