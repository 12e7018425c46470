//! Push plus poll: live stats and notifications merged with the latest
//! analytics report into one denormalized view.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use super::combine::Combiner;
use super::notifications::NotificationFeed;
use super::poller::PollState;
use super::stats::{DashboardStats, StatsState};
use crate::domain::{Notification, SeriesPoint};
use crate::error::SyncError;

/// Where the view's numbers come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Only live subscriptions have contributed so far
    #[default]
    Live,
    /// At least one analytics report has been merged in
    Hybrid,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Live => write!(f, "live"),
            Provenance::Hybrid => write!(f, "hybrid"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridView {
    pub stats: DashboardStats,
    pub notifications: Arc<Vec<Notification>>,

    pub total_startups: u64,
    pub total_deals: u64,
    pub closed_deals: u64,
    pub deal_volume: Decimal,
    pub conversion_rate: f64,
    pub avg_days_to_close: f64,
    pub deal_flow: Vec<SeriesPoint>,
    pub investor_engagement: Vec<SeriesPoint>,
    pub last_analytics_update: Option<DateTime<Utc>>,

    pub loading: bool,
    pub live_error: Option<SyncError>,
    pub analytics_error: Option<SyncError>,
    pub provenance: Provenance,
}

impl HybridView {
    pub fn is_hybrid(&self) -> bool {
        self.provenance == Provenance::Hybrid
    }
}

/// Build the view from the latest state of every source. Provenance never
/// drops back to `live` once `was_hybrid` is set.
pub fn merge_view(
    stats: &StatsState,
    feed: &NotificationFeed,
    poll: &PollState,
    was_hybrid: bool,
) -> HybridView {
    let mut view = HybridView {
        stats: stats.stats.clone(),
        notifications: Arc::clone(&feed.items),
        last_analytics_update: poll.last_fetched_at,
        loading: stats.loading || feed.loading || poll.loading,
        live_error: stats.error.clone().or_else(|| feed.error.clone()),
        analytics_error: poll.error.clone(),
        provenance: if was_hybrid || poll.report.is_some() {
            Provenance::Hybrid
        } else {
            Provenance::Live
        },
        ..Default::default()
    };

    if let Some(report) = &poll.report {
        view.total_startups = report.total_startups;
        view.total_deals = report.total_deals;
        view.closed_deals = report.closed_deals;
        view.deal_volume = report.deal_volume;
        view.conversion_rate = report.conversion_rate;
        view.avg_days_to_close = report.avg_days_to_close;
        view.deal_flow = report.deal_flow.clone();
        view.investor_engagement = report.investor_engagement.clone();
    }

    view
}

pub struct HybridMerger;

impl HybridMerger {
    pub fn spawn(
        stats: watch::Receiver<StatsState>,
        feed: watch::Receiver<NotificationFeed>,
        poll: watch::Receiver<PollState>,
    ) -> Combiner<HybridView> {
        let mut was_hybrid = false;
        Combiner::spawn("hybrid-merger", stats, feed, poll, move |s, f, p| {
            let view = merge_view(s, f, p, was_hybrid);
            was_hybrid = view.is_hybrid();
            view
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AggregateReport;
    use rust_decimal_macros::dec;

    fn polled(report: Option<AggregateReport>, error: Option<SyncError>) -> PollState {
        PollState {
            report: report.map(Arc::new),
            loading: false,
            error,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_without_any_data() {
        let view = merge_view(
            &StatsState::default(),
            &NotificationFeed::default(),
            &PollState::default(),
            false,
        );
        assert_eq!(view.provenance, Provenance::Live);
        assert_eq!(view.total_deals, 0);
        assert_eq!(view.deal_volume, Decimal::ZERO);
        assert!(view.deal_flow.is_empty());
        assert!(view.notifications.is_empty());
        assert!(view.loading);
    }

    #[test]
    fn test_report_fields_flow_through() {
        let report = AggregateReport {
            total_startups: 40,
            closed_deals: 3,
            deal_volume: dec!(2500000),
            ..Default::default()
        };
        let view = merge_view(
            &StatsState::default(),
            &NotificationFeed::default(),
            &polled(Some(report), None),
            false,
        );
        assert_eq!(view.provenance, Provenance::Hybrid);
        assert_eq!(view.total_startups, 40);
        assert_eq!(view.closed_deals, 3);
        assert_eq!(view.deal_volume, dec!(2500000));
        assert!(!view.loading);
    }

    #[test]
    fn test_provenance_is_sticky() {
        let view = merge_view(
            &StatsState::default(),
            &NotificationFeed::default(),
            &polled(None, Some(SyncError::Http("timeout".into()))),
            true,
        );
        assert_eq!(view.provenance, Provenance::Hybrid);
        assert!(view.analytics_error.is_some());
    }

    #[tokio::test]
    async fn test_merger_never_downgrades() {
        let (_stats_tx, stats_rx) = watch::channel(StatsState::default());
        let (_feed_tx, feed_rx) = watch::channel(NotificationFeed::default());
        let (poll_tx, poll_rx) = watch::channel(PollState::default());

        let merger = HybridMerger::spawn(stats_rx, feed_rx, poll_rx);
        let mut out = merger.subscribe();
        assert_eq!(out.borrow_and_update().provenance, Provenance::Live);

        poll_tx.send_replace(polled(Some(AggregateReport::default()), None));
        out.changed().await.unwrap();
        assert_eq!(out.borrow_and_update().provenance, Provenance::Hybrid);

        // A state without a report, as if the source were reset.
        poll_tx.send_replace(polled(None, Some(SyncError::Poll("down".into()))));
        out.changed().await.unwrap();
        let view = out.borrow_and_update().clone();
        assert_eq!(view.provenance, Provenance::Hybrid);
        assert!(view.analytics_error.is_some());
    }
}
