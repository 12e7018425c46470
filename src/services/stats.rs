//! Cross-cutting dashboard counters derived from live memo, profile and
//! metric queries.

use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::watch;

use super::combine::Combiner;
use super::subscription::QueryState;
use crate::domain::{InvestorProfile, Memo, MemoStatus, PlatformMetric, UserRole};
use crate::error::SyncError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub pending_memos: usize,
    pub approved_memos: usize,
    pub rejected_memos: usize,
    pub draft_memos: usize,
    pub total_memos: usize,
    pub total_investors: usize,
    pub total_founders: usize,
    pub total_admins: usize,
    /// Newest value per metric name
    pub latest_metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsState {
    pub stats: DashboardStats,
    pub loading: bool,
    pub error: Option<SyncError>,
}

pub fn compute_stats(
    memos: &[Memo],
    profiles: &[InvestorProfile],
    metrics: &[PlatformMetric],
) -> DashboardStats {
    let mut stats = DashboardStats {
        total_memos: memos.len(),
        ..Default::default()
    };

    for memo in memos {
        match memo.status {
            MemoStatus::PendingReview => stats.pending_memos += 1,
            MemoStatus::Approved => stats.approved_memos += 1,
            MemoStatus::Rejected => stats.rejected_memos += 1,
            MemoStatus::Draft => stats.draft_memos += 1,
            MemoStatus::Unknown => {}
        }
    }

    for profile in profiles {
        match profile.role {
            UserRole::Investor => stats.total_investors += 1,
            UserRole::Founder => stats.total_founders += 1,
            UserRole::Admin => stats.total_admins += 1,
            UserRole::Unknown => {}
        }
    }

    let mut newest: BTreeMap<&str, &PlatformMetric> = BTreeMap::new();
    for metric in metrics {
        match newest.get(metric.name.as_str()) {
            Some(seen) if seen.recorded_at >= metric.recorded_at => {}
            _ => {
                newest.insert(metric.name.as_str(), metric);
            }
        }
    }
    stats.latest_metrics = newest
        .into_iter()
        .map(|(name, metric)| (name.to_string(), metric.value))
        .collect();

    stats
}

/// Reduce three query states into one stats state.
pub fn combine_stats(
    memos: &QueryState<Memo>,
    profiles: &QueryState<InvestorProfile>,
    metrics: &QueryState<PlatformMetric>,
) -> StatsState {
    StatsState {
        stats: compute_stats(&memos.data, &profiles.data, &metrics.data),
        loading: memos.loading || profiles.loading || metrics.loading,
        error: memos
            .error
            .clone()
            .or_else(|| profiles.error.clone())
            .or_else(|| metrics.error.clone()),
    }
}

pub struct StatsAggregator;

impl StatsAggregator {
    pub fn spawn(
        memos: watch::Receiver<QueryState<Memo>>,
        profiles: watch::Receiver<QueryState<InvestorProfile>>,
        metrics: watch::Receiver<QueryState<PlatformMetric>>,
    ) -> Combiner<StatsState> {
        Combiner::spawn("stats-aggregator", memos, profiles, metrics, combine_stats)
    }
}
