//! The full dashboard pipeline in one scope.
//!
//! ```text
//! memos ─────┬──────────────► stats ──────┐
//! profiles ──┼──┬───────────►             ├──► hybrid view
//! metrics ───┼──┼───────────►             │
//!            └──┴─► notifications ────────┤
//! activity ───────►                       │
//! analytics poller ───────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use super::collections;
use super::combine::Combiner;
use super::hybrid::{HybridMerger, HybridView};
use super::notifications::{NotificationFeed, NotificationMerger};
use super::poller::{AnalyticsPoller, PollState};
use super::stats::{StatsAggregator, StatsState};
use super::subscription::{LiveQuery, QueryState};
use crate::adapters::{AnalyticsSource, DocumentStore, StoreRuntime};
use crate::config::{AppConfig, DashboardConfig};
use crate::coordination::SyncScope;
use crate::domain::{ActivityEntry, InvestorProfile, Memo, PlatformMetric};
use crate::error::Result;

pub struct DashboardSync {
    memos: Arc<LiveQuery<Memo>>,
    pending_memos: Arc<LiveQuery<Memo>>,
    profiles: Arc<LiveQuery<InvestorProfile>>,
    activity: Arc<LiveQuery<ActivityEntry>>,
    metrics: Arc<LiveQuery<PlatformMetric>>,
    stats: Arc<Combiner<StatsState>>,
    feed: Arc<Combiner<NotificationFeed>>,
    poller: Arc<AnalyticsPoller>,
    view: Arc<Combiner<HybridView>>,
    scope: SyncScope,
}

impl DashboardSync {
    /// Wire every source into one scope. Must be called inside a Tokio runtime.
    pub fn start(
        store: Arc<dyn DocumentStore>,
        analytics: Arc<dyn AnalyticsSource>,
        config: &DashboardConfig,
        poll_interval: Duration,
    ) -> Self {
        let scope = SyncScope::new();

        let memos = Arc::new(collections::open_memos(Arc::clone(&store)));
        let pending_memos = Arc::new(collections::open_pending_memos(Arc::clone(&store)));
        let profiles = Arc::new(collections::open_profiles(Arc::clone(&store)));
        let activity = Arc::new(collections::open_activity(
            Arc::clone(&store),
            config.activity_limit,
        ));
        let metrics = Arc::new(collections::open_metrics(store, config.metrics_limit));
        scope.register(memos.clone());
        scope.register(pending_memos.clone());
        scope.register(profiles.clone());
        scope.register(activity.clone());
        scope.register(metrics.clone());

        let stats = Arc::new(StatsAggregator::spawn(
            memos.subscribe(),
            profiles.subscribe(),
            metrics.subscribe(),
        ));
        let feed = Arc::new(NotificationMerger::spawn(
            memos.subscribe(),
            profiles.subscribe(),
            activity.subscribe(),
            config.notification_cap,
        ));
        let poller = Arc::new(AnalyticsPoller::spawn(analytics, poll_interval));
        scope.register(stats.clone());
        scope.register(feed.clone());
        scope.register(poller.clone());

        let view = Arc::new(HybridMerger::spawn(
            stats.subscribe(),
            feed.subscribe(),
            poller.subscribe(),
        ));
        scope.register(view.clone());

        info!("Dashboard sync started ({} components)", scope.len());
        Self {
            memos,
            pending_memos,
            profiles,
            activity,
            metrics,
            stats,
            feed,
            poller,
            view,
            scope,
        }
    }

    /// Wait for the runtime's store with the configured bounded retries, then start.
    pub async fn connect(
        runtime: &StoreRuntime,
        analytics: Arc<dyn AnalyticsSource>,
        config: &AppConfig,
    ) -> Result<Self> {
        let store = runtime.wait_ready(config.store.readiness_policy()).await?;
        Ok(Self::start(
            store,
            analytics,
            &config.dashboard,
            config.analytics.poll_interval(),
        ))
    }

    pub fn view(&self) -> watch::Receiver<HybridView> {
        self.view.subscribe()
    }

    pub fn current(&self) -> HybridView {
        self.view.current()
    }

    pub fn stats(&self) -> watch::Receiver<StatsState> {
        self.stats.subscribe()
    }

    pub fn notifications(&self) -> watch::Receiver<NotificationFeed> {
        self.feed.subscribe()
    }

    pub fn analytics(&self) -> watch::Receiver<PollState> {
        self.poller.subscribe()
    }

    pub fn memos(&self) -> watch::Receiver<QueryState<Memo>> {
        self.memos.subscribe()
    }

    /// Review queue
    pub fn pending_memos(&self) -> watch::Receiver<QueryState<Memo>> {
        self.pending_memos.subscribe()
    }

    pub fn profiles(&self) -> watch::Receiver<QueryState<InvestorProfile>> {
        self.profiles.subscribe()
    }

    pub fn activity(&self) -> watch::Receiver<QueryState<ActivityEntry>> {
        self.activity.subscribe()
    }

    pub fn metrics(&self) -> watch::Receiver<QueryState<PlatformMetric>> {
        self.metrics.subscribe()
    }

    pub fn poller(&self) -> &AnalyticsPoller {
        &self.poller
    }

    /// Fetch analytics now.
    pub fn refresh(&self) -> bool {
        self.poller.refresh()
    }

    /// Release every subscription, ticker and task. Idempotent.
    pub fn shutdown(&self) -> usize {
        self.scope.teardown("dashboard shutdown")
    }

    pub fn is_shut_down(&self) -> bool {
        self.scope.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, MockAnalyticsSource};
    use crate::domain::{AggregateReport, LiveRecord};
    use crate::services::hybrid::Provenance;
    use serde_json::json;

    fn analytics() -> Arc<dyn AnalyticsSource> {
        let mut mock = MockAnalyticsSource::new();
        mock.expect_fetch_report().returning(|| {
            Ok(AggregateReport {
                total_deals: 9,
                ..Default::default()
            })
        });
        Arc::new(mock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_merges_push_and_poll() {
        let store = MemoryStore::new();
        let sync = DashboardSync::start(
            Arc::new(store.clone()),
            analytics(),
            &DashboardConfig::default(),
            Duration::from_secs(30),
        );
        assert_eq!(store.active_listeners(), 5);

        store.put(
            collections::MEMOS,
            LiveRecord::new(
                "m1",
                json!({"status": "pending_review", "updatedAt": "2024-05-01T00:00:00Z"}),
            ),
        );

        let mut view = sync.view();
        let merged = view
            .wait_for(|v| v.is_hybrid() && v.stats.pending_memos == 1)
            .await
            .unwrap()
            .clone();
        assert_eq!(merged.provenance, Provenance::Hybrid);
        assert_eq!(merged.total_deals, 9);
        assert_eq!(merged.notifications.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_everything_once() {
        let store = MemoryStore::new();
        let sync = DashboardSync::start(
            Arc::new(store.clone()),
            analytics(),
            &DashboardConfig::default(),
            Duration::from_secs(30),
        );

        assert_eq!(sync.shutdown(), 9);
        assert_eq!(sync.shutdown(), 0);
        assert!(sync.is_shut_down());
        assert_eq!(store.active_listeners(), 0);
        assert_eq!(store.remove_count(), 5);
        assert!(!sync.poller().is_running());
        assert!(!sync.refresh());
    }
}
