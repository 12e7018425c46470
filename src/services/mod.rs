pub mod collections;
pub mod combine;
pub mod dashboard;
pub mod hybrid;
pub mod notifications;
pub mod poller;
pub mod stats;
pub mod subscription;

pub use combine::Combiner;
pub use dashboard::DashboardSync;
pub use hybrid::{merge_view, HybridMerger, HybridView, Provenance};
pub use notifications::{merge_notifications, NotificationFeed, NotificationMerger};
pub use poller::{AnalyticsPoller, PollState};
pub use stats::{compute_stats, DashboardStats, StatsAggregator, StatsState};
pub use subscription::{LiveQuery, QueryState, SubscriptionHandle};
