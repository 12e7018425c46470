//! Fixed live queries the dashboard is built from.

use std::sync::Arc;

use super::subscription::LiveQuery;
use crate::adapters::DocumentStore;
use crate::domain::{
    ActivityEntry, CollectionQuery, InvestorProfile, Memo, MemoStatus, PlatformMetric,
    SortDirection,
};

pub const MEMOS: &str = "memos";
pub const PROFILES: &str = "profiles";
pub const ACTIVITY_LOG: &str = "activity_log";
pub const PLATFORM_METRICS: &str = "platform_metrics";

pub const DEFAULT_ACTIVITY_LIMIT: usize = 50;
pub const DEFAULT_METRICS_LIMIT: usize = 100;

/// All memos, most recently updated first
pub fn memos_query() -> CollectionQuery {
    CollectionQuery::new(MEMOS).order_by("updatedAt", SortDirection::Desc)
}

/// Memos awaiting review, most recently submitted first
pub fn pending_memos_query() -> CollectionQuery {
    CollectionQuery::new(MEMOS)
        .where_eq("status", MemoStatus::PendingReview.as_str())
        .order_by("submittedAt", SortDirection::Desc)
}

pub fn profiles_query() -> CollectionQuery {
    CollectionQuery::new(PROFILES).order_by("createdAt", SortDirection::Desc)
}

pub fn activity_query(limit: usize) -> CollectionQuery {
    CollectionQuery::new(ACTIVITY_LOG)
        .order_by("timestamp", SortDirection::Desc)
        .limit(limit)
}

pub fn metrics_query(limit: usize) -> CollectionQuery {
    CollectionQuery::new(PLATFORM_METRICS)
        .order_by("recordedAt", SortDirection::Desc)
        .limit(limit)
}

pub fn open_memos(store: Arc<dyn DocumentStore>) -> LiveQuery<Memo> {
    LiveQuery::with_store(store, memos_query(), true)
}

pub fn open_pending_memos(store: Arc<dyn DocumentStore>) -> LiveQuery<Memo> {
    LiveQuery::with_store(store, pending_memos_query(), true)
}

pub fn open_profiles(store: Arc<dyn DocumentStore>) -> LiveQuery<InvestorProfile> {
    LiveQuery::with_store(store, profiles_query(), true)
}

pub fn open_activity(store: Arc<dyn DocumentStore>, limit: usize) -> LiveQuery<ActivityEntry> {
    LiveQuery::with_store(store, activity_query(limit), true)
}

pub fn open_metrics(store: Arc<dyn DocumentStore>, limit: usize) -> LiveQuery<PlatformMetric> {
    LiveQuery::with_store(store, metrics_query(limit), true)
}
