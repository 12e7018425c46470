pub mod adapters;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod services;

pub use adapters::{
    AnalyticsSource, DocumentStore, HttpAnalyticsClient, MemoryStore, Readiness, RetryPolicy,
    StoreRuntime, WsDocumentStore,
};
pub use config::AppConfig;
pub use coordination::{SyncScope, Teardown};
pub use domain::{AggregateReport, CollectionQuery, LiveRecord, Notification, QueryKey};
pub use error::{Result, SyncError};
pub use services::{
    AnalyticsPoller, DashboardStats, DashboardSync, HybridView, LiveQuery, PollState, Provenance,
    QueryState, SubscriptionHandle,
};
