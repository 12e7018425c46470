pub mod analytics_http;
pub mod memory_store;
pub mod readiness;
pub mod store;
pub mod ws_store;

pub use analytics_http::{AnalyticsSource, HttpAnalyticsClient};
#[cfg(test)]
pub use analytics_http::MockAnalyticsSource;
pub use memory_store::MemoryStore;
pub use readiness::{Readiness, RetryPolicy, StoreRuntime};
pub use store::{
    CallbackRegistration, DocumentStore, ListenerRegistration, SnapshotEvent, SnapshotSink,
};
pub use ws_store::WsDocumentStore;
