//! Coordination layer
//!
//! Scope ownership for live subscriptions, pollers and combiner tasks.

pub mod scope;

pub use scope::{SyncScope, Teardown};
