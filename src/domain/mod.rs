pub mod models;
pub mod notification;
pub mod query;
pub mod record;
pub mod report;

pub use models::*;
pub use notification::*;
pub use query::*;
pub use record::*;
pub use report::*;
