//! pledger commands

pub mod backfill;
pub mod config;
pub mod query;
pub mod sync;

pub use backfill::BackfillArgs;
pub use config::ConfigArgs;
pub use query::QueryArgs;
pub use sync::SyncArgs;
