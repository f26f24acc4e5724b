//! Ingestion engine: gap detection, backfill and live head tracking

mod block;
mod error;
mod finality;
mod gaps;
mod guard;
mod harvester;
mod progress;
mod subscriber;

pub use finality::reconcile_finality;
pub use gaps::{detect_gaps, missing_blocks};
pub use harvester::{BackfillHarvester, BackfillReport};
pub use progress::SessionCounters;
pub use subscriber::LiveHeadSubscriber;
