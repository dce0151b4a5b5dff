pub mod batch;
pub mod ingest;
pub mod run_log;
pub mod stats;
pub mod traits;

pub use batch::ObservationBatch;
pub use ingest::Tracker;
pub use run_log::RunLog;
pub use stats::TrackerStats;
pub use traits::{ObservationSource, StaticSource};
