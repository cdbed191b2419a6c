pub mod dispatch;
pub mod runner;

pub use dispatch::{Dispatcher, JobStats, JobStatsSnapshot};
pub use runner::JobRunner;
