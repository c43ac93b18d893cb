//! Queue adapters.

mod in_process;

pub use in_process::{CompletedJob, FailedJob, InProcessJobQueue, QueueConfig, QueueStats};
