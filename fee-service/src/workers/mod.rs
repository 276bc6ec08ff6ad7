mod materializer;
mod sweeper;

pub use materializer::{
    requeue_unfinished, JobScope, MaterializationJob, MaterializationQueue, Materializer,
    WorkerOrchestrator,
};
pub use sweeper::{DueSweeper, SweepReport};
