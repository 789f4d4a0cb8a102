//! Step execution for cadence: the cancellation controller and the
//! retry/escalation pipeline that runs a confirmed plan.

pub mod cancellation;
pub mod pipeline;

pub use cancellation::CancellationController;
pub use pipeline::{
    ExecutionPipeline, PipelineEvent, PipelineObserver, PipelineReport, PipelineStatus,
};
