//! 工作排程元件
//!
//! 負責准入、重複請求合併、逾時與取消，並把工作交給 [`JobPipeline`] 執行。

mod job;
mod main;
mod pipeline;
mod registry;

pub use job::{Job, JobArtifacts, JobOutcome, JobStatus};
pub use main::Orchestrator;
pub use pipeline::{JobContext, JobPipeline};
pub use registry::{Admission, InFlight, JobRegistry, RunningJob};
