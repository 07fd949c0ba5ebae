use super::job::{JobArtifacts, JobStatus};
use crate::error::PipelineResult;
use crate::tools::JobSignal;
use url::Url;
use uuid::Uuid;

/// 單一工作執行時可見的環境
pub struct JobContext<'a> {
    pub job_id: Uuid,
    pub source_url: &'a Url,
    pub signal: &'a JobSignal,
    pub progress: &'a (dyn Fn(JobStatus) + Sync),
}

impl JobContext<'_> {
    /// 回報進入新階段
    pub fn advance(&self, status: JobStatus) {
        (self.progress)(status);
    }
}

/// 排程器與實際產生流程之間的接縫
pub trait JobPipeline: Send + Sync {
    fn run(&self, ctx: &JobContext<'_>) -> PipelineResult<JobArtifacts>;
}
