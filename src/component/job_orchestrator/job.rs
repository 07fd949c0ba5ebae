use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// 工作生命週期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Probing,
    Sampling,
    Compositing,
    Storing,
    Done,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// 工作完成後的兩個存取路徑
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobArtifacts {
    pub sprite_url: String,
    pub vtt_url: String,
}

/// 工作紀錄（由 registry 獨佔，外部只拿得到快照）
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub source_url: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub artifacts: Option<JobArtifacts>,
}

impl Job {
    #[must_use]
    pub fn new(source_url: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_url: source_url.to_string(),
            status: JobStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            artifacts: None,
        }
    }

    /// 推進到下一個非終止狀態；已結束的工作不再變動
    pub fn advance(&mut self, status: JobStatus) {
        if self.status.is_terminal() || status.is_terminal() {
            return;
        }
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, artifacts: JobArtifacts) {
        let now = Utc::now();
        self.status = JobStatus::Done;
        self.artifacts = Some(artifacts);
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    pub fn fail(&mut self, error: String) {
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.updated_at = now;
        self.completed_at = Some(now);
    }
}

/// 提交結果：同一次執行的所有請求拿到相同內容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub sprite_url: String,
    pub vtt_url: String,
}
