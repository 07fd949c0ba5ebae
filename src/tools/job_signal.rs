use crate::error::{PipelineError, PipelineResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 單一工作的取消旗標與截止時間
///
/// 取消是協作式的：各階段與擷取 worker 在邊界處呼叫 [`JobSignal::check`]，
/// 外部程序則由執行器輪詢 [`JobSignal::should_stop`] 後終止。
#[derive(Debug, Clone)]
pub struct JobSignal {
    cancelled: Arc<AtomicBool>,
    deadline: Instant,
}

impl JobSignal {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now() + timeout,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// 距離截止時間的剩餘時間
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// 取 `limit` 與剩餘時間的較小值，給外部程序當逾時上限
    #[must_use]
    pub fn bounded(&self, limit: Duration) -> Duration {
        limit.min(self.remaining())
    }

    pub fn check(&self, stage: &str) -> PipelineResult<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Timeout(format!("cancelled during {stage}")));
        }
        if self.is_expired() {
            return Err(PipelineError::Timeout(format!(
                "deadline exceeded during {stage}"
            )));
        }
        Ok(())
    }
}
