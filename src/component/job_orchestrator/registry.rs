use super::job::{Job, JobArtifacts, JobOutcome, JobStatus};
use crate::config::{AdmissionPolicy, JobSettings};
use crate::error::{PipelineError, PipelineResult};
use crate::tools::JobSignal;
use chrono::Utc;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 排隊等待空位時的輪詢間隔
const QUEUE_POLL: Duration = Duration::from_millis(100);

struct JobEntry {
    job: Job,
    signal: JobSignal,
}

#[derive(Default)]
struct RegistryState {
    jobs: HashMap<Uuid, JobEntry>,
    /// 來源 URL -> 執行中的工作
    in_flight: HashMap<String, Arc<InFlight>>,
    running: usize,
    closed: bool,
}

/// 執行中工作的結果信箱，重複請求在這裡等待同一個結果
pub struct InFlight {
    job_id: Uuid,
    outcome: Mutex<Option<PipelineResult<JobOutcome>>>,
    ready: Condvar,
}

impl InFlight {
    fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    #[must_use]
    pub const fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// 阻塞直到結果發布
    pub fn wait(&self) -> PipelineResult<JobOutcome> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.ready.wait(&mut outcome);
        }
    }

    fn publish(&self, result: PipelineResult<JobOutcome>) {
        *self.outcome.lock() = Some(result);
        self.ready.notify_all();
    }
}

/// 准入結果
pub enum Admission<'a> {
    /// 相同來源已有工作在執行，等待它的結果
    Joined(Arc<InFlight>),
    /// 取得執行權
    Admitted(RunningJob<'a>),
}

/// 工作紀錄、重複請求對照表與執行中計數
///
/// 跨工作共用的可變狀態全部集中在這裡，由同一把鎖保護。
pub struct JobRegistry {
    state: Mutex<RegistryState>,
    slot_freed: Condvar,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            slot_freed: Condvar::new(),
        }
    }

    /// 建立工作並取得執行權，或加入相同來源的執行中工作
    ///
    /// 排隊等待的時間計入工作逾時；截止前仍無空位則回覆 `Busy`。
    pub fn admit(&self, key: &str, settings: &JobSettings) -> PipelineResult<Admission<'_>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PipelineError::Busy("server is shutting down".to_string()));
        }

        if settings.coalesce_duplicates
            && let Some(flight) = state.in_flight.get(key)
        {
            debug!("重複請求合併到工作 {}", flight.job_id);
            return Ok(Admission::Joined(Arc::clone(flight)));
        }

        let limit = settings.max_concurrent_jobs.max(1);
        if settings.admission == AdmissionPolicy::Reject && state.running >= limit {
            return Err(PipelineError::Busy(format!(
                "{} jobs already running",
                state.running
            )));
        }

        let job = Job::new(key);
        let job_id = job.id;
        let signal = JobSignal::new(Duration::from_secs(settings.job_timeout_secs));
        let flight = Arc::new(InFlight::new(job_id));
        state.jobs.insert(
            job_id,
            JobEntry {
                job,
                signal: signal.clone(),
            },
        );
        if settings.coalesce_duplicates {
            state.in_flight.insert(key.to_string(), Arc::clone(&flight));
        }

        let mut running = RunningJob {
            registry: self,
            key: key.to_string(),
            job_id,
            signal,
            flight,
            holds_slot: false,
            finished: false,
        };

        while state.running >= limit {
            let refusal = if state.closed {
                Some(PipelineError::Busy("server is shutting down".to_string()))
            } else if running.signal.is_cancelled() {
                Some(PipelineError::Timeout("cancelled while queued".to_string()))
            } else if running.signal.is_expired() {
                // 還沒開始執行就到期算是沒有空位，不是 Timeout
                Some(PipelineError::Busy(
                    "no job slot became free before the deadline".to_string(),
                ))
            } else {
                None
            };

            if let Some(error) = refusal {
                drop(state);
                warn!("工作 {job_id} 排隊失敗: {error}");
                let _ = running.finish(Err(error.clone()));
                return Err(error);
            }

            self.slot_freed.wait_for(&mut state, QUEUE_POLL);
        }

        state.running += 1;
        running.holds_slot = true;
        Ok(Admission::Admitted(running))
    }

    pub fn set_status(&self, job_id: Uuid, status: JobStatus) {
        if let Some(entry) = self.state.lock().jobs.get_mut(&job_id) {
            entry.job.advance(status);
        }
    }

    /// 取消尚未結束的工作；找不到或已結束時回傳 false
    pub fn cancel(&self, job_id: Uuid) -> bool {
        let state = self.state.lock();
        match state.jobs.get(&job_id) {
            Some(entry) if !entry.job.status.is_terminal() => {
                entry.signal.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let state = self.state.lock();
        let mut cancelled = 0;
        for entry in state.jobs.values() {
            if !entry.job.status.is_terminal() {
                entry.signal.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// 停止接受新工作並取消所有執行中的工作
    pub fn shutdown(&self) -> usize {
        self.state.lock().closed = true;
        let cancelled = self.cancel_all();
        self.slot_freed.notify_all();
        cancelled
    }

    #[must_use]
    pub fn job(&self, job_id: Uuid) -> Option<Job> {
        self.state.lock().jobs.get(&job_id).map(|entry| entry.job.clone())
    }

    /// 移除結束超過 `older_than` 的工作紀錄
    pub fn prune_finished(&self, older_than: chrono::Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut state = self.state.lock();
        let before = state.jobs.len();
        state
            .jobs
            .retain(|_, entry| entry.job.completed_at.is_none_or(|done| done > cutoff));
        before - state.jobs.len()
    }

    #[must_use]
    pub fn running_jobs(&self) -> usize {
        self.state.lock().running
    }
}

/// 執行權
///
/// 結束時更新工作紀錄、移除重複請求對照、釋放空位並發布結果給所有等待者。
/// 沒有呼叫 [`RunningJob::finish`] 就被 drop（例如 panic）時，自動發布
/// `InternalError`。
pub struct RunningJob<'a> {
    registry: &'a JobRegistry,
    key: String,
    job_id: Uuid,
    signal: JobSignal,
    flight: Arc<InFlight>,
    holds_slot: bool,
    finished: bool,
}

impl RunningJob<'_> {
    #[must_use]
    pub const fn job_id(&self) -> Uuid {
        self.job_id
    }

    #[must_use]
    pub const fn signal(&self) -> &JobSignal {
        &self.signal
    }

    pub fn finish(mut self, result: PipelineResult<JobArtifacts>) -> PipelineResult<JobOutcome> {
        self.settle(result)
    }

    fn settle(&mut self, result: PipelineResult<JobArtifacts>) -> PipelineResult<JobOutcome> {
        self.finished = true;
        let job_id = self.job_id;
        let outcome = result.map(|artifacts| JobOutcome {
            job_id,
            sprite_url: artifacts.sprite_url,
            vtt_url: artifacts.vtt_url,
        });

        {
            let mut state = self.registry.state.lock();
            if let Some(entry) = state.jobs.get_mut(&job_id) {
                match &outcome {
                    Ok(done) => entry.job.complete(JobArtifacts {
                        sprite_url: done.sprite_url.clone(),
                        vtt_url: done.vtt_url.clone(),
                    }),
                    Err(error) => entry.job.fail(error.to_string()),
                }
            }
            if state
                .in_flight
                .get(&self.key)
                .is_some_and(|flight| Arc::ptr_eq(flight, &self.flight))
            {
                state.in_flight.remove(&self.key);
            }
            if self.holds_slot {
                state.running -= 1;
                self.holds_slot = false;
            }
        }

        self.registry.slot_freed.notify_all();
        self.flight.publish(outcome.clone());
        outcome
    }
}

impl Drop for RunningJob<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("工作 {} 未回報結果即結束", self.job_id);
            let _ = self.settle(Err(PipelineError::InternalError(
                "job ended without a result".to_string(),
            )));
        }
    }
}
