use super::job::{Job, JobOutcome, JobStatus};
use super::pipeline::{JobContext, JobPipeline};
use super::registry::{Admission, JobRegistry, RunningJob};
use crate::component::artifact_store::ArtifactStore;
use crate::component::sprite_generator::{SpriteGenerator, parse_source_url};
use crate::config::{Config, JobSettings};
use crate::error::{PipelineError, PipelineResult};
use log::{error, info};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// 工作排程器
///
/// `submit` 是同步阻塞呼叫：驗證來源、合併重複請求、排隊取得空位、
/// 執行管線，最後回傳完整的產物路徑或單一錯誤。
pub struct Orchestrator {
    registry: JobRegistry,
    pipeline: Arc<dyn JobPipeline>,
    settings: JobSettings,
    allow_file_urls: bool,
}

impl Orchestrator {
    pub fn new(pipeline: Arc<dyn JobPipeline>, settings: JobSettings, allow_file_urls: bool) -> Self {
        Self {
            registry: JobRegistry::new(),
            pipeline,
            settings,
            allow_file_urls,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn ArtifactStore>) -> Self {
        let pipeline = Arc::new(SpriteGenerator::new(config.clone(), store));
        Self::new(
            pipeline,
            config.jobs.clone(),
            config.source.allow_file_urls,
        )
    }

    pub fn submit(&self, raw_url: &str) -> PipelineResult<JobOutcome> {
        let url = parse_source_url(raw_url, self.allow_file_urls)?;

        match self.registry.admit(url.as_str(), &self.settings)? {
            Admission::Joined(flight) => {
                info!("等待相同來源的工作 {}: {url}", flight.job_id());
                flight.wait()
            }
            Admission::Admitted(running) => self.execute(running, &url),
        }
    }

    fn execute(&self, running: RunningJob<'_>, url: &Url) -> PipelineResult<JobOutcome> {
        let job_id = running.job_id();
        let signal = running.signal().clone();
        info!("工作 {job_id} 開始: {url}");

        let progress = |status: JobStatus| self.registry.set_status(job_id, status);
        let ctx = JobContext {
            job_id,
            source_url: url,
            signal: &signal,
            progress: &progress,
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.pipeline.run(&ctx)))
            .unwrap_or_else(|payload| {
                Err(PipelineError::InternalError(format!(
                    "pipeline panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        match &result {
            Ok(artifacts) => info!("工作 {job_id} 完成: {}", artifacts.sprite_url),
            Err(e) => error!("工作 {job_id} 失敗 [{}]: {e}", e.kind()),
        }

        running.finish(result)
    }

    pub fn cancel(&self, job_id: Uuid) -> bool {
        let cancelled = self.registry.cancel(job_id);
        if cancelled {
            info!("已要求取消工作 {job_id}");
        }
        cancelled
    }

    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    /// 停止接受新工作並取消所有進行中的工作
    pub fn shutdown(&self) {
        let cancelled = self.registry.shutdown();
        if cancelled > 0 {
            info!("已取消 {cancelled} 個進行中的工作");
        }
    }

    #[must_use]
    pub fn job(&self, job_id: Uuid) -> Option<Job> {
        self.registry.job(job_id)
    }

    pub fn prune_finished(&self, older_than: chrono::Duration) -> usize {
        self.registry.prune_finished(older_than)
    }

    #[must_use]
    pub fn running_jobs(&self) -> usize {
        self.registry.running_jobs()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::job_orchestrator::JobArtifacts;
    use crate::config::AdmissionPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// 可控制的替身管線
    #[derive(Default)]
    struct FakePipeline {
        runs: AtomicUsize,
        delay: Duration,
        fail_with: Option<PipelineError>,
        panic: bool,
    }

    impl JobPipeline for FakePipeline {
        fn run(&self, ctx: &JobContext<'_>) -> PipelineResult<JobArtifacts> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            ctx.advance(JobStatus::Probing);

            let started = std::time::Instant::now();
            while started.elapsed() < self.delay {
                ctx.signal.check("sampling")?;
                thread::sleep(Duration::from_millis(10));
            }

            if self.panic {
                panic!("frame decoder exploded");
            }
            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }

            ctx.advance(JobStatus::Storing);
            Ok(JobArtifacts {
                sprite_url: format!("/thumbnails/{}/sprite.jpg", ctx.job_id),
                vtt_url: format!("/thumbnails/{}/sprite.vtt", ctx.job_id),
            })
        }
    }

    fn settings() -> JobSettings {
        JobSettings {
            max_concurrent_jobs: 2,
            admission: AdmissionPolicy::Queue,
            job_timeout_secs: 10,
            coalesce_duplicates: true,
        }
    }

    fn orchestrator(pipeline: Arc<FakePipeline>, settings: JobSettings) -> Orchestrator {
        Orchestrator::new(pipeline, settings, false)
    }

    #[test]
    fn test_submit_success_records_done_job() {
        let pipeline = Arc::new(FakePipeline::default());
        let orchestrator = orchestrator(Arc::clone(&pipeline), settings());

        let outcome = orchestrator.submit("https://example.com/a.mp4").unwrap();
        assert_eq!(
            outcome.sprite_url,
            format!("/thumbnails/{}/sprite.jpg", outcome.job_id)
        );

        let job = orchestrator.job(outcome.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.source_url, "https://example.com/a.mp4");
        assert!(job.completed_at.is_some());
        assert_eq!(orchestrator.running_jobs(), 0);
    }

    #[test]
    fn test_invalid_url_never_reaches_pipeline() {
        let pipeline = Arc::new(FakePipeline::default());
        let orchestrator = orchestrator(Arc::clone(&pipeline), settings());

        let err = orchestrator.submit("not a url").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSource(_)));
        assert_eq!(pipeline.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_requests_share_one_execution() {
        let pipeline = Arc::new(FakePipeline {
            delay: Duration::from_millis(300),
            ..FakePipeline::default()
        });
        let orchestrator = orchestrator(Arc::clone(&pipeline), settings());

        let outcomes: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| orchestrator.submit("https://example.com/same.mp4")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(pipeline.runs.load(Ordering::SeqCst), 1);
        let first = outcomes[0].as_ref().unwrap();
        for outcome in &outcomes {
            assert_eq!(outcome.as_ref().unwrap(), first);
        }
    }

    #[test]
    fn test_failure_is_shared_and_recorded() {
        let pipeline = Arc::new(FakePipeline {
            fail_with: Some(PipelineError::ProbeFailed("no video stream".to_string())),
            ..FakePipeline::default()
        });
        let orchestrator = orchestrator(Arc::clone(&pipeline), settings());

        let err = orchestrator.submit("https://example.com/bad.mp4").unwrap_err();
        assert!(matches!(err, PipelineError::ProbeFailed(_)));
    }

    #[test]
    fn test_reject_policy_when_full() {
        let pipeline = Arc::new(FakePipeline {
            delay: Duration::from_millis(400),
            ..FakePipeline::default()
        });
        let orchestrator = orchestrator(
            Arc::clone(&pipeline),
            JobSettings {
                max_concurrent_jobs: 1,
                admission: AdmissionPolicy::Reject,
                ..settings()
            },
        );

        thread::scope(|scope| {
            let first = scope.spawn(|| orchestrator.submit("https://example.com/1.mp4"));
            thread::sleep(Duration::from_millis(100));
            let err = orchestrator
                .submit("https://example.com/2.mp4")
                .unwrap_err();
            assert!(matches!(err, PipelineError::Busy(_)));
            assert!(first.join().unwrap().is_ok());
        });
    }

    #[test]
    fn test_cancel_running_job_is_timeout() {
        let pipeline = Arc::new(FakePipeline {
            delay: Duration::from_secs(5),
            ..FakePipeline::default()
        });
        let orchestrator = orchestrator(Arc::clone(&pipeline), settings());

        thread::scope(|scope| {
            let handle = scope.spawn(|| orchestrator.submit("https://example.com/long.mp4"));
            thread::sleep(Duration::from_millis(100));
            assert_eq!(orchestrator.cancel_all(), 1);
            let err = handle.join().unwrap().unwrap_err();
            assert!(matches!(err, PipelineError::Timeout(_)));
        });
    }

    #[test]
    fn test_panicking_pipeline_is_internal_error() {
        let pipeline = Arc::new(FakePipeline {
            panic: true,
            ..FakePipeline::default()
        });
        let orchestrator = orchestrator(Arc::clone(&pipeline), settings());

        let err = orchestrator.submit("https://example.com/p.mp4").unwrap_err();
        assert!(matches!(err, PipelineError::InternalError(_)));
        assert_eq!(orchestrator.running_jobs(), 0);

        // 同一來源可以重新提交
        assert!(orchestrator.submit("https://example.com/p.mp4").is_err());
        assert_eq!(pipeline.runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shutdown_cancels_and_rejects() {
        let pipeline = Arc::new(FakePipeline {
            delay: Duration::from_secs(5),
            ..FakePipeline::default()
        });
        let orchestrator = orchestrator(Arc::clone(&pipeline), settings());

        thread::scope(|scope| {
            let handle = scope.spawn(|| orchestrator.submit("https://example.com/long.mp4"));
            thread::sleep(Duration::from_millis(100));
            orchestrator.shutdown();
            assert!(matches!(
                handle.join().unwrap(),
                Err(PipelineError::Timeout(_))
            ));
        });

        assert!(matches!(
            orchestrator.submit("https://example.com/new.mp4"),
            Err(PipelineError::Busy(_))
        ));
    }
}
