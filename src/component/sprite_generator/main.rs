use super::cue_synthesizer::synthesize_cues;
use super::frame_sampler::FrameSampler;
use super::sampling_planner::plan_sampling;
use super::source_prober::SourceProber;
use super::sprite_compositor::compose_sprite;
use crate::component::artifact_store::{ArtifactStore, SPRITE_FILENAME};
use crate::component::job_orchestrator::{JobArtifacts, JobContext, JobPipeline, JobStatus};
use crate::config::Config;
use crate::error::PipelineResult;
use crate::tools::ExtractionPermits;
use log::info;
use std::sync::Arc;

/// 雪碧圖生成管線
///
/// 任何階段失敗都直接回傳錯誤；來源暫存資料夾隨 `SourceHandle` 一起釋放，
/// 產物只在最後一步整組寫入，失敗的工作不會留下半套結果。
pub struct SpriteGenerator {
    config: Config,
    store: Arc<dyn ArtifactStore>,
    permits: Arc<ExtractionPermits>,
}

impl SpriteGenerator {
    pub fn new(config: Config, store: Arc<dyn ArtifactStore>) -> Self {
        let permits = Arc::new(ExtractionPermits::new(config.extraction.global_workers));
        Self {
            config,
            store,
            permits,
        }
    }
}

impl JobPipeline for SpriteGenerator {
    fn run(&self, ctx: &JobContext<'_>) -> PipelineResult<JobArtifacts> {
        // A. 取得來源
        ctx.advance(JobStatus::Probing);
        let prober = SourceProber::new(&self.config.source);
        let source = prober.fetch(ctx.source_url, ctx.job_id, ctx.signal)?;
        let metadata = prober.probe(&source, ctx.signal)?;

        // B. 規劃
        let plan = plan_sampling(&metadata, &self.config.sampling);
        info!(
            "工作 {}: {} 張縮圖，間隔 {:.3}s，{}x{} 網格",
            ctx.job_id, plan.count, plan.interval, plan.columns, plan.rows
        );

        // C. 擷取
        ctx.advance(JobStatus::Sampling);
        let frames = FrameSampler::new(&self.config.extraction, &self.permits)
            .sample(&plan, &source, ctx.signal)?;

        // D. 合併
        ctx.advance(JobStatus::Compositing);
        let sprite = compose_sprite(&frames, &plan, self.config.sampling.jpeg_quality, ctx.signal)?;
        drop(frames);
        drop(source);

        // E. 縮圖軌
        let sprite_url = self.store.locator(ctx.job_id, SPRITE_FILENAME);
        let cue_track = synthesize_cues(&plan, &sprite_url);

        // F. 儲存
        ctx.signal.check("storing")?;
        ctx.advance(JobStatus::Storing);
        let stored = self.store.persist(ctx.job_id, &sprite, &cue_track)?;

        Ok(JobArtifacts {
            sprite_url: stored.sprite_url,
            vtt_url: stored.cue_track_url,
        })
    }
}
