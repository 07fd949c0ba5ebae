use super::sampling_planner::SamplingPlan;
use super::source_prober::SourceHandle;
use crate::config::ExtractionSettings;
use crate::error::{PipelineError, PipelineResult};
use crate::tools::{
    ExtractionPermits, JobSignal, ensure_directory_exists, is_non_empty_file, run_command,
};
use anyhow::{Result, bail};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 兩段式 seek 的前置緩衝時間（秒）
const SEEK_MARGIN: f64 = 2.0;

const FRAMES_DIR: &str = "frames";

/// 已正規化為縮圖尺寸的單張畫面
///
/// 像素資料以 PNG 存放在工作暫存資料夾，隨 [`SourceHandle`] 一起清除。
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u32,
    /// 實際擷取的時間點（重試時為微調後的值）
    pub timestamp: f64,
    pub path: PathBuf,
}

/// 縮圖擷取任務
#[derive(Debug, Clone)]
pub struct FrameTask {
    pub video_path: PathBuf,
    pub timestamp: f64,
    pub output_path: PathBuf,
    pub index: u32,
}

#[derive(Debug)]
enum FrameOutcome {
    Extracted(Frame),
    Failed { index: u32, reason: String },
    Aborted,
}

/// 建立縮圖任務列表
#[must_use]
pub fn create_frame_tasks(video_path: &Path, plan: &SamplingPlan, output_dir: &Path) -> Vec<FrameTask> {
    plan.capture_times()
        .into_iter()
        .zip(0..)
        .map(|(timestamp, index)| FrameTask {
            video_path: video_path.to_path_buf(),
            timestamp,
            output_path: output_dir.join(format!("frame_{index:04}.png")),
            index,
        })
        .collect()
}

/// 信箱模式縮放濾鏡：等比縮小後置中補黑邊，輸出固定尺寸
#[must_use]
pub fn letterbox_filter(width: u32, height: u32) -> String {
    format!(
        "scale={width}:{height}:force_original_aspect_ratio=decrease,pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:black,setsar=1"
    )
}

/// 單張縮圖的擷取方式
pub trait FrameExtractor: Sync {
    /// 在 `timestamp` 擷取一張 `size` 大小的縮圖寫到 `output_path`
    fn extract(
        &self,
        video_path: &Path,
        timestamp: f64,
        output_path: &Path,
        size: (u32, u32),
        timeout: Duration,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<()>;
}

/// 以 ffmpeg 擷取
pub struct FfmpegExtractor;

impl FrameExtractor for FfmpegExtractor {
    fn extract(
        &self,
        video_path: &Path,
        timestamp: f64,
        output_path: &Path,
        size: (u32, u32),
        timeout: Duration,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<()> {
        extract_frame(video_path, timestamp, output_path, size, timeout, should_stop)
    }
}

pub struct FrameSampler<'a> {
    settings: &'a ExtractionSettings,
    permits: &'a ExtractionPermits,
    extractor: &'a dyn FrameExtractor,
}

impl<'a> FrameSampler<'a> {
    #[must_use]
    pub fn new(settings: &'a ExtractionSettings, permits: &'a ExtractionPermits) -> Self {
        Self::with_extractor(settings, permits, &FfmpegExtractor)
    }

    #[must_use]
    pub fn with_extractor(
        settings: &'a ExtractionSettings,
        permits: &'a ExtractionPermits,
        extractor: &'a dyn FrameExtractor,
    ) -> Self {
        Self {
            settings,
            permits,
            extractor,
        }
    }

    /// 平行擷取所有計畫中的縮圖
    ///
    /// worker 完成順序不固定，但結果依任務索引收集，回傳的序列一定按索引排列。
    /// 任一張在重試後仍失敗時，其餘 worker 停止啟動新的 ffmpeg，整個工作失敗。
    pub fn sample(
        &self,
        plan: &SamplingPlan,
        source: &SourceHandle,
        signal: &JobSignal,
    ) -> PipelineResult<Vec<Frame>> {
        signal.check("sampling")?;

        let output_dir = source.scratch_dir().join(FRAMES_DIR);
        ensure_directory_exists(&output_dir)
            .map_err(|e| PipelineError::InternalError(PipelineError::detail(&e)))?;

        let tasks = create_frame_tasks(source.video_path(), plan, &output_dir);
        let threads = self.settings.workers_per_job.min(tasks.len()).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("frame-sampler-{i}"))
            .build()
            .map_err(|e| PipelineError::InternalError(format!("無法建立擷取執行緒池: {e}")))?;

        info!("開始擷取 {} 張縮圖（{threads} 執行緒）", tasks.len());

        let abort = AtomicBool::new(false);
        let outcomes: Vec<FrameOutcome> = pool.install(|| {
            tasks
                .par_iter()
                .map(|task| self.run_task(task, plan, signal, &abort))
                .collect()
        });

        signal.check("sampling")?;

        if let Some((index, reason)) = outcomes.iter().find_map(|outcome| match outcome {
            FrameOutcome::Failed { index, reason } => Some((*index, reason.clone())),
            _ => None,
        }) {
            return Err(PipelineError::ExtractionFailed(format!(
                "frame {index}: {reason}"
            )));
        }

        let frames = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                FrameOutcome::Extracted(frame) => Ok(frame),
                _ => Err(PipelineError::InternalError(
                    "frame extraction aborted without a cause".to_string(),
                )),
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        info!("縮圖擷取完成: {} 張", frames.len());
        Ok(frames)
    }

    fn run_task(
        &self,
        task: &FrameTask,
        plan: &SamplingPlan,
        signal: &JobSignal,
        abort: &AtomicBool,
    ) -> FrameOutcome {
        let should_stop = || signal.should_stop() || abort.load(Ordering::SeqCst);
        if should_stop() {
            return FrameOutcome::Aborted;
        }

        let Some(_permit) = self.permits.acquire(&should_stop) else {
            return FrameOutcome::Aborted;
        };

        let timeout = Duration::from_secs(self.settings.frame_timeout_secs);
        match self.extract_with_retry(task, plan, timeout, &should_stop) {
            Ok(timestamp) => FrameOutcome::Extracted(Frame {
                index: task.index,
                timestamp,
                path: task.output_path.clone(),
            }),
            Err(_) if should_stop() => FrameOutcome::Aborted,
            Err(e) => {
                abort.store(true, Ordering::SeqCst);
                error!("縮圖擷取失敗 [{}]: {e:#}", task.index);
                FrameOutcome::Failed {
                    index: task.index,
                    reason: format!("{e:#}"),
                }
            }
        }
    }

    /// 擷取一次，失敗時往前微調時間點重試一次；回傳實際使用的時間點
    fn extract_with_retry(
        &self,
        task: &FrameTask,
        plan: &SamplingPlan,
        timeout: Duration,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<f64> {
        let first = self.extractor.extract(
            &task.video_path,
            task.timestamp,
            &task.output_path,
            (plan.tile_width, plan.tile_height),
            timeout,
            should_stop,
        );
        let Err(first_error) = first else {
            return Ok(task.timestamp);
        };

        if should_stop() {
            return Err(first_error);
        }

        let nudged = (task.timestamp - self.settings.retry_nudge_secs).max(0.0);
        warn!(
            "縮圖 {} 擷取失敗，改用 {:.3}s 重試: {first_error:#}",
            task.index, nudged
        );

        self.extractor.extract(
            &task.video_path,
            nudged,
            &task.output_path,
            (plan.tile_width, plan.tile_height),
            timeout,
            should_stop,
        )?;
        Ok(nudged)
    }
}

/// 擷取單一縮圖（兩段式 seek）
///
/// 1. `-ss` 在 `-i` 前：快速跳轉到最近的關鍵幀
/// 2. `-ss` 在 `-i` 後：精準解碼到目標時間點
fn extract_frame(
    video_path: &Path,
    timestamp: f64,
    output_path: &Path,
    (width, height): (u32, u32),
    timeout: Duration,
    should_stop: &dyn Fn() -> bool,
) -> Result<()> {
    let t0 = (timestamp - SEEK_MARGIN).max(0.0);
    let delta = timestamp - t0;

    debug!(
        "擷取縮圖: timestamp={timestamp:.3}s, seek={t0:.3}s+{delta:.3}s -> {}",
        output_path.display()
    );

    // 上一次失敗的殘留檔不可當成成功
    let _ = std::fs::remove_file(output_path);

    let mut command = Command::new("ffmpeg");
    command.args(["-hide_banner", "-loglevel", "error"]);
    if t0 > 0.0 {
        command.arg("-ss").arg(format!("{t0:.3}"));
    }
    command.arg("-i").arg(video_path);
    if delta > 0.0 {
        command.arg("-ss").arg(format!("{delta:.3}"));
    }
    command
        .args([
            "-frames:v",
            "1",
            "-an",
            "-sn",
            "-dn",
            "-threads",
            "1",
        ])
        .arg("-vf")
        .arg(letterbox_filter(width, height))
        .arg("-y")
        .arg(output_path);

    run_command(command, timeout, should_stop)?;

    // 時間點超出實際可解碼範圍時 ffmpeg 仍可能正常結束但不產生檔案
    if !is_non_empty_file(output_path) {
        bail!("縮圖檔案未建立 ({timestamp:.3}s): {}", output_path.display());
    }

    Ok(())
}
