use super::ffmpeg_command::run_command;
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// 無法取得幀率時的預設值
const DEFAULT_FRAME_RATE: f64 = 30.0;

/// 影片中繼資料，探測一次後不再改變
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

#[derive(Deserialize)]
struct ProbeReport {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

impl ProbeStream {
    fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }
}

/// ffprobe 以字串輸出秒數，無法解析或非有限值時視為缺少
fn parse_seconds(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|d| d.is_finite())
}

/// 使用 ffprobe 取得影片資訊
pub fn get_video_metadata(
    path: &Path,
    timeout: Duration,
    should_stop: &dyn Fn() -> bool,
) -> Result<VideoMetadata> {
    let mut command = Command::new("ffprobe");
    command
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path);

    let output = run_command(command, timeout, should_stop)
        .with_context(|| format!("ffprobe 執行失敗: {}", path.display()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffprobe_output(&stdout)
}

/// 解析 ffprobe 的 JSON 輸出
pub fn parse_ffprobe_output(json: &str) -> Result<VideoMetadata> {
    let report: ProbeReport = serde_json::from_str(json).context("無法解析 ffprobe 輸出")?;

    let stream = report
        .streams
        .iter()
        .find(|s| s.is_video())
        .ok_or_else(|| anyhow!("找不到視訊串流"))?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        bail!("視訊串流缺少解析度");
    };

    // 影片長度優先取 container，其次取串流
    let duration_seconds = parse_seconds(report.format.duration.as_deref())
        .or_else(|| parse_seconds(stream.duration.as_deref()))
        .ok_or_else(|| anyhow!("無法取得影片長度"))?;

    let frame_rate = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(DEFAULT_FRAME_RATE);

    Ok(VideoMetadata {
        duration_seconds,
        width,
        height,
        frame_rate,
    })
}

/// 幀率可能是分數 ("30000/1001") 或小數 ("29.97")
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.trim().parse::<f64>().ok()? / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}
