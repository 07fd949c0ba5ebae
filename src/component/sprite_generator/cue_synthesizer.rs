use super::sampling_planner::SamplingPlan;
use std::fmt::Write;

pub const CUE_TRACK_CONTENT_TYPE: &str = "text/vtt; charset=utf-8";

/// 雪碧圖中的矩形區域（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 單一 cue：`[start_ms, end_ms)` 對應到一格縮圖
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub index: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub rect: SpriteRect,
}

/// WebVTT 縮圖軌
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueTrack {
    pub sprite_url: String,
    pub cues: Vec<Cue>,
}

impl CueTrack {
    /// 輸出 WebVTT 文字
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("WEBVTT\n\n");
        for cue in &self.cues {
            let _ = write!(
                out,
                "{}\n{} --> {}\n{}#xywh={},{},{},{}\n\n",
                cue.index + 1,
                format_timestamp(cue.start_ms),
                format_timestamp(cue.end_ms),
                self.sprite_url,
                cue.rect.x,
                cue.rect.y,
                cue.rect.width,
                cue.rect.height
            );
        }
        out
    }
}

/// 依取樣計畫產生 cue 列表
///
/// 區段邊界統一換算成整數毫秒：第 `i` 個邊界為 `floor(i * interval * 1000)`，
/// 最後一個邊界固定為影片長度（無條件捨去，不會超過影片長度）。
/// 相鄰 cue 首尾相接，不會有空隙或重疊。
#[must_use]
pub fn synthesize_cues(plan: &SamplingPlan, sprite_url: &str) -> CueTrack {
    let total_ms = seconds_to_ms(plan.duration);
    let boundary = |i: u32| -> u64 {
        if i >= plan.count {
            total_ms
        } else {
            seconds_to_ms(f64::from(i) * plan.interval).min(total_ms)
        }
    };

    let cues = (0..plan.count)
        .map(|index| {
            let (x, y) = plan.tile_origin(index);
            Cue {
                index,
                start_ms: boundary(index),
                end_ms: boundary(index + 1),
                rect: SpriteRect {
                    x,
                    y,
                    width: plan.tile_width,
                    height: plan.tile_height,
                },
            }
        })
        .collect();

    CueTrack {
        sprite_url: sprite_url.to_string(),
        cues,
    }
}

/// 毫秒轉為 `HH:MM:SS.mmm`，小時至少兩位數
#[must_use]
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms / 60_000) % 60;
    let seconds = (ms / 1000) % 60;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).floor() as u64
}
