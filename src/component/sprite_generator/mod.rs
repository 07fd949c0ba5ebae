//! 雪碧圖與 WebVTT 縮圖軌生成元件
//!
//! 流程：
//! A. 取得來源並讀取影片資訊（ffprobe）
//! B. 規劃縮圖數量與間隔
//! C. 平行擷取並縮放縮圖
//! D. 合併為雪碧圖
//! E. 產生 WebVTT 縮圖軌
//! F. 交給產物儲存

mod cue_synthesizer;
mod frame_sampler;
mod main;
mod sampling_planner;
mod source_prober;
mod sprite_compositor;

pub use cue_synthesizer::{
    CUE_TRACK_CONTENT_TYPE, Cue, CueTrack, SpriteRect, format_timestamp, synthesize_cues,
};
pub use frame_sampler::{
    FfmpegExtractor, Frame, FrameExtractor, FrameSampler, FrameTask, create_frame_tasks,
    letterbox_filter,
};
pub use main::SpriteGenerator;
pub use sampling_planner::{SamplingPlan, plan_sampling};
pub use source_prober::{SourceHandle, SourceProber, parse_source_url};
pub use sprite_compositor::{SPRITE_CONTENT_TYPE, SpriteSheet, compose_sprite};
