use super::frame_sampler::Frame;
use super::sampling_planner::SamplingPlan;
use crate::error::{PipelineError, PipelineResult};
use crate::tools::JobSignal;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use log::{debug, info};

pub const SPRITE_CONTENT_TYPE: &str = "image/jpeg";

/// 背景填色（未使用的尾端格子保持此顏色）
const FILL: Rgb<u8> = Rgb([0, 0, 0]);

/// 編碼完成的雪碧圖
#[derive(Debug, Clone)]
pub struct SpriteSheet {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub columns: u32,
    pub rows: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

/// 將縮圖依索引順序合併為單張雪碧圖
///
/// 第 `i` 張放在 `(i % columns, i / columns)`。縮圖一次只解碼一張，
/// 貼上畫布後立即釋放，記憶體用量只有畫布加一張縮圖。
pub fn compose_sprite(
    frames: &[Frame],
    plan: &SamplingPlan,
    quality: u8,
    signal: &JobSignal,
) -> PipelineResult<SpriteSheet> {
    if frames.len() != plan.count as usize {
        return Err(PipelineError::InternalError(format!(
            "expected {} frames, got {}",
            plan.count,
            frames.len()
        )));
    }

    let width = plan
        .columns
        .checked_mul(plan.tile_width)
        .ok_or_else(|| PipelineError::EncodingFailed("sprite width overflow".to_string()))?;
    let height = plan
        .rows
        .checked_mul(plan.tile_height)
        .ok_or_else(|| PipelineError::EncodingFailed("sprite height overflow".to_string()))?;

    debug!(
        "合併 {} 張縮圖為 {}x{} 雪碧圖 ({}x{} px)",
        frames.len(),
        plan.columns,
        plan.rows,
        width,
        height
    );

    let mut canvas = RgbImage::from_pixel(width, height, FILL);

    for (expected, frame) in (0..).zip(frames) {
        signal.check("compositing")?;

        if frame.index != expected {
            return Err(PipelineError::InternalError(format!(
                "frame out of order: expected index {expected}, got {}",
                frame.index
            )));
        }

        let tile = load_tile(frame, plan.tile_width, plan.tile_height)?;
        let (x, y) = plan.tile_origin(frame.index);
        imageops::replace(&mut canvas, &tile, i64::from(x), i64::from(y));
    }

    let bytes = encode_jpeg(&canvas, quality)?;
    info!("雪碧圖已編碼: {}x{}, {} bytes", width, height, bytes.len());

    Ok(SpriteSheet {
        bytes,
        width,
        height,
        columns: plan.columns,
        rows: plan.rows,
        tile_width: plan.tile_width,
        tile_height: plan.tile_height,
    })
}

fn load_tile(frame: &Frame, tile_width: u32, tile_height: u32) -> PipelineResult<RgbImage> {
    let tile = image::open(&frame.path)
        .map_err(|e| {
            PipelineError::EncodingFailed(format!(
                "cannot decode frame {} ({}): {e}",
                frame.index,
                frame.path.display()
            ))
        })?
        .to_rgb8();

    if tile.dimensions() == (tile_width, tile_height) {
        Ok(tile)
    } else {
        Ok(imageops::resize(
            &tile,
            tile_width,
            tile_height,
            FilterType::Triangle,
        ))
    }
}

fn encode_jpeg(canvas: &RgbImage, quality: u8) -> PipelineResult<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(canvas)
        .map_err(|e| PipelineError::EncodingFailed(format!("jpeg encoding failed: {e}")))?;
    Ok(bytes)
}
