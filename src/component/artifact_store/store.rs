use crate::component::sprite_generator::{CueTrack, SpriteSheet};
use crate::error::PipelineResult;
use std::time::Duration;
use uuid::Uuid;

pub const SPRITE_FILENAME: &str = "sprite.jpg";
pub const CUE_TRACK_FILENAME: &str = "sprite.vtt";

/// 可對外提供的單一產物
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub locator: String,
}

/// 持久化後的兩個存取路徑
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifacts {
    pub sprite_url: String,
    pub cue_track_url: String,
}

#[must_use]
pub fn is_artifact_name(name: &str) -> bool {
    name == SPRITE_FILENAME || name == CUE_TRACK_FILENAME
}

/// 產物儲存介面
///
/// 同一個工作的兩個產物要嘛一起可見，要嘛都不存在。
pub trait ArtifactStore: Send + Sync {
    /// 產物的公開存取路徑（持久化前即可決定，縮圖軌需要引用雪碧圖路徑）
    fn locator(&self, job_id: Uuid, name: &str) -> String;

    fn persist(
        &self,
        job_id: Uuid,
        sprite: &SpriteSheet,
        cue_track: &CueTrack,
    ) -> PipelineResult<StoredArtifacts>;

    /// 依外部輸入讀取產物；`job_id` 或檔名不合法時回傳 `None`
    fn fetch(&self, job_id: &str, name: &str) -> Option<Artifact>;

    /// 刪除超過保留期限的產物，回傳刪除的工作數
    fn sweep_expired(&self, retention: Duration) -> usize;
}
