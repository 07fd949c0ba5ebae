//! 產物儲存元件
//!
//! 以工作 id 為鍵保存雪碧圖與 WebVTT 縮圖軌，並產生對外的存取路徑。

mod fs_store;
mod store;

pub use fs_store::FsArtifactStore;
pub use store::{
    Artifact, ArtifactStore, CUE_TRACK_FILENAME, SPRITE_FILENAME, StoredArtifacts,
    is_artifact_name,
};
