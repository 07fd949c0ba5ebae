use super::store::{
    Artifact, ArtifactStore, CUE_TRACK_FILENAME, SPRITE_FILENAME, StoredArtifacts,
    is_artifact_name,
};
use crate::component::sprite_generator::{
    CUE_TRACK_CONTENT_TYPE, CueTrack, SPRITE_CONTENT_TYPE, SpriteSheet,
};
use crate::error::{PipelineError, PipelineResult};
use crate::tools::ensure_directory_exists;
use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

const STAGING_PREFIX: &str = ".staging-";

/// 本機檔案系統上的產物儲存
///
/// 佈局為 `<root>/<job_id>/{sprite.jpg, sprite.vtt}`。兩個檔案先寫入
/// `<root>/.staging-<job_id>/`，全部成功後才以 rename 一次換上正式位置。
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
    public_base_path: String,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>, public_base_path: &str) -> Result<Self> {
        let root = root.into();
        ensure_directory_exists(&root)?;
        Ok(Self {
            root,
            public_base_path: public_base_path.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    fn write_staged(
        &self,
        job_id: Uuid,
        sprite: &SpriteSheet,
        cue_track: &CueTrack,
    ) -> Result<StoredArtifacts> {
        let final_dir = self.job_dir(job_id);
        if final_dir.exists() {
            bail!("產物鍵已存在: {}", final_dir.display());
        }

        let staging = self.root.join(format!("{STAGING_PREFIX}{job_id}"));
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("無法清除殘留暫存: {}", staging.display()))?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("無法建立暫存資料夾: {}", staging.display()))?;

        let written = fs::write(staging.join(SPRITE_FILENAME), &sprite.bytes)
            .and_then(|()| fs::write(staging.join(CUE_TRACK_FILENAME), cue_track.render()))
            .context("無法寫入產物")
            .and_then(|()| {
                fs::rename(&staging, &final_dir)
                    .with_context(|| format!("無法移動產物到 {}", final_dir.display()))
            });

        if let Err(e) = written {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        Ok(StoredArtifacts {
            sprite_url: self.locator(job_id, SPRITE_FILENAME),
            cue_track_url: self.locator(job_id, CUE_TRACK_FILENAME),
        })
    }
}

impl ArtifactStore for FsArtifactStore {
    fn locator(&self, job_id: Uuid, name: &str) -> String {
        format!("{}/{job_id}/{name}", self.public_base_path)
    }

    fn persist(
        &self,
        job_id: Uuid,
        sprite: &SpriteSheet,
        cue_track: &CueTrack,
    ) -> PipelineResult<StoredArtifacts> {
        let stored = self
            .write_staged(job_id, sprite, cue_track)
            .map_err(|e| PipelineError::StorageFailed(PipelineError::detail(&e)))?;
        info!("產物已儲存: {}", self.job_dir(job_id).display());
        Ok(stored)
    }

    fn fetch(&self, job_id: &str, name: &str) -> Option<Artifact> {
        let job_id = Uuid::parse_str(job_id).ok()?;
        if !is_artifact_name(name) {
            return None;
        }

        let path = self.job_dir(job_id).join(name);
        let bytes = fs::read(&path).ok()?;
        let content_type = if name == SPRITE_FILENAME {
            SPRITE_CONTENT_TYPE
        } else {
            CUE_TRACK_CONTENT_TYPE
        };

        Some(Artifact {
            bytes,
            content_type,
            locator: self.locator(job_id, name),
        })
    }

    fn sweep_expired(&self, retention: Duration) -> usize {
        let Ok(entries) = fs::read_dir(&self.root) else {
            warn!("無法讀取產物資料夾: {}", self.root.display());
            return 0;
        };

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_job_dir = Uuid::parse_str(&name).is_ok();
            let is_staging = name
                .strip_prefix(STAGING_PREFIX)
                .is_some_and(|id| Uuid::parse_str(id).is_ok());
            if !(is_job_dir || is_staging) || !path.is_dir() {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.is_none_or(|age| age <= retention) {
                continue;
            }

            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    debug!("已刪除過期產物: {}", path.display());
                    if is_job_dir {
                        removed += 1;
                    }
                }
                Err(e) => warn!("無法刪除過期產物 {}: {e}", path.display()),
            }
        }

        if removed > 0 {
            info!("已清除 {removed} 個過期工作的產物");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::sprite_generator::{Cue, SpriteRect};
    use tempfile::TempDir;

    fn sprite() -> SpriteSheet {
        SpriteSheet {
            bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 160,
            height: 90,
            columns: 1,
            rows: 1,
            tile_width: 160,
            tile_height: 90,
        }
    }

    fn cue_track(store: &FsArtifactStore, job_id: Uuid) -> CueTrack {
        CueTrack {
            sprite_url: store.locator(job_id, SPRITE_FILENAME),
            cues: vec![Cue {
                index: 0,
                start_ms: 0,
                end_ms: 3000,
                rect: SpriteRect {
                    x: 0,
                    y: 0,
                    width: 160,
                    height: 90,
                },
            }],
        }
    }

    #[test]
    fn test_locator_format() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path(), "/thumbnails/").unwrap();
        let id = Uuid::nil();
        assert_eq!(
            store.locator(id, SPRITE_FILENAME),
            format!("/thumbnails/{id}/sprite.jpg")
        );
    }

    #[test]
    fn test_persist_then_fetch() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path(), "/thumbnails").unwrap();
        let id = Uuid::new_v4();

        let stored = store.persist(id, &sprite(), &cue_track(&store, id)).unwrap();
        assert_eq!(stored.sprite_url, format!("/thumbnails/{id}/sprite.jpg"));
        assert_eq!(stored.cue_track_url, format!("/thumbnails/{id}/sprite.vtt"));

        let image = store.fetch(&id.to_string(), SPRITE_FILENAME).unwrap();
        assert_eq!(image.bytes, sprite().bytes);
        assert_eq!(image.content_type, "image/jpeg");
        assert_eq!(image.locator, stored.sprite_url);

        let vtt = store.fetch(&id.to_string(), CUE_TRACK_FILENAME).unwrap();
        assert_eq!(vtt.content_type, "text/vtt; charset=utf-8");
        let text = String::from_utf8(vtt.bytes).unwrap();
        assert!(text.starts_with("WEBVTT"));
        assert!(text.contains(&format!("{}#xywh=0,0,160,90", stored.sprite_url)));

        // 暫存資料夾已換名
        assert!(!dir.path().join(format!(".staging-{id}")).exists());
    }

    #[test]
    fn test_persist_twice_is_storage_failure() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path(), "/thumbnails").unwrap();
        let id = Uuid::new_v4();
        store.persist(id, &sprite(), &cue_track(&store, id)).unwrap();

        let err = store
            .persist(id, &sprite(), &cue_track(&store, id))
            .unwrap_err();
        assert!(matches!(err, PipelineError::StorageFailed(_)));
    }

    #[test]
    fn test_fetch_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path(), "/thumbnails").unwrap();
        let id = Uuid::new_v4();
        store.persist(id, &sprite(), &cue_track(&store, id)).unwrap();

        assert!(store.fetch("../etc", SPRITE_FILENAME).is_none());
        assert!(store.fetch(&id.to_string(), "../../secret").is_none());
        assert!(store.fetch(&id.to_string(), "other.jpg").is_none());
        assert!(
            store
                .fetch(&Uuid::new_v4().to_string(), SPRITE_FILENAME)
                .is_none()
        );
    }

    #[test]
    fn test_sweep_keeps_fresh_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path(), "/thumbnails").unwrap();
        let id = Uuid::new_v4();
        store.persist(id, &sprite(), &cue_track(&store, id)).unwrap();

        assert_eq!(store.sweep_expired(Duration::from_secs(3600)), 0);
        assert!(store.fetch(&id.to_string(), SPRITE_FILENAME).is_some());
    }

    #[test]
    fn test_sweep_removes_expired_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path(), "/thumbnails").unwrap();
        let id = Uuid::new_v4();
        store.persist(id, &sprite(), &cue_track(&store, id)).unwrap();
        fs::create_dir(dir.path().join("unrelated")).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(store.sweep_expired(Duration::from_millis(1)), 1);
        assert!(store.fetch(&id.to_string(), SPRITE_FILENAME).is_none());
        assert!(dir.path().join("unrelated").exists());
    }
}
