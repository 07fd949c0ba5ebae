use crate::config::SourceSettings;
use crate::error::{PipelineError, PipelineResult};
use crate::tools::{JobSignal, VideoMetadata, ensure_directory_exists, get_video_metadata};
use log::{debug, info};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use uuid::Uuid;

/// 低於 1 毫秒的長度視為空影片
const MIN_DURATION_SECONDS: f64 = 0.001;

/// 下載讀取緩衝大小
const CHUNK_SIZE: usize = 64 * 1024;

const DOWNLOAD_FILENAME: &str = "input_video";

/// 解析並驗證來源 URL
///
/// 只接受 http/https；`allow_file_urls` 開啟時另外接受 `file://`。
pub fn parse_source_url(raw: &str, allow_file_urls: bool) -> PipelineResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidSource("empty URL".to_string()));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| PipelineError::InvalidSource(format!("{trimmed}: {e}")))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(url),
        "http" | "https" => Err(PipelineError::InvalidSource(format!(
            "{trimmed}: missing host"
        ))),
        "file" if allow_file_urls => Ok(url),
        scheme => Err(PipelineError::InvalidSource(format!(
            "unsupported scheme '{scheme}'"
        ))),
    }
}

/// 工作專屬的來源存取權
///
/// 持有暫存資料夾（下載檔與擷取的縮圖都放在裡面），drop 時整個資料夾被刪除。
/// 所有權由 Prober 交給工作，不論成功、失敗或取消都會在離開時釋放。
#[derive(Debug)]
pub struct SourceHandle {
    scratch: TempDir,
    video_path: PathBuf,
}

impl SourceHandle {
    #[must_use]
    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

pub struct SourceProber<'a> {
    settings: &'a SourceSettings,
}

impl<'a> SourceProber<'a> {
    #[must_use]
    pub const fn new(settings: &'a SourceSettings) -> Self {
        Self { settings }
    }

    /// 取得來源存取權：HTTP 來源下載到暫存資料夾，`file://` 來源直接引用
    pub fn fetch(&self, url: &Url, job_id: Uuid, signal: &JobSignal) -> PipelineResult<SourceHandle> {
        signal.check("probing")?;

        ensure_directory_exists(&self.settings.work_dir)
            .map_err(|e| PipelineError::InternalError(PipelineError::detail(&e)))?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("job-{job_id}-"))
            .tempdir_in(&self.settings.work_dir)
            .map_err(|e| PipelineError::InternalError(format!("無法建立暫存資料夾: {e}")))?;

        let video_path = match url.scheme() {
            "file" => self.local_source(url)?,
            _ => {
                let path = scratch.path().join(DOWNLOAD_FILENAME);
                self.download(url, &path, signal)?;
                path
            }
        };

        Ok(SourceHandle {
            scratch,
            video_path,
        })
    }

    /// 以 ffprobe 取得中繼資料
    pub fn probe(&self, source: &SourceHandle, signal: &JobSignal) -> PipelineResult<VideoMetadata> {
        signal.check("probing")?;

        let timeout = signal.bounded(Duration::from_secs(self.settings.probe_timeout_secs));
        let metadata = get_video_metadata(source.video_path(), timeout, &|| signal.should_stop())
            .map_err(|e| {
                signal
                    .check("probing")
                    .err()
                    .unwrap_or_else(|| PipelineError::ProbeFailed(PipelineError::detail(&e)))
            })?;

        if metadata.duration_seconds < MIN_DURATION_SECONDS {
            return Err(PipelineError::ProbeFailed(format!(
                "invalid duration {:.3}s",
                metadata.duration_seconds
            )));
        }
        if metadata.width == 0 || metadata.height == 0 {
            return Err(PipelineError::ProbeFailed(format!(
                "invalid resolution {}x{}",
                metadata.width, metadata.height
            )));
        }

        info!(
            "影片資訊: {:.2}s, {}x{}, {:.2} fps",
            metadata.duration_seconds, metadata.width, metadata.height, metadata.frame_rate
        );
        Ok(metadata)
    }

    fn local_source(&self, url: &Url) -> PipelineResult<PathBuf> {
        let path = url
            .to_file_path()
            .map_err(|()| PipelineError::InvalidSource(format!("{url}: not a local path")))?;

        let meta = std::fs::metadata(&path)
            .map_err(|e| PipelineError::Unreachable(format!("{}: {e}", path.display())))?;
        if !meta.is_file() {
            return Err(PipelineError::Unreachable(format!(
                "{}: not a file",
                path.display()
            )));
        }
        if meta.len() > self.settings.max_source_bytes {
            return Err(self.too_large(meta.len()));
        }

        debug!("使用本機來源: {}", path.display());
        Ok(path)
    }

    fn download(&self, url: &Url, output: &Path, signal: &JobSignal) -> PipelineResult<()> {
        info!("下載影片: {url}");

        let timeout = signal.bounded(Duration::from_secs(self.settings.download_timeout_secs));
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::InternalError(format!("無法建立 HTTP client: {e}")))?;

        let mut response = client
            .get(url.as_str())
            .send()
            .map_err(|e| PipelineError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Unreachable(format!("HTTP {status}")));
        }

        if let Some(length) = response.content_length()
            && length > self.settings.max_source_bytes
        {
            return Err(self.too_large(length));
        }

        let mut file = File::create(output)
            .map_err(|e| PipelineError::InternalError(format!("無法建立下載檔案: {e}")))?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut total: u64 = 0;

        loop {
            signal.check("download")?;
            let read = response
                .read(&mut buffer)
                .map_err(|e| PipelineError::Unreachable(format!("read failed: {e}")))?;
            if read == 0 {
                break;
            }
            total += read as u64;
            if total > self.settings.max_source_bytes {
                return Err(self.too_large(total));
            }
            file.write_all(&buffer[..read])
                .map_err(|e| PipelineError::InternalError(format!("無法寫入下載檔案: {e}")))?;
        }
        file.flush()
            .map_err(|e| PipelineError::InternalError(format!("無法寫入下載檔案: {e}")))?;

        if total == 0 {
            return Err(PipelineError::ProbeFailed("downloaded file is empty".to_string()));
        }

        info!("下載完成: {total} bytes -> {}", output.display());
        Ok(())
    }

    fn too_large(&self, size: u64) -> PipelineError {
        PipelineError::ProbeFailed(format!(
            "source is {size} bytes, limit is {}",
            self.settings.max_source_bytes
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(work_dir: &Path) -> SourceSettings {
        SourceSettings {
            allow_file_urls: true,
            work_dir: work_dir.to_path_buf(),
            ..SourceSettings::default()
        }
    }

    #[test]
    fn test_parse_source_url_accepts_http() {
        let url = parse_source_url("  https://cdn.example.com/a.mp4 ", false).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/a.mp4");
    }

    #[test]
    fn test_parse_source_url_rejects_malformed() {
        for raw in ["", "   ", "not a url", "ftp://example.com/a.mp4", "http://"] {
            assert!(
                matches!(
                    parse_source_url(raw, false),
                    Err(PipelineError::InvalidSource(_))
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_source_url_file_scheme_is_opt_in() {
        assert!(parse_source_url("file:///tmp/a.mp4", false).is_err());
        assert!(parse_source_url("file:///tmp/a.mp4", true).is_ok());
    }

    #[test]
    fn test_missing_local_file_is_unreachable() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let prober = SourceProber::new(&settings);
        let url = Url::from_file_path(dir.path().join("missing.mp4")).unwrap();
        let signal = JobSignal::new(Duration::from_secs(10));

        let err = prober.fetch(&url, Uuid::new_v4(), &signal).unwrap_err();
        assert!(matches!(err, PipelineError::Unreachable(_)));
    }

    #[test]
    fn test_local_file_over_limit_is_rejected() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("big.mp4");
        std::fs::write(&video, vec![0u8; 2048]).unwrap();
        let settings = SourceSettings {
            max_source_bytes: 1024,
            ..settings(dir.path())
        };
        let prober = SourceProber::new(&settings);
        let url = Url::from_file_path(&video).unwrap();
        let signal = JobSignal::new(Duration::from_secs(10));

        let err = prober.fetch(&url, Uuid::new_v4(), &signal).unwrap_err();
        assert!(matches!(err, PipelineError::ProbeFailed(_)));
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"fake").unwrap();
        let settings = settings(&dir.path().join("work"));
        let prober = SourceProber::new(&settings);
        let url = Url::from_file_path(&video).unwrap();
        let signal = JobSignal::new(Duration::from_secs(10));

        let handle = prober.fetch(&url, Uuid::new_v4(), &signal).unwrap();
        let scratch = handle.scratch_dir().to_path_buf();
        assert!(scratch.is_dir());
        assert_eq!(handle.video_path(), video.as_path());

        drop(handle);
        assert!(!scratch.exists());
        assert!(video.exists());
    }

    #[test]
    fn test_connection_refused_is_unreachable() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let prober = SourceProber::new(&settings);
        let url = Url::parse("http://127.0.0.1:1/video.mp4").unwrap();
        let signal = JobSignal::new(Duration::from_secs(10));

        let err = prober.fetch(&url, Uuid::new_v4(), &signal).unwrap_err();
        assert!(matches!(err, PipelineError::Unreachable(_)), "{err:?}");
        // 失敗時暫存資料夾也要清乾淨
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_cancelled_signal_stops_fetch() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let prober = SourceProber::new(&settings);
        let url = Url::parse("http://127.0.0.1:1/video.mp4").unwrap();
        let signal = JobSignal::new(Duration::from_secs(10));
        signal.cancel();

        let err = prober.fetch(&url, Uuid::new_v4(), &signal).unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
    }
}
