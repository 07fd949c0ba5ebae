use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 服務完整設定，對應 `settings.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub sampling: SamplingSettings,
    pub extraction: ExtractionSettings,
    pub jobs: JobSettings,
    pub source: SourceSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
    /// 產物對外路徑前綴，例如 `/thumbnails`
    pub public_base_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            public_base_path: "/thumbnails".to_string(),
        }
    }
}

/// 取樣規劃參數
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    pub target_interval_secs: f64,
    pub min_thumbnails: u32,
    pub max_thumbnails: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// 雪碧圖 JPEG 品質 (1-100)
    pub jpeg_quality: u8,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            target_interval_secs: 10.0,
            min_thumbnails: 1,
            max_thumbnails: 100,
            tile_width: 160,
            tile_height: 90,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// 單一工作的擷取執行緒數
    pub workers_per_job: usize,
    /// 全域同時執行的 ffmpeg 擷取上限
    pub global_workers: usize,
    pub frame_timeout_secs: u64,
    /// 擷取失敗時往前微調的秒數
    pub retry_nudge_secs: f64,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            workers_per_job: 4,
            global_workers: default_global_workers(),
            frame_timeout_secs: 30,
            retry_nudge_secs: 0.1,
        }
    }
}

fn default_global_workers() -> usize {
    sysinfo::System::physical_core_count().unwrap_or(4).max(1)
}

/// 超過並行上限時的准入策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// 排隊等待空位（以工作逾時為上限）
    Queue,
    /// 直接回覆 Busy
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub max_concurrent_jobs: usize,
    pub admission: AdmissionPolicy,
    pub job_timeout_secs: u64,
    /// 相同來源的並行請求合併為一次執行
    pub coalesce_duplicates: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            admission: AdmissionPolicy::Queue,
            job_timeout_secs: 300,
            coalesce_duplicates: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub download_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub max_source_bytes: u64,
    /// 允許 `file://` 來源（僅供本機測試）
    pub allow_file_urls: bool,
    /// 下載暫存根目錄
    pub work_dir: PathBuf,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            download_timeout_secs: 120,
            probe_timeout_secs: 20,
            max_source_bytes: 2 * 1024 * 1024 * 1024,
            allow_file_urls: false,
            work_dir: PathBuf::from("temp_videos"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub root: PathBuf,
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("temp_thumbnails"),
            retention_secs: 3600,
            sweep_interval_secs: 300,
        }
    }
}
