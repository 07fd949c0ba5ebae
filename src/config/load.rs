use crate::config::types::Config;
use anyhow::{Context, Result, bail};
use log::info;
use std::fs;
use std::path::Path;

/// 預設設定檔位置（目前工作目錄）
pub const SETTINGS_FILE: &str = "settings.json";

impl Config {
    /// 載入 `settings.json`（不存在時使用預設值），套用環境變數並驗證
    pub fn new() -> Result<Self> {
        let mut config = Self::load_from(Path::new(SETTINGS_FILE))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("找不到設定檔 {}，使用預設設定", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))
    }

    /// `PORT` 環境變數覆寫監聽埠
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT 不是合法的埠號: {port}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let sampling = &self.sampling;
        if !(sampling.target_interval_secs.is_finite() && sampling.target_interval_secs > 0.0) {
            bail!("sampling.target_interval_secs 必須大於 0");
        }
        if sampling.min_thumbnails == 0 {
            bail!("sampling.min_thumbnails 必須至少為 1");
        }
        if sampling.min_thumbnails > sampling.max_thumbnails {
            bail!(
                "sampling.min_thumbnails ({}) 不可大於 max_thumbnails ({})",
                sampling.min_thumbnails,
                sampling.max_thumbnails
            );
        }
        if sampling.tile_width == 0 || sampling.tile_height == 0 {
            bail!("縮圖尺寸不可為 0");
        }
        if !(1..=100).contains(&sampling.jpeg_quality) {
            bail!("sampling.jpeg_quality 必須介於 1 到 100");
        }
        if self.extraction.workers_per_job == 0 || self.extraction.global_workers == 0 {
            bail!("擷取執行緒數必須至少為 1");
        }
        if self.extraction.frame_timeout_secs == 0 {
            bail!("extraction.frame_timeout_secs 必須大於 0");
        }
        if !(self.extraction.retry_nudge_secs.is_finite() && self.extraction.retry_nudge_secs >= 0.0)
        {
            bail!("extraction.retry_nudge_secs 不可為負");
        }
        if self.jobs.max_concurrent_jobs == 0 || self.jobs.job_timeout_secs == 0 {
            bail!("jobs.max_concurrent_jobs 與 jobs.job_timeout_secs 必須大於 0");
        }
        if !self.server.public_base_path.starts_with('/') {
            bail!(
                "server.public_base_path 必須以 / 開頭: {}",
                self.server.public_base_path
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::AdmissionPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampling.tile_width, 160);
        assert_eq!(config.sampling.tile_height, 90);
        assert_eq!(config.server.public_base_path, "/thumbnails");
    }

    #[test]
    fn test_load_missing_file_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.jobs.max_concurrent_jobs, 4);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "jobs": { "admission": "reject", "max_concurrent_jobs": 2 }, "sampling": { "max_thumbnails": 50 } }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.jobs.admission, AdmissionPolicy::Reject);
        assert_eq!(config.jobs.max_concurrent_jobs, 2);
        assert_eq!(config.jobs.job_timeout_secs, 300);
        assert_eq!(config.sampling.max_thumbnails, 50);
        assert_eq!(config.sampling.min_thumbnails, 1);
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut config = Config::default();
        config.sampling.min_thumbnails = 10;
        config.sampling.max_thumbnails = 5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sampling.tile_width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.public_base_path = "thumbnails".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.jobs.max_concurrent_jobs = 0;
        assert!(config.validate().is_err());
    }
}
