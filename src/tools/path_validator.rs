use anyhow::{Context, Result};
use std::path::Path;

pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("無法建立資料夾: {}", path.display()))?;
    }
    Ok(())
}

/// 檔案存在且非空
#[must_use]
pub fn is_non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}
