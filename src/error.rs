//! 管線錯誤分類
//!
//! 內部工具使用 `anyhow`，進入管線邊界時轉換為 [`PipelineError`]。
//! 錯誤需要 `Clone`，合併中的重複請求會收到同一個結果。

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Invalid video URL: {0}")]
    InvalidSource(String),

    #[error("Failed to download video. Please check the URL or network access. ({0})")]
    Unreachable(String),

    #[error("Could not get valid video metadata. Video might be corrupted or empty. ({0})")]
    ProbeFailed(String),

    #[error("Failed to extract thumbnails: {0}")]
    ExtractionFailed(String),

    #[error("Failed to create sprite image: {0}")]
    EncodingFailed(String),

    #[error("Failed to store generated artifacts: {0}")]
    StorageFailed(String),

    #[error("Job timed out or was cancelled: {0}")]
    Timeout(String),

    #[error("Server is busy, please retry later: {0}")]
    Busy(String),

    #[error("An unexpected server error occurred: {0}")]
    InternalError(String),
}

impl PipelineError {
    /// 穩定的錯誤種類名稱，用於日誌與 HTTP 狀態對應
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSource(_) => "InvalidSource",
            Self::Unreachable(_) => "Unreachable",
            Self::ProbeFailed(_) => "ProbeFailed",
            Self::ExtractionFailed(_) => "ExtractionFailed",
            Self::EncodingFailed(_) => "EncodingFailed",
            Self::StorageFailed(_) => "StorageFailed",
            Self::Timeout(_) => "Timeout",
            Self::Busy(_) => "Busy",
            Self::InternalError(_) => "InternalError",
        }
    }

    /// 把 anyhow 錯誤鏈壓平成單行細節
    pub fn detail(error: &anyhow::Error) -> String {
        format!("{error:#}")
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
