//! 功能元件模組
//!
//! 每個子模組實現一個獨立的功能，包含主要邏輯和專用工具

pub mod artifact_store;
pub mod job_orchestrator;
pub mod sprite_generator;

pub use artifact_store::{ArtifactStore, FsArtifactStore};
pub use job_orchestrator::Orchestrator;
pub use sprite_generator::SpriteGenerator;
