//! HTTP 介面
//!
//! `POST /generate` 交給排程器產生產物，`GET <public_base_path>/:job_id/:file`
//! 提供產物下載，另有 `GET /health`。

mod routes;
mod sweeper;

pub use routes::{AppState, GenerateResponse, MessageResponse, router, serve, serve_on, status_for};
pub use sweeper::{spawn_retention_sweeper, sweep_once};
