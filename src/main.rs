use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use video_sprite::component::{ArtifactStore, FsArtifactStore, Orchestrator};
use video_sprite::config::Config;
use video_sprite::init;
use video_sprite::server::{self, AppState, spawn_retention_sweeper};
use video_sprite::signal::setup_shutdown_signal;

#[tokio::main]
async fn main() -> Result<()> {
    init::init();
    let config = Config::new()?;
    let shutdown_signal = setup_shutdown_signal();

    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(
        config.store.root.clone(),
        &config.server.public_base_path,
    )?);
    let orchestrator = Arc::new(Orchestrator::from_config(&config, Arc::clone(&store)));
    let sweeper = spawn_retention_sweeper(
        Arc::clone(&store),
        Arc::clone(&orchestrator),
        &config.store,
        Arc::clone(&shutdown_signal),
    )?;

    info!(
        "雪碧圖服務啟動: 每工作 {} 擷取執行緒，全域上限 {}，同時 {} 個工作",
        config.extraction.workers_per_job,
        config.extraction.global_workers,
        config.jobs.max_concurrent_jobs
    );

    let state = AppState {
        orchestrator,
        store,
    };
    let served = server::serve(&config.server, state, Arc::clone(&shutdown_signal)).await;

    shutdown_signal.store(true, Ordering::SeqCst);
    if sweeper.join().is_err() {
        warn!("產物清理執行緒異常結束");
    }

    served?;
    info!("服務已正常結束");
    Ok(())
}
