use crate::component::artifact_store::ArtifactStore;
use crate::component::job_orchestrator::Orchestrator;
use crate::config::StoreSettings;
use log::{debug, info};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 關閉旗標輪詢間隔
const POLL: Duration = Duration::from_millis(200);

/// 清除過期產物與已結束的工作紀錄，回傳 (刪除的產物數, 移除的紀錄數)
pub fn sweep_once(
    store: &dyn ArtifactStore,
    orchestrator: &Orchestrator,
    retention: Duration,
) -> (usize, usize) {
    let removed = store.sweep_expired(retention);
    let older_than =
        chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::weeks(5200));
    let pruned = orchestrator.prune_finished(older_than);
    if removed > 0 || pruned > 0 {
        info!("保留期限清理: 刪除 {removed} 組產物，移除 {pruned} 筆工作紀錄");
    }
    (removed, pruned)
}

/// 啟動背景清理執行緒，每 `sweep_interval_secs` 執行一次直到關閉旗標被設定
pub fn spawn_retention_sweeper(
    store: Arc<dyn ArtifactStore>,
    orchestrator: Arc<Orchestrator>,
    settings: &StoreSettings,
    shutdown: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    let retention = Duration::from_secs(settings.retention_secs);
    let interval = Duration::from_secs(settings.sweep_interval_secs.max(1));

    thread::Builder::new()
        .name("retention-sweeper".to_string())
        .spawn(move || {
            debug!("產物清理執行緒啟動: 保留 {retention:?}，每 {interval:?} 檢查");
            let mut last_sweep = Instant::now();
            while !shutdown.load(Ordering::SeqCst) {
                thread::sleep(POLL);
                if last_sweep.elapsed() < interval {
                    continue;
                }
                last_sweep = Instant::now();
                sweep_once(store.as_ref(), &orchestrator, retention);
            }
            debug!("產物清理執行緒結束");
        })
}
