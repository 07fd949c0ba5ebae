use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[must_use]
pub fn setup_shutdown_signal() -> Arc<AtomicBool> {
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let signal_clone = Arc::clone(&shutdown_signal);

    ctrlc::set_handler(move || {
        if signal_clone.swap(true, Ordering::SeqCst) {
            eprintln!("\n已在關閉中，請稍候...");
        } else {
            eprintln!("\n收到中斷信號，正在取消進行中的工作並關閉服務...");
        }
    })
    .expect("無法設定 Ctrl-C 處理器");

    shutdown_signal
}
