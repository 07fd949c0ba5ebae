use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// 等待許可時重新檢查停止條件的間隔
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// 全域擷取許可（計數號誌）
///
/// 每個 ffmpeg 擷取呼叫都必須持有一個許可，讓所有工作的擷取總數不超過上限。
#[derive(Debug)]
pub struct ExtractionPermits {
    available: Mutex<usize>,
    freed: Condvar,
    capacity: usize,
}

/// 持有期間佔用一個許可，drop 時歸還
#[derive(Debug)]
pub struct Permit<'a> {
    permits: &'a ExtractionPermits,
}

impl ExtractionPermits {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            available: Mutex::new(capacity),
            freed: Condvar::new(),
            capacity,
        }
    }

    /// 取得許可；等待期間 `should_stop` 為 true 則放棄並回傳 `None`
    pub fn acquire(&self, should_stop: &dyn Fn() -> bool) -> Option<Permit<'_>> {
        let mut available = self.available.lock();
        loop {
            if should_stop() {
                return None;
            }
            if *available > 0 {
                *available -= 1;
                return Some(Permit { permits: self });
            }
            self.freed.wait_for(&mut available, WAIT_SLICE);
        }
    }

    #[must_use]
    pub fn available(&self) -> usize {
        *self.available.lock()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut available = self.permits.available.lock();
        *available += 1;
        self.permits.freed.notify_one();
    }
}
