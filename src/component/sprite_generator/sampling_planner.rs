use crate::config::SamplingSettings;
use crate::tools::VideoMetadata;

/// 最後一張縮圖離片尾的距離，避免 seek 到 EOF
const END_GUARD_SECONDS: f64 = 0.1;

/// 取樣計畫：縮圖數量、間隔與網格尺寸
///
/// 由中繼資料決定性地推導，建立後不再改變。
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPlan {
    pub count: u32,
    pub interval: f64,
    pub duration: f64,
    pub columns: u32,
    pub rows: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl SamplingPlan {
    /// 第 `index` 張縮圖的擷取時間（所屬區段的起點，並避開片尾）
    #[must_use]
    pub fn capture_time(&self, index: u32) -> f64 {
        let latest = (self.duration - END_GUARD_SECONDS).max(0.0);
        (f64::from(index) * self.interval).min(latest)
    }

    #[must_use]
    pub fn capture_times(&self) -> Vec<f64> {
        (0..self.count).map(|i| self.capture_time(i)).collect()
    }

    /// 第 `index` 格的 (欄, 列)，row-major
    #[must_use]
    pub const fn cell(&self, index: u32) -> (u32, u32) {
        (index % self.columns, index / self.columns)
    }

    /// 第 `index` 格左上角在雪碧圖中的像素座標
    #[must_use]
    pub const fn tile_origin(&self, index: u32) -> (u32, u32) {
        let (col, row) = self.cell(index);
        (col * self.tile_width, row * self.tile_height)
    }

    #[must_use]
    pub const fn sprite_size(&self) -> (u32, u32) {
        (
            self.columns * self.tile_width,
            self.rows * self.tile_height,
        )
    }

    /// 網格中未使用的尾端空格數
    #[must_use]
    pub const fn blank_cells(&self) -> u32 {
        self.columns * self.rows - self.count
    }
}

/// 由影片長度計算取樣計畫
///
/// - `N = clamp(floor(duration / target_interval), min, max)`，長度不超過
///   `target_interval` 時 `N = min`
/// - 每個區段至少 1 毫秒，`N` 不超過長度的毫秒數
/// - `interval = duration / N`，讓區段剛好鋪滿整段影片
/// - 網格盡量接近正方形：`columns = ceil(sqrt(N))`、`rows = ceil(N / columns)`
#[must_use]
pub fn plan_sampling(metadata: &VideoMetadata, settings: &SamplingSettings) -> SamplingPlan {
    let duration = if metadata.duration_seconds.is_finite() {
        metadata.duration_seconds.max(0.0)
    } else {
        0.0
    };
    let min = settings.min_thumbnails.max(1);
    let max = settings.max_thumbnails.max(min);

    let count = if duration <= settings.target_interval_secs {
        min
    } else {
        let raw = (duration / settings.target_interval_secs).floor();
        // f64 -> u32 的轉換會飽和，超大值直接落在 max
        (raw as u32).clamp(min, max)
    };

    let millisecond_cap = ((duration * 1000.0).floor() as u32).max(1);
    let count = count.min(millisecond_cap);

    let interval = duration / f64::from(count);
    let columns = ceil_sqrt(count);
    let rows = count.div_ceil(columns);

    SamplingPlan {
        count,
        interval,
        duration,
        columns,
        rows,
        tile_width: settings.tile_width,
        tile_height: settings.tile_height,
    }
}

/// 最小的 c 使 c * c >= n
fn ceil_sqrt(n: u32) -> u32 {
    let n = u64::from(n);
    let mut c = (n as f64).sqrt() as u64;
    while c * c < n {
        c += 1;
    }
    while c > 1 && (c - 1) * (c - 1) >= n {
        c -= 1;
    }
    c.max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(duration: f64) -> VideoMetadata {
        VideoMetadata {
            duration_seconds: duration,
            width: 1920,
            height: 1080,
            frame_rate: 30.0,
        }
    }

    #[test]
    fn test_plan_95_seconds() {
        let plan = plan_sampling(&metadata(95.0), &SamplingSettings::default());
        assert_eq!(plan.count, 9);
        assert!((plan.interval - 95.0 / 9.0).abs() < 1e-9);
        assert_eq!(plan.columns, 3);
        assert_eq!(plan.rows, 3);
        assert_eq!(plan.blank_cells(), 0);
        assert_eq!(plan.sprite_size(), (480, 270));
    }

    #[test]
    fn test_plan_short_video_uses_min() {
        let plan = plan_sampling(&metadata(3.0), &SamplingSettings::default());
        assert_eq!(plan.count, 1);
        assert!((plan.interval - 3.0).abs() < 1e-9);
        assert_eq!((plan.columns, plan.rows), (1, 1));
        assert!((plan.capture_time(0)).abs() < 1e-9);
    }

    #[test]
    fn test_plan_exactly_target_interval() {
        let plan = plan_sampling(&metadata(10.0), &SamplingSettings::default());
        assert_eq!(plan.count, 1);
    }

    #[test]
    fn test_plan_short_video_with_larger_min() {
        let settings = SamplingSettings {
            min_thumbnails: 4,
            ..SamplingSettings::default()
        };
        let plan = plan_sampling(&metadata(3.0), &settings);
        assert_eq!(plan.count, 4);
        assert_eq!((plan.columns, plan.rows), (2, 2));
    }

    #[test]
    fn test_plan_caps_at_max() {
        let plan = plan_sampling(&metadata(7200.0), &SamplingSettings::default());
        assert_eq!(plan.count, 100);
        assert_eq!((plan.columns, plan.rows), (10, 10));
        assert!((plan.interval - 72.0).abs() < 1e-9);
    }

    #[test]
    fn test_plan_leaves_blank_cells() {
        // 55 秒 -> 5 張，3 欄 2 列，空 1 格
        let plan = plan_sampling(&metadata(55.0), &SamplingSettings::default());
        assert_eq!(plan.count, 5);
        assert_eq!((plan.columns, plan.rows), (3, 2));
        assert_eq!(plan.blank_cells(), 1);
        assert_eq!(plan.cell(4), (1, 1));
        assert_eq!(plan.tile_origin(4), (160, 90));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let settings = SamplingSettings::default();
        assert_eq!(
            plan_sampling(&metadata(123.456), &settings),
            plan_sampling(&metadata(123.456), &settings)
        );
    }

    #[test]
    fn test_plan_zero_duration_is_still_valid() {
        let plan = plan_sampling(&metadata(0.0), &SamplingSettings::default());
        assert_eq!(plan.count, 1);
        assert_eq!((plan.columns, plan.rows), (1, 1));
    }

    #[test]
    fn test_plan_millisecond_cap() {
        let settings = SamplingSettings {
            min_thumbnails: 10,
            max_thumbnails: 10,
            ..SamplingSettings::default()
        };
        let plan = plan_sampling(&metadata(0.0045), &settings);
        assert_eq!(plan.count, 4);
    }

    #[test]
    fn test_capture_times_stay_before_end() {
        let plan = plan_sampling(&metadata(95.0), &SamplingSettings::default());
        let times = plan.capture_times();
        assert_eq!(times.len(), 9);
        assert!(times[0].abs() < 1e-9);
        for pair in times.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert!(*times.last().unwrap() <= 95.0 - 0.1);
    }

    #[test]
    fn test_ceil_sqrt() {
        let cases = [(1, 1), (2, 2), (4, 2), (5, 3), (9, 3), (10, 4), (100, 10), (101, 11)];
        for (n, expected) in cases {
            assert_eq!(ceil_sqrt(n), expected, "ceil_sqrt({n})");
        }
    }
}
