// 帧率统计
//
// fps = 1000 / 周期耗时（毫秒）。耗时为 0（时钟精度不足）或为负时返回调用方给定的回退值，
// 不做除法。可选指数平滑，默认关闭，直接返回单周期原始值。

use crate::config::RateConfig;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RateTracker {
    fallback: f32,
    smoothing: Option<f32>,
    last: Option<f32>,
}

impl RateTracker {
    pub fn new(fallback: f32) -> Self {
        Self { fallback, smoothing: None, last: None }
    }

    /// 启用指数平滑，alpha 必须在 (0, 1] 内，否则保持原始值
    pub fn with_smoothing(mut self, alpha: f32) -> Self {
        if alpha.is_finite() && alpha > 0.0 && alpha <= 1.0 {
            self.smoothing = Some(alpha);
        } else {
            warn!("[RATE] 平滑系数无效: {}，使用原始帧率", alpha);
        }
        self
    }

    pub fn from_config(config: &RateConfig) -> Self {
        let tracker = Self::new(config.fallback_fps);
        match config.smoothing {
            Some(alpha) => tracker.with_smoothing(alpha),
            None => tracker,
        }
    }

    /// 记录一个周期，返回帧率
    pub fn record_cycle(&mut self, start_ms: i64, end_ms: i64) -> f32 {
        let duration = end_ms - start_ms;
        if duration <= 0 {
            return self.fallback;
        }

        let raw = 1000.0 / duration as f32;
        let value = match (self.smoothing, self.last) {
            (Some(alpha), Some(prev)) => alpha * raw + (1.0 - alpha) * prev,
            _ => raw,
        };
        self.last = Some(value);
        value
    }

    /// 最近一次有效周期的帧率
    pub fn last(&self) -> Option<f32> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_rate() {
        let mut tracker = RateTracker::new(0.0);
        let t = 1_700_000_000_000;
        assert_eq!(tracker.record_cycle(t, t + 500), 2.0);
        assert_eq!(tracker.record_cycle(t, t + 40), 25.0);
        assert_eq!(tracker.last(), Some(25.0));
    }

    #[test]
    fn test_zero_duration_returns_fallback() {
        let mut tracker = RateTracker::new(-1.0);
        let t = 1_000;
        assert_eq!(tracker.record_cycle(t, t), -1.0);
        assert_eq!(tracker.record_cycle(t, t - 5), -1.0);
        assert_eq!(tracker.last(), None);
    }

    #[test]
    fn test_smoothing() {
        let mut tracker = RateTracker::new(0.0).with_smoothing(0.5);
        assert_eq!(tracker.record_cycle(0, 100), 10.0);
        assert_eq!(tracker.record_cycle(0, 50), 15.0);
        // 回退值不影响平滑状态
        assert_eq!(tracker.record_cycle(0, 0), 0.0);
        assert_eq!(tracker.record_cycle(0, 50), 17.5);
    }

    #[test]
    fn test_invalid_smoothing_ignored() {
        let config = RateConfig { fallback_fps: 0.0, smoothing: Some(1.5) };
        let mut tracker = RateTracker::from_config(&config);
        tracker.record_cycle(0, 100);
        assert_eq!(tracker.record_cycle(0, 50), 20.0);
    }
}
