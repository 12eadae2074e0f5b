// 展示端状态
//
// 运行在展示线程上，消费管线事件。叠加层每个周期整体替换，从不与旧结果合成。

use super::{CycleReport, PipelineEvent};
use crate::config::AccelerationMode;
use crate::error::DropReason;
use crate::overlay::OverlayRaster;
use std::collections::HashMap;
use tracing::{error, info};

/// 检测器状态（用于 CPU / GPU 指示）
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorStatus {
    Loading,
    Ready(AccelerationMode),
    Failed {
        mode: AccelerationMode,
        message: String,
    },
}

#[derive(Debug)]
pub struct DisplayState {
    latest: Option<CycleReport>,
    status: DetectorStatus,
    completed: u64,
    dropped: HashMap<DropReason, u64>,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayState {
    pub fn new() -> Self {
        Self {
            latest: None,
            status: DetectorStatus::Loading,
            completed: 0,
            dropped: HashMap::new(),
        }
    }

    /// 应用一个事件，返回叠加层是否被替换
    pub fn apply(&mut self, event: PipelineEvent) -> bool {
        match event {
            PipelineEvent::CycleComplete(report) => {
                self.completed += 1;
                self.latest = Some(report);
                true
            }
            PipelineEvent::FrameDropped { reason, .. } => {
                *self.dropped.entry(reason).or_insert(0) += 1;
                false
            }
            PipelineEvent::DetectorReady { mode } => {
                info!("[DISPLAY] 检测器就绪: {}", mode.as_str());
                self.status = DetectorStatus::Ready(mode);
                false
            }
            PipelineEvent::DetectorInitFailed { mode, message } => {
                error!("[DISPLAY] 检测器初始化失败 ({}): {}", mode.as_str(), message);
                self.status = DetectorStatus::Failed { mode, message };
                false
            }
        }
    }

    pub fn latest(&self) -> Option<&CycleReport> {
        self.latest.as_ref()
    }

    pub fn overlay(&self) -> Option<&OverlayRaster> {
        self.latest.as_ref().map(|r| &r.overlay)
    }

    pub fn fps(&self) -> f32 {
        self.latest.as_ref().map(|r| r.fps).unwrap_or(0.0)
    }

    /// 右上角帧率文字
    pub fn fps_text(&self) -> String {
        format!("{:.1} FPS", self.fps())
    }

    /// 左上角执行模式文字
    pub fn mode_text(&self) -> &'static str {
        match self.status {
            DetectorStatus::Ready(mode) => mode.as_str(),
            DetectorStatus::Loading => "...",
            DetectorStatus::Failed { .. } => "ERR",
        }
    }

    pub fn status(&self) -> &DetectorStatus {
        &self.status
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.dropped.get(&reason).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Detection;
    use image::RgbaImage;

    fn report(cycle: u64, fps: f32, boxes: usize) -> CycleReport {
        CycleReport {
            cycle,
            frame_id: cycle,
            detections: vec![Detection::new(0.0, 0.0, 1.0, 1.0, 0, 0.5); boxes],
            overlay: OverlayRaster { image: RgbaImage::new(4, 4), boxes: vec![] },
            fps,
            detector_size: (4, 4),
            started_at_ms: 0,
            finished_at_ms: 10,
        }
    }

    #[test]
    fn test_latest_cycle_replaces_previous() {
        let mut state = DisplayState::new();
        assert!(state.apply(PipelineEvent::CycleComplete(report(1, 12.0, 3))));
        assert!(state.apply(PipelineEvent::CycleComplete(report(2, 20.0, 0))));

        let latest = state.latest().unwrap();
        assert_eq!(latest.cycle, 2);
        assert!(latest.detections.is_empty());
        assert_eq!(state.fps_text(), "20.0 FPS");
        assert_eq!(state.completed(), 2);
    }

    #[test]
    fn test_detector_status_and_drops() {
        let mut state = DisplayState::new();
        assert_eq!(state.mode_text(), "...");

        state.apply(PipelineEvent::DetectorInitFailed {
            mode: AccelerationMode::Gpu,
            message: "no vulkan device".to_string(),
        });
        assert_eq!(state.mode_text(), "ERR");

        state.apply(PipelineEvent::DetectorReady { mode: AccelerationMode::Cpu });
        assert_eq!(state.mode_text(), "CPU");

        for _ in 0..3 {
            state.apply(PipelineEvent::FrameDropped {
                frame_id: 1,
                reason: DropReason::InvalidFrame,
                message: String::new(),
            });
        }
        assert_eq!(state.dropped(DropReason::InvalidFrame), 3);
        assert_eq!(state.dropped(DropReason::DetectorError), 0);
        assert!(state.overlay().is_none());
    }
}
