// 检测管线模块
//
// 帧回调线程：检查闸门 → 放行则交给检测线程，否则立即丢弃。
// 检测线程：解码 → 检测 → 渲染 → 统计帧率 → 发布结果，周期结束后释放闸门。
// 展示端只接收不可变的周期结果，两侧之间没有其他共享的可变状态。
//
// 子模块：
// - gate: 单槽并发闸门
// - rate: 帧率统计
// - runner: 检测线程与帧入口
// - display: 展示端状态

pub mod display;
pub mod gate;
pub mod rate;
pub mod runner;

pub use display::{DetectorStatus, DisplayState};
pub use gate::{CycleGuard, DetectionGate, GateStats};
pub use rate::RateTracker;
pub use runner::{FrameDisposition, Pipeline};

use crate::config::AccelerationMode;
use crate::detection::Detection;
use crate::error::DropReason;
use crate::overlay::OverlayRaster;

/// 一个完成的周期
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// 周期序号（从 1 开始）
    pub cycle: u64,
    pub frame_id: u64,
    pub detections: Vec<Detection>,
    pub overlay: OverlayRaster,
    pub fps: f32,
    /// 传给检测器的图像尺寸（旋转后）
    pub detector_size: (u32, u32),
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
}

/// 发布给展示端的事件
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    CycleComplete(CycleReport),
    /// 已放行的帧在周期内出错被丢弃
    FrameDropped {
        frame_id: u64,
        reason: DropReason,
        message: String,
    },
    DetectorReady {
        mode: AccelerationMode,
    },
    DetectorInitFailed {
        mode: AccelerationMode,
        message: String,
    },
}
