// 目标检测模块
//
// 检测器本身是外部黑盒服务，这里只定义调用契约和生命周期管理。
//
// 子模块：
// - detector: Detector / DetectorLoader 契约，DetectorHandle 负责加载与切换执行模式
// - labels: 固定的 COCO 80 类标签表
// - scripted: 返回预设结果的确定性检测器，用于演示与测试

pub mod detector;
pub mod labels;
pub mod scripted;

pub use detector::{Detector, DetectorHandle, DetectorLoader};
pub use scripted::ScriptedDetector;

use serde::{Deserialize, Serialize};

/// 单个检测结果
///
/// 坐标位于传给检测器的图像坐标系中。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    /// 标签表索引
    pub label: usize,
    /// 置信度 (0.0 - 1.0)
    pub score: f32,
}

impl Detection {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32, label: usize, score: f32) -> Self {
        Self { x0, y0, x1, y1, label, score }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// 标签名称，索引越界时为 None
    pub fn label_name(&self) -> Option<&'static str> {
        labels::label_name(self.label)
    }
}
