// 预设结果检测器
//
// 按参考图像尺寸编写的一组固定检测框，运行时按实际图像尺寸缩放并按置信度过滤。
// NMS 阈值原样忽略。用于在没有真实模型时驱动整条管线。

use crate::config::AccelerationMode;
use crate::detection::{Detection, Detector, DetectorLoader};
use crate::error::{AppError, AppResult};
use crate::frame::DecodedImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// JSON 脚本文件结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionScript {
    /// 编写检测框时的参考图像宽度
    pub image_width: u32,
    /// 编写检测框时的参考图像高度
    pub image_height: u32,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone)]
pub struct ScriptedDetector {
    script: Arc<DetectionScript>,
    /// 模拟推理耗时
    latency: Option<Duration>,
    calls: Arc<AtomicU64>,
}

impl ScriptedDetector {
    pub fn new(image_width: u32, image_height: u32, detections: Vec<Detection>) -> Self {
        Self {
            script: Arc::new(DetectionScript { image_width, image_height, detections }),
            latency: None,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 从 JSON 文件读取脚本
    pub fn from_json_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let script: DetectionScript = serde_json::from_str(&content)?;
        if script.image_width == 0 || script.image_height == 0 {
            return Err(AppError::InvalidArgument(format!(
                "检测脚本参考尺寸无效: {}x{}", script.image_width, script.image_height
            )));
        }
        info!("[DETECTOR] 已读取检测脚本: {} ({} 个检测框, 参考尺寸 {}x{})",
            path.display(), script.detections.len(), script.image_width, script.image_height);
        Ok(Self {
            script: Arc::new(script),
            latency: None,
            calls: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 累计调用次数（所有克隆共享）
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for ScriptedDetector {
    fn detect(
        &self,
        image: &DecodedImage,
        score_threshold: f32,
        _nms_threshold: f32,
    ) -> AppResult<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        let sx = image.width() as f32 / self.script.image_width as f32;
        let sy = image.height() as f32 / self.script.image_height as f32;

        let detections: Vec<Detection> = self
            .script
            .detections
            .iter()
            .filter(|d| d.score >= score_threshold)
            .map(|d| Detection::new(d.x0 * sx, d.y0 * sy, d.x1 * sx, d.y1 * sy, d.label, d.score))
            .collect();

        debug!("[DETECTOR] 帧 {}: {} 个检测框 (阈值 {:.2})",
            image.frame_id, detections.len(), score_threshold);
        Ok(detections)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

impl DetectorLoader for ScriptedDetector {
    fn load(&self, _mode: AccelerationMode) -> AppResult<Box<dyn Detector>> {
        Ok(Box::new(self.clone()))
    }
}
