// 检测器契约与生命周期
//
// 检测器持有已加载的模型和执行模式（CPU / GPU），对管线而言是一个黑盒。
// 加载与切换执行模式是低频操作，不在热路径上；热路径只调用 detect。

use crate::config::AccelerationMode;
use crate::detection::Detection;
use crate::error::{AppError, AppResult};
use crate::frame::DecodedImage;
use crate::pipeline::PipelineEvent;
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 外部检测服务
pub trait Detector: Send + Sync {
    /// 对一张图像执行检测，返回图像坐标系中的检测框
    fn detect(
        &self,
        image: &DecodedImage,
        score_threshold: f32,
        nms_threshold: f32,
    ) -> AppResult<Vec<Detection>>;

    fn name(&self) -> &str {
        "detector"
    }
}

/// 按执行模式加载检测器
pub trait DetectorLoader: Send + Sync {
    fn load(&self, mode: AccelerationMode) -> AppResult<Box<dyn Detector>>;
}

struct LoadedDetector {
    detector: Arc<dyn Detector>,
    mode: AccelerationMode,
}

/// 当前检测器的持有者
///
/// 初始化失败只通过事件通道上报一次；之后的周期拿到 `DetectorUnavailable` 直接跳过。
pub struct DetectorHandle {
    current: RwLock<Option<LoadedDetector>>,
    last_error: RwLock<Option<String>>,
    events: Option<Sender<PipelineEvent>>,
}

impl Default for DetectorHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorHandle {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            last_error: RwLock::new(None),
            events: None,
        }
    }

    /// 初始化结果通过该通道通知展示层
    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// 以指定执行模式重新加载检测器
    ///
    /// 失败时卸载旧的检测器，后续周期会被跳过，直到下一次成功的重新配置。
    pub fn reconfigure(&self, loader: &dyn DetectorLoader, mode: AccelerationMode) -> AppResult<()> {
        info!("[DETECTOR] 加载检测器: 模式={}", mode.as_str());

        match loader.load(mode) {
            Ok(detector) => {
                info!("[DETECTOR] 检测器已就绪: {} ({})", detector.name(), mode.as_str());
                *self.current.write() = Some(LoadedDetector {
                    detector: Arc::from(detector),
                    mode,
                });
                *self.last_error.write() = None;
                self.notify(PipelineEvent::DetectorReady { mode });
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                error!("[DETECTOR] 检测器初始化失败 ({}): {}", mode.as_str(), message);
                *self.current.write() = None;
                *self.last_error.write() = Some(message.clone());
                self.notify(PipelineEvent::DetectorInitFailed {
                    mode,
                    message: message.clone(),
                });
                Err(AppError::DetectorInit(message))
            }
        }
    }

    /// 调用当前检测器；未加载时返回 `DetectorUnavailable`
    pub fn detect(
        &self,
        image: &DecodedImage,
        score_threshold: f32,
        nms_threshold: f32,
    ) -> AppResult<Vec<Detection>> {
        // 先克隆 Arc 再释放读锁，检测期间不阻塞重新配置
        let detector = self
            .current
            .read()
            .as_ref()
            .map(|loaded| loaded.detector.clone())
            .ok_or(AppError::DetectorUnavailable)?;

        detector.detect(image, score_threshold, nms_threshold)
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// 当前检测器的执行模式
    pub fn mode(&self) -> Option<AccelerationMode> {
        self.current.read().as_ref().map(|loaded| loaded.mode)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn notify(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.events {
            if tx.send(event).is_err() {
                warn!("[DETECTOR] 事件通道已关闭");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ScriptedDetector;
    use image::RgbImage;

    struct FailingLoader;

    impl DetectorLoader for FailingLoader {
        fn load(&self, mode: AccelerationMode) -> AppResult<Box<dyn Detector>> {
            Err(AppError::Detection(format!("模型文件缺失 ({})", mode.as_str())))
        }
    }

    fn blank(width: u32, height: u32) -> DecodedImage {
        DecodedImage { frame_id: 0, image: RgbImage::new(width, height) }
    }

    #[test]
    fn test_detect_before_init_is_unavailable() {
        let handle = DetectorHandle::new();
        assert!(!handle.is_ready());
        let result = handle.detect(&blank(10, 10), 0.3, 0.7);
        assert!(matches!(result, Err(AppError::DetectorUnavailable)));
    }

    #[test]
    fn test_reconfigure_switches_mode() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = DetectorHandle::new().with_events(tx);
        let loader = ScriptedDetector::new(100, 100, vec![Detection::new(0.0, 0.0, 10.0, 10.0, 1, 0.9)]);

        handle.reconfigure(&loader, AccelerationMode::Cpu).unwrap();
        handle.reconfigure(&loader, AccelerationMode::Gpu).unwrap();
        assert_eq!(handle.mode(), Some(AccelerationMode::Gpu));
        assert_eq!(handle.detect(&blank(100, 100), 0.3, 0.7).unwrap().len(), 1);

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events[0], PipelineEvent::DetectorReady { mode: AccelerationMode::Cpu }));
        assert!(matches!(events[1], PipelineEvent::DetectorReady { mode: AccelerationMode::Gpu }));
    }

    #[test]
    fn test_init_failure_reported_once() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = DetectorHandle::new().with_events(tx);

        let result = handle.reconfigure(&FailingLoader, AccelerationMode::Gpu);
        assert!(matches!(result, Err(AppError::DetectorInit(_))));
        assert!(handle.last_error().unwrap().contains("模型文件缺失"));

        // 后续检测只返回错误，不再产生事件
        for _ in 0..3 {
            assert!(matches!(
                handle.detect(&blank(4, 4), 0.3, 0.7),
                Err(AppError::DetectorUnavailable)
            ));
        }
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PipelineEvent::DetectorInitFailed { .. }));
    }
}
