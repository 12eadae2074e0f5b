// 用户控制项
//
// 阈值、执行模式、摄像头朝向和显示面尺寸都由用户随时修改，管线只在周期开始时读取。
// 两个阈值各自是独立的原子标量，不保证两者之间的一致性：
// 一个周期可能读到一个刚改过的值和一个还没改的值，这是可以接受的。

use crate::config::{check_unit_range, AccelerationMode, AppConfig, CameraFacing};
use crate::error::{AppError, AppResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

/// 周期开始时读取的阈值快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub score: f32,
    pub nms: f32,
}

pub struct Controls {
    score_bits: AtomicU32,
    nms_bits: AtomicU32,
    acceleration: RwLock<AccelerationMode>,
    facing: RwLock<CameraFacing>,
    /// 显示面（预览）尺寸，为空时叠加层与检测图像同尺寸
    surface: RwLock<Option<(u32, u32)>>,
}

impl Controls {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            score_bits: AtomicU32::new(config.detection.score_threshold.to_bits()),
            nms_bits: AtomicU32::new(config.detection.nms_threshold.to_bits()),
            acceleration: RwLock::new(config.acceleration),
            facing: RwLock::new(config.camera.facing),
            surface: RwLock::new(None),
        }
    }

    pub fn score_threshold(&self) -> f32 {
        f32::from_bits(self.score_bits.load(Ordering::Relaxed))
    }

    pub fn set_score_threshold(&self, value: f32) -> AppResult<()> {
        check_unit_range("score_threshold", value)?;
        self.score_bits.store(value.to_bits(), Ordering::Relaxed);
        info!("[CONTROLS] 置信度阈值: {:.2}", value);
        Ok(())
    }

    pub fn nms_threshold(&self) -> f32 {
        f32::from_bits(self.nms_bits.load(Ordering::Relaxed))
    }

    pub fn set_nms_threshold(&self, value: f32) -> AppResult<()> {
        check_unit_range("nms_threshold", value)?;
        self.nms_bits.store(value.to_bits(), Ordering::Relaxed);
        info!("[CONTROLS] NMS 阈值: {:.2}", value);
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            score: self.score_threshold(),
            nms: self.nms_threshold(),
        }
    }

    pub fn acceleration(&self) -> AccelerationMode {
        *self.acceleration.read()
    }

    /// 修改执行模式，返回是否发生变化；调用方随后需要重新配置检测器
    pub fn set_acceleration(&self, mode: AccelerationMode) -> bool {
        let mut current = self.acceleration.write();
        if *current == mode {
            return false;
        }
        info!("[CONTROLS] 执行模式: {} → {}", current.as_str(), mode.as_str());
        *current = mode;
        true
    }

    pub fn facing(&self) -> CameraFacing {
        *self.facing.read()
    }

    pub fn set_facing(&self, facing: CameraFacing) {
        *self.facing.write() = facing;
    }

    /// 切换前后摄像头，返回切换后的朝向
    pub fn toggle_facing(&self) -> CameraFacing {
        let mut facing = self.facing.write();
        *facing = facing.toggled();
        info!("[CONTROLS] 摄像头朝向: {:?}", *facing);
        *facing
    }

    pub fn surface_size(&self) -> Option<(u32, u32)> {
        *self.surface.read()
    }

    pub fn set_surface_size(&self, width: u32, height: u32) -> AppResult<()> {
        if width == 0 || height == 0 {
            return Err(AppError::InvalidArgument(format!(
                "显示面尺寸无效: {}x{}", width, height
            )));
        }
        *self.surface.write() = Some((width, height));
        Ok(())
    }

    pub fn clear_surface_size(&self) {
        *self.surface.write() = None;
    }
}
