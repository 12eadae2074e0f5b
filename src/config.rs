// 配置管理模块
//
// 配置文件只在启动时读取一次，运行期间的修改仅保存在内存中，不会写回磁盘。

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::fs;
use crate::error::{AppError, AppResult};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{info, warn};

static CONFIG: OnceCell<RwLock<AppConfig>> = OnceCell::new();

/// 加速模式（检测器执行后端）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccelerationMode {
    /// 仅使用 CPU
    Cpu,
    /// 使用 GPU 加速
    Gpu,
}

impl Default for AccelerationMode {
    fn default() -> Self {
        Self::Cpu
    }
}

impl AccelerationMode {
    /// 展示层使用的短标签
    pub fn as_str(&self) -> &'static str {
        match self {
            AccelerationMode::Cpu => "CPU",
            AccelerationMode::Gpu => "GPU",
        }
    }
}

/// 摄像头朝向
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    Back,
    Front,
}

impl Default for CameraFacing {
    fn default() -> Self {
        Self::Back
    }
}

impl CameraFacing {
    pub fn toggled(self) -> Self {
        match self {
            CameraFacing::Back => CameraFacing::Front,
            CameraFacing::Front => CameraFacing::Back,
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    /// 转换为 tracing 过滤器字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// 检测阈值配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 置信度阈值 (0.0 - 1.0)
    pub score_threshold: f32,
    /// NMS 阈值 (0.0 - 1.0)，原样透传给检测器
    pub nms_threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.3,
            nms_threshold: 0.7,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> AppResult<()> {
        check_unit_range("score_threshold", self.score_threshold)?;
        check_unit_range("nms_threshold", self.nms_threshold)
    }
}

/// 阈值必须落在 [0, 1] 区间内
pub(crate) fn check_unit_range(name: &str, value: f32) -> AppResult<()> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(AppError::InvalidArgument(format!(
            "{} 必须在 [0, 1] 区间内: {}", name, value
        )));
    }
    Ok(())
}

/// 摄像头配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub facing: CameraFacing,
    /// 传感器输出宽度（旋转前）
    pub width: u32,
    /// 传感器输出高度（旋转前）
    pub height: u32,
    /// 帧率
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing: CameraFacing::Back,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// 叠加层绘制参数
///
/// 线宽和字号都以 `reference_width` 为基准按叠加层宽度等比缩放。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// 边框和文字的不透明度 (0 - 255)
    pub stroke_alpha: u8,
    pub reference_width: u32,
    /// 基准宽度下的边框线宽（像素）
    pub stroke_width: f32,
    /// 基准宽度下的文字高度（像素）
    pub text_size: f32,
    /// 标签底边与边框顶边的间距（像素）
    pub label_gap: i32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            stroke_alpha: 200,
            reference_width: 800,
            stroke_width: 4.0,
            text_size: 40.0,
            label_gap: 10,
        }
    }
}

/// 帧率统计配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// 周期耗时为 0 时返回的帧率
    pub fallback_fps: f32,
    /// 指数平滑系数 (0, 1]，为空时使用单周期原始值
    pub smoothing: Option<f32>,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            fallback_fps: 0.0,
            smoothing: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub acceleration: AccelerationMode,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub rate: RateConfig,
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            acceleration: AccelerationMode::default(),
            camera: CameraConfig::default(),
            overlay: OverlayConfig::default(),
            rate: RateConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

/// 从文件读取配置，文件不存在时返回默认配置
pub fn load_config(config_path: &Path) -> AppResult<AppConfig> {
    if !config_path.exists() {
        info!("[CONFIG] 配置文件不存在，使用默认配置: {}", config_path.display());
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(config_path)?;
    let config: AppConfig = serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!("[CONFIG] 配置文件 JSON 解析失败: {}，使用默认配置", e);
        AppConfig::default()
    });

    if let Err(e) = config.detection.validate() {
        warn!("[CONFIG] 检测阈值无效: {}，使用默认阈值", e);
        return Ok(AppConfig {
            detection: DetectionConfig::default(),
            ..config
        });
    }

    Ok(config)
}

/// 初始化全局配置
pub fn init_config(config_path: &Path) -> AppResult<()> {
    let config = load_config(config_path)?;

    info!("[CONFIG] 配置已加载: 置信度={}, NMS={}, 加速={:?}",
        config.detection.score_threshold, config.detection.nms_threshold, config.acceleration);

    CONFIG.set(RwLock::new(config))
        .map_err(|_| AppError::Config("配置已初始化".to_string()))?;

    Ok(())
}

/// 获取配置
pub fn get_config() -> AppConfig {
    CONFIG.get()
        .map(|c| c.read().clone())
        .unwrap_or_default()
}

/// 更新内存中的配置（不持久化）
pub fn update_config(config: AppConfig) -> AppResult<()> {
    config.detection.validate()?;
    info!("[CONFIG] 配置更新");

    match CONFIG.get() {
        Some(lock) => {
            *lock.write() = config;
            Ok(())
        }
        None => Err(AppError::Config("配置尚未初始化".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.detection.score_threshold, 0.3);
        assert_eq!(config.detection.nms_threshold, 0.7);
        assert_eq!(config.acceleration, AccelerationMode::Cpu);
        // 只读，不会生成文件
        assert!(!dir.path().join("config.json").exists());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"acceleration":"gpu","camera":{"width":320,"fps":15}}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.acceleration, AccelerationMode::Gpu);
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.camera.height, 480);
        assert_eq!(config.camera.facing, CameraFacing::Back);
        assert_eq!(config.overlay.stroke_alpha, 200);
    }

    #[test]
    fn test_invalid_thresholds_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"detection":{"score_threshold":1.5,"nms_threshold":0.4}}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.detection.score_threshold, 0.3);
        assert_eq!(config.detection.nms_threshold, 0.7);
    }

    #[test]
    fn test_validate_rejects_nan() {
        let config = DetectionConfig { score_threshold: f32::NAN, nms_threshold: 0.5 };
        assert!(matches!(config.validate(), Err(AppError::InvalidArgument(_))));
    }
}
