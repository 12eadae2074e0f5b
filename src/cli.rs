// 命令行参数

use camdet::config::{AccelerationMode, AppConfig, CameraFacing};
use camdet::error::AppResult;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// 用测试摄像头驱动检测管线，并把叠加层快照写成 PNG
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// 配置文件路径（默认为数据目录下的 config.json）
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// 日志目录（默认为数据目录下的 logs）
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
    /// 完成多少个周期后退出
    #[arg(long, default_value_t = 100)]
    pub frames: u64,
    /// 传感器输出宽度
    #[arg(long)]
    pub width: Option<u32>,
    /// 传感器输出高度
    #[arg(long)]
    pub height: Option<u32>,
    /// 摄像头帧率
    #[arg(long)]
    pub fps: Option<u32>,
    /// 旋转提示（0/90/180/270），默认由朝向决定
    #[arg(long)]
    pub rotation: Option<u32>,
    #[arg(long, value_enum)]
    pub facing: Option<FacingArg>,
    /// 显示面尺寸，例如 1080x1920；默认与检测图像相同
    #[arg(long, value_parser = parse_size)]
    pub surface: Option<(u32, u32)>,
    /// 使用 GPU 执行模式
    #[arg(long, default_value_t = false)]
    pub gpu: bool,
    /// 置信度阈值
    #[arg(long)]
    pub score: Option<f32>,
    /// NMS 阈值
    #[arg(long)]
    pub nms: Option<f32>,
    /// 检测脚本 JSON；不指定时使用内置的演示检测框
    #[arg(long)]
    pub detections: Option<PathBuf>,
    /// 模拟推理耗时（毫秒）
    #[arg(long, default_value_t = 30)]
    pub latency_ms: u64,
    /// 叠加层快照输出目录
    #[arg(long, default_value = "overlays")]
    pub output_dir: PathBuf,
    /// 每隔多少个周期保存一张快照，0 表示不保存
    #[arg(long, default_value_t = 10)]
    pub snapshot_every: u64,
    /// 最长运行时间（秒）
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingArg {
    Back,
    Front,
}

impl From<FacingArg> for CameraFacing {
    fn from(arg: FacingArg) -> Self {
        match arg {
            FacingArg::Back => CameraFacing::Back,
            FacingArg::Front => CameraFacing::Front,
        }
    }
}

impl Args {
    /// 用命令行参数覆盖配置
    pub fn apply(&self, config: &mut AppConfig) -> AppResult<()> {
        if let Some(width) = self.width {
            config.camera.width = width;
        }
        if let Some(height) = self.height {
            config.camera.height = height;
        }
        if let Some(fps) = self.fps {
            config.camera.fps = fps;
        }
        if let Some(facing) = self.facing {
            config.camera.facing = facing.into();
        }
        if self.gpu {
            config.acceleration = AccelerationMode::Gpu;
        }
        if let Some(score) = self.score {
            config.detection.score_threshold = score;
        }
        if let Some(nms) = self.nms {
            config.detection.nms_threshold = nms;
        }
        config.detection.validate()
    }
}

/// 解析 "宽x高"
fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("尺寸格式应为 宽x高: {}", value))?;
    let width: u32 = w.trim().parse().map_err(|e| format!("宽度无效 {}: {}", w, e))?;
    let height: u32 = h.trim().parse().map_err(|e| format!("高度无效 {}: {}", h, e))?;
    if width == 0 || height == 0 {
        return Err(format!("尺寸不能为 0: {}", value));
    }
    Ok((width, height))
}
