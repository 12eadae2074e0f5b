// 错误处理模块

use thiserror::Error;
use serde::Serialize;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("无效帧: {0}")]
    InvalidFrame(String),

    #[error("检测器未就绪")]
    DetectorUnavailable,

    #[error("检测器初始化失败: {0}")]
    DetectorInit(String),

    #[error("目标检测错误: {0}")]
    Detection(String),

    #[error("叠加层渲染错误: {0}")]
    RenderFailure(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("图像编码错误: {0}")]
    Image(#[from] image::ImageError),
}

/// 帧被丢弃的原因（周期边界上由错误转换而来）
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// 上一个周期仍在进行
    Busy,
    InvalidFrame,
    DetectorUnavailable,
    DetectorError,
    RenderFailure,
    /// 工作线程已退出
    PipelineClosed,
}

impl AppError {
    /// 将单帧错误映射为丢帧原因
    pub fn drop_reason(&self) -> DropReason {
        match self {
            AppError::InvalidFrame(_) => DropReason::InvalidFrame,
            AppError::DetectorUnavailable | AppError::DetectorInit(_) => DropReason::DetectorUnavailable,
            AppError::RenderFailure(_) | AppError::Image(_) => DropReason::RenderFailure,
            _ => DropReason::DetectorError,
        }
    }
}

// 实现 Serialize 以便直接传递给展示层
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
