// CamDet - 实时相机目标检测叠加管线
//
// 摄像头帧 → 解码旋转 → 单槽闸门 → 外部检测器 → 叠加层渲染 → 展示端，
// 帧率统计观察每个周期的起止时间。

pub mod camera;
pub mod config;
pub mod controls;
pub mod detection;
pub mod error;
pub mod frame;
pub mod logging;
pub mod overlay;
pub mod pipeline;

pub use error::{AppError, AppResult, DropReason};
