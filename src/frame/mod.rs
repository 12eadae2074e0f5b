// 帧数据模块
//
// 描述摄像头推送的原始 YUV 帧，以及解码、旋转后的 RGB 图像。
//
// 子模块：
// - decoder: YUV → RGB 转换与旋转

pub mod decoder;

pub use decoder::decode;

use crate::error::{AppError, AppResult};
use image::RgbImage;

/// 单个图像平面
#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Vec<u8>,
    /// 相邻两行起始位置的字节距离
    pub row_stride: usize,
    /// 同一行相邻两个采样点的字节距离（平面格式为 1，交错格式为 2）
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self { data, row_stride, pixel_stride }
    }

    /// 覆盖 cols x rows 个采样点所需的最小字节数，步长过大导致溢出时返回 None
    pub fn required_len(&self, cols: usize, rows: usize) -> Option<usize> {
        if cols == 0 || rows == 0 {
            return Some(0);
        }
        let last_row = (rows - 1).checked_mul(self.row_stride)?;
        let last_col = (cols - 1).checked_mul(self.pixel_stride)?;
        last_row.checked_add(last_col)?.checked_add(1)
    }

    /// 校验平面能否容纳 cols x rows 个采样点
    pub(crate) fn check(&self, name: &str, cols: usize, rows: usize) -> AppResult<()> {
        if self.pixel_stride == 0 {
            return Err(AppError::InvalidFrame(format!("{} 平面 pixel_stride 为 0", name)));
        }
        let overflow = || {
            AppError::InvalidFrame(format!(
                "{} 平面步长溢出: row_stride={}, pixel_stride={} ({}x{})",
                name, self.row_stride, self.pixel_stride, cols, rows
            ))
        };
        let min_row = cols
            .saturating_sub(1)
            .checked_mul(self.pixel_stride)
            .and_then(|v| v.checked_add(1))
            .ok_or_else(overflow)?;
        if self.row_stride < min_row {
            return Err(AppError::InvalidFrame(format!(
                "{} 平面 row_stride 过小: {} < {}", name, self.row_stride, min_row
            )));
        }
        let required = self.required_len(cols, rows).ok_or_else(overflow)?;
        if self.data.len() < required {
            return Err(AppError::InvalidFrame(format!(
                "{} 平面数据不足: {} < {} ({}x{})", name, self.data.len(), required, cols, rows
            )));
        }
        Ok(())
    }
}

/// 旋转提示（顺时针）
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Default for Rotation {
    fn default() -> Self {
        Self::Deg0
    }
}

impl Rotation {
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// 旋转后宽高是否互换
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl TryFrom<u32> for Rotation {
    type Error = AppError;

    fn try_from(degrees: u32) -> AppResult<Self> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(AppError::InvalidFrame(format!("不支持的旋转角度: {}", other))),
        }
    }
}

/// 摄像头推送的原始帧（YUV 4:2:0）
///
/// 帧在一个周期内由管线独占，周期结束（完成或丢弃）时释放。
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub id: u64,
    /// 采集时间戳（毫秒）
    pub timestamp_ms: i64,
    pub width: u32,
    pub height: u32,
    pub y: Plane,
    /// Cb 平面
    pub u: Plane,
    /// Cr 平面
    pub v: Plane,
    pub rotation: Rotation,
}

impl RawFrame {
    /// 由 I420（Y、U、V 三个独立平面）构建
    pub fn i420(
        id: u64,
        width: u32,
        height: u32,
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
        rotation: Rotation,
    ) -> Self {
        let chroma_stride = (width as usize + 1) / 2;
        Self {
            id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            width,
            height,
            y: Plane::new(y, width as usize, 1),
            u: Plane::new(u, chroma_stride, 1),
            v: Plane::new(v, chroma_stride, 1),
            rotation,
        }
    }

    /// 由 NV21（Y 平面 + VU 交错平面）构建
    ///
    /// VU 缓冲区中 V 在前，U 在后；拆成两个 pixel_stride 为 2 的平面，
    /// 解码时按平面身份取值，不依赖交错顺序。
    pub fn nv21(id: u64, width: u32, height: u32, y: Vec<u8>, vu: Vec<u8>, rotation: Rotation) -> Self {
        let chroma_row = ((width as usize + 1) / 2) * 2;
        let u = vu.get(1..).map(|s| s.to_vec()).unwrap_or_default();
        Self {
            id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            width,
            height,
            y: Plane::new(y, width as usize, 1),
            u: Plane::new(u, chroma_row, 2),
            v: Plane::new(vu, chroma_row, 2),
            rotation,
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// 色度平面尺寸（向上取整的一半）
    pub fn chroma_size(&self) -> (usize, usize) {
        ((self.width as usize + 1) / 2, (self.height as usize + 1) / 2)
    }
}

/// 解码并旋转后的 RGB 图像，方向与显示一致
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub frame_id: u64,
    pub image: RgbImage,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
