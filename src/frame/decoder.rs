// 帧解码模块
//
// 将 YUV 4:2:0 原始帧直接转换为 RGB（全范围 BT.601，与 JPEG/JFIF 相同的矩阵），
// 然后按旋转提示旋转，使检测与显示共享同一方向。

use super::{DecodedImage, RawFrame, Rotation};
use crate::error::{AppError, AppResult};
use image::{imageops, RgbImage};
use rayon::prelude::*;
use tracing::trace;

// 16 位定点系数
const CR_TO_R: i32 = 91_881; // 1.402
const CB_TO_G: i32 = 22_554; // 0.344136
const CR_TO_G: i32 = 46_802; // 0.714136
const CB_TO_B: i32 = 116_130; // 1.772
const ROUND: i32 = 1 << 15;

/// 解码原始帧
///
/// 纯函数：相同输入得到相同输出。平面尺寸与声明的宽高不一致时返回 `InvalidFrame`，
/// 调用方应丢弃该帧并继续处理后续帧。
pub fn decode(frame: &RawFrame) -> AppResult<DecodedImage> {
    validate(frame)?;

    let width = frame.width as usize;
    let height = frame.height as usize;
    let mut rgb = vec![0u8; width * height * 3];

    // 按行并行转换
    rgb.par_chunks_mut(width * 3)
        .enumerate()
        .for_each(|(row, out)| convert_row(frame, row, out));

    let image = RgbImage::from_raw(frame.width, frame.height, rgb)
        .ok_or_else(|| AppError::InvalidFrame("RGB 缓冲区尺寸不匹配".to_string()))?;

    let image = match frame.rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => imageops::rotate90(&image),
        Rotation::Deg180 => imageops::rotate180(&image),
        Rotation::Deg270 => imageops::rotate270(&image),
    };

    trace!("[DECODER] 帧 {} 解码完成: {}x{} 旋转 {}° → {}x{}",
        frame.id, frame.width, frame.height, frame.rotation.degrees(),
        image.width(), image.height());

    Ok(DecodedImage { frame_id: frame.id, image })
}

/// 校验宽高与各平面的尺寸
fn validate(frame: &RawFrame) -> AppResult<()> {
    if frame.width == 0 || frame.height == 0 {
        return Err(AppError::InvalidFrame(format!(
            "帧尺寸无效: {}x{}", frame.width, frame.height
        )));
    }

    let (chroma_w, chroma_h) = frame.chroma_size();
    frame.y.check("Y", frame.width as usize, frame.height as usize)?;
    frame.u.check("U", chroma_w, chroma_h)?;
    frame.v.check("V", chroma_w, chroma_h)?;
    Ok(())
}

fn convert_row(frame: &RawFrame, row: usize, out: &mut [u8]) {
    let y_row = row * frame.y.row_stride;
    let u_row = (row / 2) * frame.u.row_stride;
    let v_row = (row / 2) * frame.v.row_stride;

    for (col, px) in out.chunks_exact_mut(3).enumerate() {
        let luma = frame.y.data[y_row + col * frame.y.pixel_stride] as i32;
        let cb = frame.u.data[u_row + (col / 2) * frame.u.pixel_stride] as i32 - 128;
        let cr = frame.v.data[v_row + (col / 2) * frame.v.pixel_stride] as i32 - 128;

        px[0] = clamp_u8(luma + ((CR_TO_R * cr + ROUND) >> 16));
        px[1] = clamp_u8(luma - ((CB_TO_G * cb + CR_TO_G * cr + ROUND) >> 16));
        px[2] = clamp_u8(luma + ((CB_TO_B * cb + ROUND) >> 16));
    }
}

#[inline]
fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
