// 叠加层渲染
//
// 缩放策略：两个轴独立拉伸，scale_x = 叠加层宽 / 检测图像宽，scale_y = 叠加层高 / 检测图像高，
// 坐标四舍五入到整数像素，不做裁剪或留黑边补偿。
// 标签策略：文字画在检测框左上角的上方；框贴近顶边放不下时改画在框内。
// 每个周期生成全新的画布，不与上一周期叠加。

use super::font;
use super::palette::label_color;
use crate::config::OverlayConfig;
use crate::detection::Detection;
use crate::error::{AppError, AppResult};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::{trace, warn};

/// 按叠加层宽度换算后的绘制参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub stroke_alpha: u8,
    /// 边框线宽（像素，向框内加粗）
    pub stroke_width: u32,
    /// 字体整数缩放倍数
    pub text_scale: u32,
    /// 标签与边框顶边的间距
    pub label_gap: i32,
}

impl OverlayStyle {
    pub fn for_width(config: &OverlayConfig, overlay_width: u32) -> Self {
        let ratio = overlay_width as f32 / config.reference_width.max(1) as f32;
        let stroke = (config.stroke_width * ratio).round().max(1.0) as u32;
        let text_px = config.text_size * ratio;
        // 字形 7 行加 1 行留白
        let text_scale = (text_px / (font::GLYPH_HEIGHT + 1) as f32).round().max(1.0) as u32;
        Self {
            stroke_alpha: config.stroke_alpha,
            stroke_width: stroke,
            text_scale,
            label_gap: config.label_gap,
        }
    }
}

/// 已绘制的检测框（显示坐标系）
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBox {
    /// [left, top, right, bottom]，含端点；超出画布的边被夹到画布外一个线宽处
    pub rect: [i32; 4],
    pub color: Rgba<u8>,
    pub label: String,
    /// 标签文字左上角
    pub label_origin: (i32, i32),
}

/// 单个周期的叠加层
#[derive(Debug, Clone)]
pub struct OverlayRaster {
    pub image: RgbaImage,
    pub boxes: Vec<RenderedBox>,
}

impl OverlayRaster {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// 是否完全透明
    pub fn is_blank(&self) -> bool {
        self.image.pixels().all(|p| p.0[3] == 0)
    }
}

/// 渲染检测结果
pub fn render(
    detections: &[Detection],
    detector_width: u32,
    detector_height: u32,
    overlay_width: u32,
    overlay_height: u32,
    style: &OverlayStyle,
) -> AppResult<OverlayRaster> {
    if detector_width == 0 || detector_height == 0 || overlay_width == 0 || overlay_height == 0 {
        return Err(AppError::RenderFailure(format!(
            "尺寸无效: 检测图像 {}x{}, 叠加层 {}x{}",
            detector_width, detector_height, overlay_width, overlay_height
        )));
    }

    let scale_x = overlay_width as f32 / detector_width as f32;
    let scale_y = overlay_height as f32 / detector_height as f32;

    let mut image = RgbaImage::new(overlay_width, overlay_height);
    let mut boxes = Vec::with_capacity(detections.len());

    for det in detections {
        let Some(rect) = map_box(det, scale_x, scale_y, overlay_width, overlay_height, style.stroke_width) else {
            warn!("[OVERLAY] 跳过非法检测框: {:?}", det);
            continue;
        };

        let color = label_color(det.label, style.stroke_alpha);
        draw_outline(&mut image, rect, style.stroke_width, color);

        let label = label_text(det);
        let label_origin = place_label(rect, &label, style, overlay_width);
        font::draw_text(&mut image, label_origin.0, label_origin.1, &label, style.text_scale, color);

        boxes.push(RenderedBox { rect, color, label, label_origin });
    }

    trace!("[OVERLAY] 渲染 {} 个检测框: {}x{} → {}x{} (scale {:.3}, {:.3})",
        boxes.len(), detector_width, detector_height, overlay_width, overlay_height, scale_x, scale_y);

    Ok(OverlayRaster { image, boxes })
}

/// 检测器坐标 → 显示坐标
///
/// 结果被夹到画布外扩一个线宽的范围内：向内加粗的边框在画布外的部分本来就不可见，
/// 夹取后可见像素不变，后续的整数运算也不会溢出。
fn map_box(det: &Detection, scale_x: f32, scale_y: f32, width: u32, height: u32, stroke: u32) -> Option<[i32; 4]> {
    let coords = [det.x0 * scale_x, det.y0 * scale_y, det.x1 * scale_x, det.y1 * scale_y];
    if coords.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let margin = stroke as f32;
    let max_x = width as f32 - 1.0 + margin;
    let max_y = height as f32 - 1.0 + margin;
    let [x0, y0, x1, y1] = [
        coords[0].round().clamp(-margin, max_x) as i32,
        coords[1].round().clamp(-margin, max_y) as i32,
        coords[2].round().clamp(-margin, max_x) as i32,
        coords[3].round().clamp(-margin, max_y) as i32,
    ];
    Some([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
}

/// "<标签> <置信度>"，标签越界时显示索引
fn label_text(det: &Detection) -> String {
    match det.label_name() {
        Some(name) => format!("{} {:.2}", name, det.score),
        None => format!("#{} {:.2}", det.label, det.score),
    }
}

fn place_label(rect: [i32; 4], label: &str, style: &OverlayStyle, overlay_width: u32) -> (i32, i32) {
    let [left, top, _, _] = rect;
    let text_h = font::text_height(style.text_scale) as i32;
    let text_w = font::text_width(label, style.text_scale) as i32;

    let mut y = top.saturating_sub(style.label_gap).saturating_sub(text_h);
    if y < 0 {
        y = top.saturating_add(style.stroke_width as i32 + 2).max(0);
    }

    let max_x = (overlay_width as i32 - text_w).max(0);
    let x = left.clamp(0, max_x);
    (x, y)
}

/// 向框内逐层加粗的矩形边框
fn draw_outline(image: &mut RgbaImage, rect: [i32; 4], stroke: u32, color: Rgba<u8>) {
    let [left, top, right, bottom] = rect;
    for k in 0..stroke as i32 {
        let w = right - left + 1 - 2 * k;
        let h = bottom - top + 1 - 2 * k;
        if w <= 0 || h <= 0 {
            break;
        }
        let layer = Rect::at(left + k, top + k).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, layer, color);
    }
}
