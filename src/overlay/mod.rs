// 叠加层模块
//
// 将检测框从检测器图像坐标系映射到显示坐标系，并绘制到透明 RGBA 画布上。
//
// 子模块：
// - renderer: 坐标映射与绘制
// - font: 内置点阵字体
// - palette: 按标签确定的配色

pub mod font;
pub mod palette;
pub mod renderer;

pub use renderer::{render, OverlayRaster, OverlayStyle, RenderedBox};
