// 标签配色
//
// 颜色只由标签索引决定：以索引为种子的随机数生成器产生 RGB，
// 同一标签在任意周期、任意进程中颜色一致，不需要图例即可区分类别。

use image::Rgba;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn label_color(label: usize, alpha: u8) -> Rgba<u8> {
    let mut rng = StdRng::seed_from_u64(label as u64);
    Rgba([rng.gen(), rng.gen(), rng.gen(), alpha])
}
