// 帧源模块
//
// 帧源在自己的线程上推送帧，从不等待消费端：消费端忙时帧直接被丢弃，
// 相当于"只保留最新帧"的背压策略。真实摄像头驱动实现同一个 FrameSource 接口。

use crate::config::{CameraConfig, CameraFacing};
use crate::error::{AppError, AppResult};
use crate::frame::{RawFrame, Rotation};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 帧回调，调用方取得帧的所有权，返回即视为已确认
pub type FrameSink = Arc<dyn Fn(RawFrame) + Send + Sync>;

pub trait FrameSource {
    fn start(&mut self, sink: FrameSink) -> AppResult<()>;
    fn stop(&mut self);
}

/// 传感器方向对应的旋转提示
pub fn rotation_for(facing: CameraFacing) -> Rotation {
    match facing {
        CameraFacing::Back => Rotation::Deg90,
        CameraFacing::Front => Rotation::Deg270,
    }
}

/// 测试图案摄像头
///
/// 按配置的尺寸和帧率生成 I420 帧：亮度为随帧号移动的斜向渐变，色度按位置变化。
pub struct SyntheticCamera {
    config: CameraConfig,
    rotation: Rotation,
    max_frames: Option<u64>,
    running: Arc<AtomicBool>,
    delivered: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl SyntheticCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            config: config.clone(),
            rotation: rotation_for(config.facing),
            max_frames: None,
            running: Arc::new(AtomicBool::new(false)),
            delivered: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }

    /// 覆盖朝向推导出的旋转提示
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// 推送指定帧数后自动停止
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 生成一帧测试图案
    pub fn pattern_frame(id: u64, width: u32, height: u32, rotation: Rotation) -> RawFrame {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);
        let shift = (id * 4) as usize;

        let y: Vec<u8> = (0..h)
            .flat_map(|row| (0..w).map(move |col| ((row + col + shift) % 256) as u8))
            .collect();
        let u: Vec<u8> = (0..ch)
            .flat_map(|row| (0..cw).map(move |_| (64 + (row * 128) / ch.max(1)) as u8))
            .collect();
        let v: Vec<u8> = (0..ch)
            .flat_map(|_| (0..cw).map(move |col| (64 + (col * 128) / cw.max(1)) as u8))
            .collect();

        RawFrame::i420(id, width, height, y, u, v, rotation)
    }
}

impl FrameSource for SyntheticCamera {
    fn start(&mut self, sink: FrameSink) -> AppResult<()> {
        if self.is_running() {
            return Err(AppError::InvalidArgument("摄像头已在运行".to_string()));
        }
        if self.config.fps == 0 || self.config.width == 0 || self.config.height == 0 {
            return Err(AppError::Config(format!(
                "摄像头参数无效: {}x{} @ {} fps",
                self.config.width, self.config.height, self.config.fps
            )));
        }

        // 上一次运行已自行结束的线程
        if let Some(previous) = self.thread.take() {
            let _ = previous.join();
        }

        let interval = Duration::from_micros(1_000_000 / self.config.fps as u64);
        let (width, height) = (self.config.width, self.config.height);
        let rotation = self.rotation;
        let max_frames = self.max_frames;
        let running = self.running.clone();
        let delivered = self.delivered.clone();

        running.store(true, Ordering::SeqCst);
        info!("[CAMERA] 启动测试摄像头: {}x{} @ {} fps, 旋转 {}°",
            width, height, self.config.fps, rotation.degrees());

        let handle = std::thread::Builder::new()
            .name("camdet-camera".to_string())
            .spawn(move || {
                let mut next_tick = Instant::now();
                let mut id = 0u64;
                while running.load(Ordering::SeqCst) {
                    id += 1;
                    sink(Self::pattern_frame(id, width, height, rotation));
                    delivered.fetch_add(1, Ordering::SeqCst);

                    if max_frames.map(|max| id >= max).unwrap_or(false) {
                        debug!("[CAMERA] 已推送 {} 帧，自动停止", id);
                        break;
                    }

                    next_tick += interval;
                    let now = Instant::now();
                    if next_tick > now {
                        std::thread::sleep(next_tick - now);
                    } else {
                        // 落后时不追帧
                        next_tick = now;
                    }
                }
                running.store(false, Ordering::SeqCst);
            })?;

        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("[CAMERA] 摄像头线程异常退出");
            }
            info!("[CAMERA] 摄像头已停止，共推送 {} 帧", self.delivered());
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::decode;
    use parking_lot::Mutex;

    #[test]
    fn test_pattern_frame_decodes() {
        let frame = SyntheticCamera::pattern_frame(3, 64, 48, Rotation::Deg90);
        let decoded = decode(&frame).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (48, 64));
    }

    #[test]
    fn test_odd_size_pattern_frame_decodes() {
        let frame = SyntheticCamera::pattern_frame(1, 33, 17, Rotation::Deg0);
        assert!(decode(&frame).is_ok());
    }

    #[test]
    fn test_rotation_follows_facing() {
        assert_eq!(rotation_for(CameraFacing::Back), Rotation::Deg90);
        assert_eq!(rotation_for(CameraFacing::Front), Rotation::Deg270);
    }

    #[test]
    fn test_delivers_max_frames_then_stops() {
        let config = CameraConfig { facing: CameraFacing::Front, width: 16, height: 8, fps: 200 };
        let mut camera = SyntheticCamera::new(&config).with_max_frames(5);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        camera.start(Arc::new(move |frame: RawFrame| {
            sink_seen.lock().push((frame.id, frame.rotation));
        })).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while camera.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        camera.stop();

        let seen = seen.lock();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0], (1, Rotation::Deg270));
        assert_eq!(camera.delivered(), 5);
    }

    #[test]
    fn test_zero_fps_rejected() {
        let config = CameraConfig { fps: 0, ..CameraConfig::default() };
        let mut camera = SyntheticCamera::new(&config);
        assert!(camera.start(Arc::new(|_frame: RawFrame| {})).is_err());
    }
}
