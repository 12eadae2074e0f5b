// 检测线程与帧入口
//
// on_frame 在帧回调线程上调用，只做闸门检查和投递，不做任何耗时工作。
// 被放行的帧连同周期守卫一起交给唯一的检测线程；守卫在结果发布后析构，
// 因此无论周期成功还是出错，闸门都会被释放。周期内的 panic（通常来自检测器）被捕获，
// 按检测失败丢弃该帧，检测线程继续服务后续帧。release 构建使用 panic = "abort"，不经过这里。

use super::gate::{CycleGuard, DetectionGate};
use super::rate::RateTracker;
use super::{CycleReport, PipelineEvent};
use crate::config::{AppConfig, OverlayConfig};
use crate::controls::Controls;
use crate::detection::DetectorHandle;
use crate::error::{AppError, AppResult, DropReason};
use crate::frame::{decode, RawFrame};
use crate::overlay::{render, OverlayStyle};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// 帧的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// 已交给检测线程
    Admitted,
    Dropped(DropReason),
}

struct CycleJob {
    frame: RawFrame,
    guard: CycleGuard,
    started_at_ms: i64,
}

pub struct Pipeline {
    gate: Arc<DetectionGate>,
    jobs: Option<Sender<CycleJob>>,
    worker: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// 启动检测线程
    pub fn start(
        detector: Arc<DetectorHandle>,
        controls: Arc<Controls>,
        config: &AppConfig,
        events: Sender<PipelineEvent>,
    ) -> AppResult<Self> {
        let gate = Arc::new(DetectionGate::new());
        // 闸门保证同一时刻最多一个任务在途
        let (jobs_tx, jobs_rx) = crossbeam_channel::bounded::<CycleJob>(1);

        let worker = CycleWorker {
            detector,
            controls,
            overlay: config.overlay.clone(),
            rate: RateTracker::from_config(&config.rate),
            events,
            cycles: 0,
        };

        let handle = std::thread::Builder::new()
            .name("camdet-cycle".to_string())
            .spawn(move || worker.run(jobs_rx))?;

        info!("[PIPELINE] 管线已启动");
        Ok(Self {
            gate,
            jobs: Some(jobs_tx),
            worker: Some(handle),
        })
    }

    /// 帧回调入口
    ///
    /// 上一周期未结束时立即丢弃；无论放行与否都不会阻塞调用线程。
    pub fn on_frame(&self, frame: RawFrame) -> FrameDisposition {
        let Some(guard) = self.gate.try_enter() else {
            trace!("[GATE] 周期进行中，丢弃帧 {}", frame.id);
            return FrameDisposition::Dropped(DropReason::Busy);
        };

        let Some(ref jobs) = self.jobs else {
            return FrameDisposition::Dropped(DropReason::PipelineClosed);
        };

        let frame_id = frame.id;
        let job = CycleJob {
            frame,
            guard,
            started_at_ms: chrono::Utc::now().timestamp_millis(),
        };

        // 发送失败时任务随错误一起析构，守卫随之释放闸门
        match jobs.try_send(job) {
            Ok(()) => FrameDisposition::Admitted,
            Err(TrySendError::Full(_)) => {
                warn!("[PIPELINE] 任务槽已满，丢弃帧 {}", frame_id);
                FrameDisposition::Dropped(DropReason::Busy)
            }
            Err(TrySendError::Disconnected(_)) => {
                error!("[PIPELINE] 检测线程已退出，丢弃帧 {}", frame_id);
                FrameDisposition::Dropped(DropReason::PipelineClosed)
            }
        }
    }

    pub fn gate(&self) -> &Arc<DetectionGate> {
        &self.gate
    }

    /// 停止检测线程；进行中的周期会先运行完
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("[PIPELINE] 检测线程异常退出");
            }
            let stats = self.gate.stats();
            info!("[PIPELINE] 管线已停止: 放行 {} 帧, 丢弃 {} 帧", stats.admitted, stats.dropped);
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

struct CycleWorker {
    detector: Arc<DetectorHandle>,
    controls: Arc<Controls>,
    overlay: OverlayConfig,
    rate: RateTracker,
    events: Sender<PipelineEvent>,
    cycles: u64,
}

impl CycleWorker {
    fn run(mut self, jobs: Receiver<CycleJob>) {
        debug!("[PIPELINE] 检测线程开始");
        for job in jobs.iter() {
            self.handle(job);
        }
        debug!("[PIPELINE] 检测线程结束，共完成 {} 个周期", self.cycles);
    }

    fn handle(&mut self, job: CycleJob) {
        let CycleJob { frame, guard, started_at_ms } = job;
        let frame_id = frame.id;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle(frame, started_at_ms)))
            .unwrap_or_else(|payload| {
                error!("[PIPELINE] 帧 {} 的周期异常终止: {}", frame_id, panic_message(&*payload));
                Err(AppError::Detection(format!("周期异常终止: {}", panic_message(&*payload))))
            });

        let event = match outcome {
            Ok(report) => PipelineEvent::CycleComplete(report),
            Err(e) => {
                let reason = e.drop_reason();
                match reason {
                    DropReason::DetectorUnavailable => debug!("[PIPELINE] 检测器未就绪，跳过帧 {}", frame_id),
                    _ => warn!("[PIPELINE] 帧 {} 处理失败: {}", frame_id, e),
                }
                debug_assert!(
                    reason != DropReason::RenderFailure,
                    "叠加层渲染失败: {}", e
                );
                PipelineEvent::FrameDropped {
                    frame_id,
                    reason,
                    message: e.to_string(),
                }
            }
        };

        self.publish(event);
        drop(guard);
    }

    fn run_cycle(&mut self, frame: RawFrame, started_at_ms: i64) -> AppResult<CycleReport> {
        // 每个周期开始时读取一次阈值
        let thresholds = self.controls.thresholds();

        let decoded = decode(&frame)?;
        drop(frame);

        let detections = self.detector.detect(&decoded, thresholds.score, thresholds.nms)?;

        let detector_size = (decoded.width(), decoded.height());
        let (overlay_width, overlay_height) = self.controls.surface_size().unwrap_or(detector_size);
        let style = OverlayStyle::for_width(&self.overlay, overlay_width);
        let overlay = render(
            &detections,
            detector_size.0,
            detector_size.1,
            overlay_width,
            overlay_height,
            &style,
        )?;

        let finished_at_ms = chrono::Utc::now().timestamp_millis();
        let fps = self.rate.record_cycle(started_at_ms, finished_at_ms);
        self.cycles += 1;

        debug!("[PIPELINE] 周期 {} 完成: 帧 {}, {} 个目标, {}ms, {:.1} FPS",
            self.cycles, decoded.frame_id, detections.len(), finished_at_ms - started_at_ms, fps);

        Ok(CycleReport {
            cycle: self.cycles,
            frame_id: decoded.frame_id,
            detections,
            overlay,
            fps,
            detector_size,
            started_at_ms,
            finished_at_ms,
        })
    }

    fn publish(&self, event: PipelineEvent) {
        if self.events.send(event).is_err() {
            trace!("[PIPELINE] 展示端已关闭，结果被丢弃");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("未知错误")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detection, ScriptedDetector};
    use crate::frame::Rotation;
    use std::time::Duration;

    fn gray_frame(id: u64, width: u32, height: u32) -> RawFrame {
        let luma = (width * height) as usize;
        let chroma = (((width + 1) / 2) * ((height + 1) / 2)) as usize;
        RawFrame::i420(id, width, height, vec![100; luma], vec![128; chroma], vec![128; chroma], Rotation::Deg0)
    }

    fn start(detector: Arc<DetectorHandle>) -> (Pipeline, Arc<Controls>, Receiver<PipelineEvent>) {
        let config = AppConfig::default();
        let controls = Arc::new(Controls::from_config(&config));
        let (tx, rx) = crossbeam_channel::unbounded();
        let pipeline = Pipeline::start(detector, controls.clone(), &config, tx).unwrap();
        (pipeline, controls, rx)
    }

    #[test]
    fn test_single_cycle_publishes_report() {
        let detector = Arc::new(DetectorHandle::new());
        let scripted = ScriptedDetector::new(64, 48, vec![Detection::new(8.0, 8.0, 32.0, 24.0, 0, 0.9)]);
        detector.reconfigure(&scripted, crate::config::AccelerationMode::Cpu).unwrap();

        let (pipeline, controls, rx) = start(detector);
        controls.set_surface_size(128, 96).unwrap();

        assert_eq!(pipeline.on_frame(gray_frame(1, 64, 48)), FrameDisposition::Admitted);
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            PipelineEvent::CycleComplete(report) => {
                assert_eq!(report.frame_id, 1);
                assert_eq!(report.detector_size, (64, 48));
                assert_eq!((report.overlay.width(), report.overlay.height()), (128, 96));
                assert_eq!(report.overlay.boxes[0].rect, [16, 16, 64, 48]);
            }
            other => panic!("意外事件: {:?}", other),
        }
        pipeline.shutdown();
    }

    #[test]
    fn test_invalid_frame_releases_gate() {
        let detector = Arc::new(DetectorHandle::new());
        detector.reconfigure(&ScriptedDetector::new(8, 8, vec![]), crate::config::AccelerationMode::Cpu).unwrap();
        let (pipeline, _controls, rx) = start(detector);

        let mut bad = gray_frame(5, 16, 16);
        bad.u.data.truncate(10);
        assert_eq!(pipeline.on_frame(bad), FrameDisposition::Admitted);

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            PipelineEvent::FrameDropped { frame_id, reason, .. } => {
                assert_eq!(frame_id, 5);
                assert_eq!(reason, DropReason::InvalidFrame);
            }
            other => panic!("意外事件: {:?}", other),
        }

        // 发布在释放闸门之前，稍等守卫析构
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while pipeline.gate().is_busy() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pipeline.on_frame(gray_frame(6, 16, 16)), FrameDisposition::Admitted);
        assert!(matches!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), PipelineEvent::CycleComplete(_)));
    }

    #[test]
    fn test_uninitialized_detector_skips_cycle() {
        let (pipeline, _controls, rx) = start(Arc::new(DetectorHandle::new()));
        assert_eq!(pipeline.on_frame(gray_frame(9, 8, 8)), FrameDisposition::Admitted);
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            PipelineEvent::FrameDropped { reason, .. } => assert_eq!(reason, DropReason::DetectorUnavailable),
            other => panic!("意外事件: {:?}", other),
        }
    }

    #[test]
    fn test_busy_gate_drops_without_work() {
        let detector = Arc::new(DetectorHandle::new());
        let scripted = ScriptedDetector::new(8, 8, vec![]).with_latency(Duration::from_millis(200));
        detector.reconfigure(&scripted, crate::config::AccelerationMode::Cpu).unwrap();
        let (pipeline, _controls, rx) = start(detector);

        assert_eq!(pipeline.on_frame(gray_frame(1, 8, 8)), FrameDisposition::Admitted);
        for id in 2..6 {
            assert_eq!(pipeline.on_frame(gray_frame(id, 8, 8)), FrameDisposition::Dropped(DropReason::Busy));
        }

        assert!(matches!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), PipelineEvent::CycleComplete(_)));
        pipeline.shutdown();
        assert_eq!(scripted.calls(), 1);
    }

    /// 第一次调用时 panic 的检测器
    struct PanicOnce {
        tripped: std::sync::atomic::AtomicBool,
    }

    impl crate::detection::Detector for PanicOnce {
        fn detect(&self, _image: &crate::frame::DecodedImage, _score: f32, _nms: f32) -> AppResult<Vec<Detection>> {
            if !self.tripped.swap(true, std::sync::atomic::Ordering::SeqCst) {
                panic!("模型推理崩溃");
            }
            Ok(vec![])
        }
    }

    impl crate::detection::DetectorLoader for PanicOnce {
        fn load(&self, _mode: crate::config::AccelerationMode) -> AppResult<Box<dyn crate::detection::Detector>> {
            Ok(Box::new(PanicOnce { tripped: std::sync::atomic::AtomicBool::new(false) }))
        }
    }

    #[test]
    fn test_detector_panic_drops_frame_and_worker_survives() {
        let detector = Arc::new(DetectorHandle::new());
        let loader = PanicOnce { tripped: std::sync::atomic::AtomicBool::new(false) };
        detector.reconfigure(&loader, crate::config::AccelerationMode::Cpu).unwrap();
        let (pipeline, _controls, rx) = start(detector);

        assert_eq!(pipeline.on_frame(gray_frame(1, 8, 8)), FrameDisposition::Admitted);
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            PipelineEvent::FrameDropped { frame_id, reason, message } => {
                assert_eq!(frame_id, 1);
                assert_eq!(reason, DropReason::DetectorError);
                assert!(message.contains("模型推理崩溃"), "{}", message);
            }
            other => panic!("意外事件: {:?}", other),
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while pipeline.gate().is_busy() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pipeline.on_frame(gray_frame(2, 8, 8)), FrameDisposition::Admitted);
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            PipelineEvent::CycleComplete(report) => assert_eq!(report.frame_id, 2),
            other => panic!("意外事件: {:?}", other),
        }
        pipeline.shutdown();
    }
}
