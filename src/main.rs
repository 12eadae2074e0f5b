// CamDet - 实时相机目标检测叠加管线
// 命令行入口：测试摄像头 → 检测管线 → 叠加层快照

mod cli;

use camdet::camera::{FrameSource, SyntheticCamera};
use camdet::config::{self, AppConfig};
use camdet::controls::Controls;
use camdet::detection::{Detection, DetectorHandle, ScriptedDetector};
use camdet::error::{AppError, AppResult, DropReason};
use camdet::frame::Rotation;
use camdet::logging;
use camdet::pipeline::{CycleReport, DetectorStatus, DisplayState, GateStats, Pipeline, PipelineEvent};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// 获取应用数据目录（项目目录下的 data 文件夹）
fn get_app_data_dir() -> PathBuf {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            // 开发模式下，exe 在 target/debug 或 target/release，回到项目根目录
            let in_target = ["debug", "release"].iter().any(|profile| {
                exe_dir.ends_with(Path::new("target").join(profile))
            });
            let data_dir = if in_target {
                exe_dir
                    .parent()
                    .and_then(|p| p.parent())
                    .map(|p| p.join("data"))
                    .unwrap_or_else(|| exe_dir.join("data"))
            } else {
                exe_dir.join("data")
            };
            return data_dir;
        }
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("data")
}

/// 内置演示检测框，坐标基于后置摄像头旋转后的 480x640 图像
fn demo_detector() -> ScriptedDetector {
    ScriptedDetector::new(
        480,
        640,
        vec![
            Detection::new(60.0, 120.0, 300.0, 560.0, 0, 0.91),
            Detection::new(280.0, 380.0, 460.0, 600.0, 16, 0.64),
            Detection::new(20.0, 10.0, 140.0, 90.0, 56, 0.22),
        ],
    )
}

/// 每个完成周期的状态行
fn cycle_line(view: &DisplayState, report: &CycleReport) -> String {
    format!(
        "{} | {} | 帧 {} | {} 个目标",
        view.mode_text(),
        view.fps_text(),
        report.frame_id,
        report.detections.len()
    )
}

/// 退出前的汇总
fn summary_line(view: &DisplayState, stats: GateStats) -> String {
    format!(
        "完成 {} 个周期, 放行 {} 帧, 闸门丢弃 {} 帧, 无效帧 {}, 检测失败 {}, 最近帧率 {}",
        view.completed(),
        stats.admitted,
        stats.dropped,
        view.dropped(DropReason::InvalidFrame),
        view.dropped(DropReason::DetectorError),
        view.fps_text()
    )
}

fn main() {
    let args = cli::Args::parse();
    let app_dir = get_app_data_dir();
    let config_path = args.config.clone().unwrap_or_else(|| app_dir.join("config.json"));

    // 日志级别来自配置文件，初始化日志前先读一次
    let log_level = config::load_config(&config_path)
        .map(|c| c.log_level)
        .unwrap_or_default();
    let log_dir = args.log_dir.clone().unwrap_or_else(|| app_dir.join("logs"));

    // guard 必须保持存活，否则异步日志线程会退出
    let _log_guard = logging::init_logging(&log_dir, &log_level);

    info!("CamDet 启动中...");
    info!("数据目录: {:?}", app_dir);

    if let Err(e) = run(&args, &config_path) {
        error!("运行失败: {}", e);
        eprintln!("运行失败: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &cli::Args, config_path: &Path) -> AppResult<()> {
    config::init_config(config_path)?;
    let mut app_config: AppConfig = config::get_config();
    args.apply(&mut app_config)?;
    config::update_config(app_config.clone())?;

    // 色彩转换的行并行，留一个核给摄像头和展示线程
    let threads = num_cpus::get().saturating_sub(1).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("camdet-decode-{}", i))
        .build_global()
        .map_err(|e| AppError::Config(format!("线程池初始化失败: {}", e)))?;
    info!("CPU 线程: {}, 解码线程: {}", num_cpus::get(), threads);

    let controls = Arc::new(Controls::from_config(&app_config));
    if let Some((width, height)) = args.surface {
        controls.set_surface_size(width, height)?;
    }

    let (events_tx, events_rx) = crossbeam_channel::unbounded::<PipelineEvent>();
    let detector = Arc::new(DetectorHandle::new().with_events(events_tx.clone()));

    let loader = match args.detections {
        Some(ref path) => ScriptedDetector::from_json_file(path)?,
        None => demo_detector(),
    }
    .with_latency(Duration::from_millis(args.latency_ms));

    // 初始化失败通过事件上报一次，管线照常运行，周期以"检测器未就绪"丢弃
    if let Err(e) = detector.reconfigure(&loader, controls.acceleration()) {
        warn!("检测器不可用: {}", e);
    }

    let pipeline = Arc::new(Pipeline::start(
        detector.clone(),
        controls.clone(),
        &app_config,
        events_tx,
    )?);

    let mut camera = SyntheticCamera::new(&app_config.camera);
    if let Some(degrees) = args.rotation {
        camera = camera.with_rotation(Rotation::try_from(degrees)?);
    }

    let snapshots = args.snapshot_every > 0;
    if snapshots {
        std::fs::create_dir_all(&args.output_dir)?;
    }

    let sink_pipeline = pipeline.clone();
    camera.start(Arc::new(move |frame| {
        sink_pipeline.on_frame(frame);
    }))?;

    let mut view = DisplayState::new();
    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    let mut saved = 0u64;

    while view.completed() < args.frames {
        if Instant::now() >= deadline {
            warn!("运行超时: {} 秒内完成 {} 个周期", args.timeout_secs, view.completed());
            break;
        }
        let event = match events_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if !view.apply(event) {
            continue;
        }
        let Some(report) = view.latest() else { continue };

        info!("[DISPLAY] {}", cycle_line(&view, report));

        if snapshots && report.cycle % args.snapshot_every == 0 {
            let path = args.output_dir.join(format!("overlay_{:05}.png", report.cycle));
            report.overlay.image.save(&path)?;
            saved += 1;
        }
    }

    camera.stop();
    let stats = pipeline.gate().stats();
    drop(pipeline);

    if let DetectorStatus::Failed { message, .. } = view.status() {
        warn!("检测器初始化失败: {}", message);
    }
    info!("运行结束: {}", summary_line(&view, stats));
    if snapshots {
        info!("已保存 {} 张叠加层快照到 {:?}", saved, args.output_dir);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camdet::config::AccelerationMode;
    use camdet::overlay::OverlayRaster;
    use image::RgbaImage;

    fn report(cycle: u64, fps: f32) -> CycleReport {
        CycleReport {
            cycle,
            frame_id: cycle + 10,
            detections: vec![Detection::new(0.0, 0.0, 4.0, 4.0, 0, 0.9); 2],
            overlay: OverlayRaster { image: RgbaImage::new(4, 4), boxes: vec![] },
            fps,
            detector_size: (4, 4),
            started_at_ms: 0,
            finished_at_ms: 40,
        }
    }

    #[test]
    fn test_status_lines_read_display_state() {
        let mut view = DisplayState::new();
        view.apply(PipelineEvent::DetectorReady { mode: AccelerationMode::Gpu });
        view.apply(PipelineEvent::CycleComplete(report(1, 25.0)));
        view.apply(PipelineEvent::FrameDropped {
            frame_id: 12,
            reason: DropReason::InvalidFrame,
            message: String::new(),
        });

        let latest = view.latest().unwrap();
        assert_eq!(cycle_line(&view, latest), "GPU | 25.0 FPS | 帧 11 | 2 个目标");

        let stats = GateStats { admitted: 2, dropped: 7 };
        assert_eq!(
            summary_line(&view, stats),
            "完成 1 个周期, 放行 2 帧, 闸门丢弃 7 帧, 无效帧 1, 检测失败 0, 最近帧率 25.0 FPS"
        );
    }
}
