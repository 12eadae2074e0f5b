// CamDet - 日志
//
// 文件日志按天轮转、异步写入；帧回调线程上的 trace 日志只进入过滤器，不做同步 IO。

use crate::config::LogLevel;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const LOG_FILE_PREFIX: &str = "camdet.log";

/// 初始化日志系统
///
/// 返回的 WorkerGuard 析构时才会刷出缓冲的日志，调用方需保持其存活到退出。
pub fn init_logging(log_dir: &Path, log_level: &LogLevel) -> WorkerGuard {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("创建日志目录失败: {}", e);
    }
    remove_expired_logs(log_dir, SystemTime::now());

    let (writer, guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        log_dir,
        LOG_FILE_PREFIX,
    ));

    // RUST_LOG 优先于配置文件
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true)
        .with_target(true);

    // 控制台只在 debug 构建中输出
    let console_layer = cfg!(debug_assertions).then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_thread_names(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}

/// 删除本程序写出的、超过保留期的日志文件
fn remove_expired_logs(log_dir: &Path, now: SystemTime) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    for path in entries.flatten().map(|entry| entry.path()) {
        let ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |name| name.starts_with(LOG_FILE_PREFIX));
        if !ours || !path.is_file() {
            continue;
        }
        if is_expired(&path, now) {
            if let Err(e) = fs::remove_file(&path) {
                eprintln!("删除旧日志文件失败 {:?}: {}", path, e);
            }
        }
    }
}

fn is_expired(path: &Path, now: SystemTime) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| now.duration_since(modified).ok())
        .map_or(false, |age| age > LOG_RETENTION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_expired_own_logs_removed() {
        let dir = tempfile::tempdir().unwrap();
        let ours = dir.path().join("camdet.log.2026-01-01");
        let other = dir.path().join("other.log");
        fs::write(&ours, "x").unwrap();
        fs::write(&other, "x").unwrap();

        remove_expired_logs(dir.path(), SystemTime::now());
        assert!(ours.exists());

        let later = SystemTime::now() + LOG_RETENTION + Duration::from_secs(60);
        remove_expired_logs(dir.path(), later);
        assert!(!ours.exists());
        assert!(other.exists());
    }
}
