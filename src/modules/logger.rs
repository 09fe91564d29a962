use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "info,tower_http=info,hyper=warn,reqwest=warn";
const LOG_FILE_PREFIX: &str = "explore-assistant-relay.log";

/// 初始化日志
///
/// Console output is always on; a daily rolling file is added when
/// `log_dir` is set. The returned guard flushes the file writer and must be
/// kept alive for the lifetime of the process.
pub fn init_logger(log_dir: Option<&Path>, json: bool) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console_layer = if json {
        fmt::layer()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_current_span(false)
            .boxed()
    } else {
        fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_target(false)
            .boxed()
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Failed to create log directory {:?}: {}", dir, e);
                (None, None)
            } else {
                let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .boxed();
                (Some(layer), Some(guard))
            }
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // 已初始化 (测试中重复调用)
        return guard;
    }

    // Route `log` records emitted by dependencies through tracing.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }

    guard
}

pub fn log_info(message: &str) {
    tracing::info!("{}", message);
}

pub fn log_warn(message: &str) {
    tracing::warn!("{}", message);
}

pub fn log_error(message: &str) {
    tracing::error!("{}", message);
}
