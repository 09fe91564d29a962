mod models;
mod modules;
mod utils;
pub mod proxy;  // 中继服务模块
pub mod error;

use std::sync::Arc;

pub use error::{AppError, AppResult};
pub use models::{RelayConfig, UpstreamProxyConfig};
pub use modules::{load_relay_config, AccessToken, GoogleCredentials, TokenSource};

use modules::logger;

// Token requests go to oauth2.googleapis.com or the metadata server.
const AUTH_CLIENT_TIMEOUT_SECS: u64 = 15;

/// 启动中继服务, 直到收到退出信号
pub async fn run() -> AppResult<()> {
    // 加载配置
    let config = match load_relay_config() {
        Ok(config) => config,
        Err(e) => {
            let _guard = logger::init_logger(None, false);
            logger::log_error(&format!("Failed to load configuration: {}", e));
            return Err(e);
        }
    };

    // 初始化日志
    let _log_guard = logger::init_logger(config.log_dir.as_deref(), config.log_json);
    logger::log_info(&format!(
        "Explore Assistant relay starting (project: {}, region: {}, model: {})",
        config.project, config.region, config.model_name
    ));

    let auth_client =
        utils::http::create_client_with_proxy(AUTH_CLIENT_TIMEOUT_SECS, Some(&config.upstream_proxy));
    let credentials: Arc<dyn TokenSource> = Arc::new(GoogleCredentials::new(auth_client));

    let state = proxy::AppState::from_config(&config, credentials)?;
    let (server, handle) = proxy::AxumServer::start(&config, state).await?;

    shutdown_signal().await;
    logger::log_info("Shutdown signal received, stopping relay");

    server.stop();
    if let Err(e) = handle.await {
        logger::log_error(&format!("Server task ended abnormally: {}", e));
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
