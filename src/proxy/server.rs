use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::error::{AppError, AppResult};
use crate::models::RelayConfig;
use crate::modules::oauth::TokenSource;
use crate::proxy::history::HistoryStore;
use crate::proxy::token_manager::TokenManager;
use crate::proxy::translator::QueryTranslator;
use crate::proxy::upstream::UpstreamClient;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
// In-flight requests get this long to finish after stop().
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Axum 应用状态
#[derive(Clone)]
pub struct AppState {
    pub translator: Arc<QueryTranslator>,
}

impl AppState {
    /// Wires the token cache, history store and upstream client together.
    pub fn from_config(config: &RelayConfig, token_source: Arc<dyn TokenSource>) -> AppResult<Self> {
        let upstream = Arc::new(UpstreamClient::new(config)?);
        tracing::info!("Vertex AI endpoint: {}", upstream.endpoint());

        let translator = QueryTranslator::new(
            upstream,
            Arc::new(TokenManager::new(token_source)),
            Arc::new(HistoryStore::new(config.history_max_turns)),
            config.temperature,
        );

        Ok(Self {
            translator: Arc::new(translator),
        })
    }
}

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    use crate::proxy::handlers;
    use crate::proxy::middleware as relay_middleware;

    Router::new()
        .route("/", post(handlers::query::handle_query))
        .route("/healthz", get(health_check_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(relay_middleware::cors_layer())
        .layer(middleware::from_fn(relay_middleware::options_no_content))
        .with_state(state)
}

/// Axum 服务器实例
pub struct AxumServer {
    shutdown_tx: watch::Sender<bool>,
    local_addr: SocketAddr,
}

impl AxumServer {
    /// 启动 Axum 服务器
    pub async fn start(
        config: &RelayConfig,
        state: AppState,
    ) -> AppResult<(Self, tokio::task::JoinHandle<()>)> {
        let app = build_router(state);

        // 绑定地址
        let addr = config.get_bind_address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::Server(format!("Failed to bind {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AppError::Server(format!("Failed to read bound address: {}", e)))?;

        tracing::info!("Relay listening on http://{}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;

            let mut connections = JoinSet::new();

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let service = TowerToHyperService::new(app.clone());
                                let mut conn_shutdown = shutdown_rx.clone();

                                connections.spawn(async move {
                                    let conn = http1::Builder::new().serve_connection(io, service);
                                    tokio::pin!(conn);

                                    let result = tokio::select! {
                                        res = conn.as_mut() => res,
                                        _ = conn_shutdown.changed() => {
                                            // Finish the in-flight request, then close.
                                            conn.as_mut().graceful_shutdown();
                                            conn.await
                                        }
                                    };
                                    if let Err(err) = result {
                                        debug!("Connection closed with error: {:?}", err);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {:?}", e);
                            }
                        }
                    }
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                    _ = shutdown_rx.changed() => {
                        tracing::info!("Relay stopped accepting connections");
                        break;
                    }
                }
            }

            drop(listener);
            let drain = async { while connections.join_next().await.is_some() {} };
            if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
                tracing::warn!(
                    "{} connections still open after {:?}, aborting",
                    connections.len(),
                    DRAIN_TIMEOUT
                );
                connections.abort_all();
            }
        });

        Ok((
            Self {
                shutdown_tx,
                local_addr,
            },
            handle,
        ))
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 停止服务器
    ///
    /// Stops accepting connections; open connections finish their current
    /// request before the server task returns.
    pub fn stop(self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// 健康检查处理器
async fn health_check_handler() -> Response {
    Json(serde_json::json!({
        "status": "ok"
    }))
    .into_response()
}
