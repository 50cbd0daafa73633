//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use pathodx_core::{PathoError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::auth::{auth_middleware, current_user_handler, login_handler, register_handler};
use crate::diagnosis::{download_report, generate_report, get_diagnosis, list, predict};
use crate::handlers::{api_root, classes, health};
use crate::state::AppState;

/// 表单中除图像以外字段的余量
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: Arc<AppState>) -> Self {
        let app = create_app(state);
        Self { addr, app }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| PathoError::Internal(format!("Web服务器异常退出: {e}")))?;

        info!("Web server stopped");
        Ok(())
    }
}

/// 收到 Ctrl+C 后停止接收新连接
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// 构建路由
pub fn create_app(state: Arc<AppState>) -> Router {
    let upload_limit = state.uploads.max_bytes() + FORM_OVERHEAD_BYTES;

    // 需要认证的路由
    let protected = Router::new()
        .route("/api/auth/me", get(current_user_handler))
        .nest("/api/diagnosis", diagnosis_routes(upload_limit))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        // 认证路由（无需token）
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        // 根路径
        .route("/", get(api_root))
        // 健康检查
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

/// 诊断路由
fn diagnosis_routes(upload_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/predict",
            post(predict).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/list", get(list))
        .route("/classes", get(classes))
        .route("/:id", get(get_diagnosis))
        .route("/:id/report", post(generate_report))
        .route("/reports/:report_id/download", get(download_report))
}
