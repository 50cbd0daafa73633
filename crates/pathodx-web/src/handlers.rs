//! 通用HTTP处理器

use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

const SERVICE_NAME: &str = "法医病理辅助诊断系统";

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "auth": "/api/auth",
            "diagnosis": "/api/diagnosis"
        }
    }))
}

/// 健康检查处理器
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match state.db.ping().await {
        Ok(()) => "ok",
        Err(_) => "unavailable",
    };

    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 病理类型目录
pub async fn classes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let classes = state.catalog.entries();
    Json(json!({
        "classes": classes,
        "categories": state.catalog.categories(),
        "total": classes.len()
    }))
}
