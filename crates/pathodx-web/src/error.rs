//! HTTP错误映射

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pathodx_core::PathoError;
use serde_json::json;
use tracing::error;

/// 对外隐藏细节的错误提示
const INTERNAL_MESSAGE: &str = "服务器内部错误";

/// 接口错误, 包装 [`PathoError`] 以便实现 `IntoResponse`
#[derive(Debug)]
pub struct ApiError(pub PathoError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<PathoError> for ApiError {
    fn from(err: PathoError) -> Self {
        ApiError(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError(err.into())
    }
}

// 提取器拒绝请求时同样返回 JSON 错误体

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(PathoError::Validation(format!(
            "无效的请求数据: {}",
            rejection.body_text()
        )))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(PathoError::Validation(format!(
            "无效的路径参数: {}",
            rejection.body_text()
        )))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError(PathoError::Validation(format!(
            "无效的表单数据: {}",
            rejection.body_text()
        )))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PathoError::Validation(_) => StatusCode::BAD_REQUEST,
            PathoError::Auth(_) => StatusCode::UNAUTHORIZED,
            PathoError::Authorization(_) => StatusCode::FORBIDDEN,
            PathoError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回给客户端的错误信息
    pub fn message(&self) -> String {
        match &self.0 {
            PathoError::Validation(m)
            | PathoError::Auth(m)
            | PathoError::Authorization(m)
            | PathoError::NotFound(m) => m.clone(),
            PathoError::Prediction(_) | PathoError::ReportGeneration(_) => self.0.to_string(),
            _ => INTERNAL_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}
