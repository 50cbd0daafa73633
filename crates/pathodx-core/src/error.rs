//! 错误定义模块

use thiserror::Error;

/// 诊断系统统一错误类型
#[derive(Error, Debug)]
pub enum PathoError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    /// 输入缺失或不合法，用户可自行修正
    #[error("验证错误: {0}")]
    Validation(String),

    /// 缺少或无效的身份凭证
    #[error("认证错误: {0}")]
    Auth(String),

    /// 已认证但无权访问
    #[error("权限错误: {0}")]
    Authorization(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 外部分类进程失败或输出不可用
    #[error("AI诊断失败: {0}")]
    Prediction(String),

    #[error("报告生成失败: {0}")]
    ReportGeneration(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl PathoError {
    /// 分类失败错误，附带配置检查提示
    pub fn prediction(detail: impl std::fmt::Display) -> Self {
        PathoError::Prediction(format!(
            "{detail}。请确保Python环境和模型文件已正确配置"
        ))
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for PathoError {
    fn from(err: sqlx::Error) -> Self {
        PathoError::Database(err.to_string())
    }
}

/// 诊断系统统一结果类型
pub type Result<T> = std::result::Result<T, PathoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_error_carries_guidance() {
        let err = PathoError::prediction("进程退出码 1");
        let message = err.to_string();
        assert!(message.contains("进程退出码 1"));
        assert!(message.contains("已正确配置"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PathoError = io.into();
        assert!(matches!(err, PathoError::Io(_)));
    }
}
