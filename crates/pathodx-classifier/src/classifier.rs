use async_trait::async_trait;
use pathodx_core::{ClassificationResult, Result};
use std::path::Path;

/// 病理影像分类器
#[async_trait]
pub trait Classifier: Send + Sync {
    /// 对已暂存的影像进行分类
    ///
    /// 失败时返回 `PathoError::Prediction`
    async fn classify(&self, image: &Path) -> Result<ClassificationResult>;
}
