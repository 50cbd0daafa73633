//! 存储目录布局

use pathodx_core::{PathoError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// 存储目录布局
///
/// 启动时一次性创建上传目录与报告目录，之后由各组件共享。
#[derive(Debug, Clone)]
pub struct StorageLayout {
    upload_dir: PathBuf,
    report_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(upload_dir: impl Into<PathBuf>, report_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            report_dir: report_dir.into(),
        }
    }

    /// 在根目录下使用默认子目录 `uploads/` 与 `reports/`
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(root.join("uploads"), root.join("reports"))
    }

    /// 创建目录
    pub async fn prepare(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.report_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                PathoError::Config(format!("无法创建目录 {}: {}", dir.display(), e))
            })?;
        }

        info!(
            "Storage directories ready: uploads={}, reports={}",
            self.upload_dir.display(),
            self.report_dir.display()
        );
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// 读取报告目录中的文件, 拒绝目录之外的路径
    pub async fn read_report(&self, path: &str) -> Result<Vec<u8>> {
        let path = Path::new(path);
        let inside = match (path.parent(), path.file_name()) {
            (Some(parent), Some(_)) => parent == self.report_dir.as_path(),
            _ => false,
        };
        if !inside {
            return Err(PathoError::NotFound(format!("报告文件不存在: {}", path.display())));
        }

        match tokio::fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PathoError::NotFound(
                format!("报告文件不存在: {}", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_creates_directories() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::under(root.path().join("data"));

        layout.prepare().await.unwrap();
        assert!(layout.upload_dir().is_dir());
        assert!(layout.report_dir().is_dir());

        // 重复调用无副作用
        layout.prepare().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_report_rejects_outside_paths() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::under(root.path());
        layout.prepare().await.unwrap();

        let inside = layout.report_dir().join("r.pdf");
        std::fs::write(&inside, b"%PDF").unwrap();
        let data = layout.read_report(&inside.to_string_lossy()).await.unwrap();
        assert_eq!(data, b"%PDF");

        let outside = root.path().join("secret.txt");
        std::fs::write(&outside, b"x").unwrap();
        let result = layout.read_report(&outside.to_string_lossy()).await;
        assert!(matches!(result, Err(PathoError::NotFound(_))));

        let missing = layout.report_dir().join("missing.pdf");
        let result = layout.read_report(&missing.to_string_lossy()).await;
        assert!(matches!(result, Err(PathoError::NotFound(_))));
    }
}
