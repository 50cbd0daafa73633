//! 影像上传处理
//!
//! 校验上传的病理影像（类型、大小、文件头），并以不会冲突的随机文件名
//! 写入上传目录。校验失败时不产生任何磁盘副作用。

use pathodx_core::utils::unique_file_name;
use pathodx_core::{PathoError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// 默认上传大小上限: 10 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// 支持的影像格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Tiff,
    Bmp,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 4] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Tiff,
        ImageFormat::Bmp,
    ];

    /// 根据 MIME 类型识别格式, 忽略大小写与参数
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/tiff" | "image/tif" => Some(ImageFormat::Tiff),
            "image/bmp" | "image/x-bmp" | "image/x-ms-bmp" => Some(ImageFormat::Bmp),
            _ => None,
        }
    }

    /// 根据扩展名识别格式, 忽略大小写
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "tif" | "tiff" => Some(ImageFormat::Tiff),
            "bmp" => Some(ImageFormat::Bmp),
            _ => None,
        }
    }

    pub fn canonical_extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Bmp => "bmp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Bmp => "image/bmp",
        }
    }

    /// 文件头是否符合该格式
    pub fn matches_signature(&self, data: &[u8]) -> bool {
        match self {
            ImageFormat::Jpeg => data.starts_with(&[0xFF, 0xD8, 0xFF]),
            ImageFormat::Png => data.starts_with(&[0x89, b'P', b'N', b'G']),
            ImageFormat::Tiff => data.starts_with(b"II*\0") || data.starts_with(b"MM\0*"),
            ImageFormat::Bmp => data.starts_with(b"BM"),
        }
    }
}

/// 待校验的上传文件
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// 已写入上传目录的影像
#[derive(Debug, Clone)]
pub struct StagedImage {
    pub path: PathBuf,
    pub file_name: String,
    pub original_name: Option<String>,
    pub format: ImageFormat,
    pub size: usize,
}

impl StagedImage {
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

/// 上传存储
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// 校验上传文件, 返回识别出的格式与保存时使用的扩展名
    pub fn validate(&self, upload: &ImageUpload) -> Result<(ImageFormat, String)> {
        if upload.data.is_empty() {
            return Err(PathoError::Validation("请上传图像文件".to_string()));
        }

        if upload.data.len() > self.max_bytes {
            return Err(PathoError::Validation(format!(
                "文件大小超过限制 (最大 {} MB)",
                self.max_bytes / (1024 * 1024)
            )));
        }

        let original_ext = upload
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty());

        if let Some(ext) = original_ext {
            if ImageFormat::from_extension(ext).is_none() {
                return Err(unsupported_type());
            }
        }

        // 未声明类型时根据文件名推断
        let declared = upload
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty() && !ct.eq_ignore_ascii_case("application/octet-stream"))
            .map(str::to_string)
            .or_else(|| {
                upload
                    .file_name
                    .as_deref()
                    .and_then(|name| mime_guess::from_path(name).first())
                    .map(|mime| mime.essence_str().to_string())
            })
            .ok_or_else(unsupported_type)?;

        let format = ImageFormat::from_mime(&declared).ok_or_else(unsupported_type)?;

        if !format.matches_signature(&upload.data) {
            return Err(PathoError::Validation(
                "文件内容与声明的图像格式不符".to_string(),
            ));
        }

        if let Some(ext) = original_ext {
            if ImageFormat::from_extension(ext) != Some(format) {
                return Err(PathoError::Validation(
                    "文件扩展名与图像格式不符".to_string(),
                ));
            }
        }

        let extension = original_ext
            .map(str::to_string)
            .unwrap_or_else(|| format.canonical_extension().to_string());

        Ok((format, extension))
    }

    /// 校验并写入上传目录
    pub async fn stage(&self, upload: ImageUpload) -> Result<StagedImage> {
        let (format, extension) = match self.validate(&upload) {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Rejected upload {:?}: {}", upload.file_name, e);
                return Err(e);
            }
        };

        let file_name = unique_file_name(&extension);
        let path = self.dir.join(&file_name);

        // create_new 保证不会覆盖已有文件
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        if let Err(e) = write_all(&mut file, &upload.data).await {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove partial upload {}: {}", path.display(), cleanup);
            }
            return Err(e.into());
        }

        info!(
            "Staged upload {:?} as {} ({} bytes)",
            upload.file_name,
            file_name,
            upload.data.len()
        );

        Ok(StagedImage {
            path,
            file_name,
            original_name: upload.file_name,
            format,
            size: upload.data.len(),
        })
    }

    /// 删除已暂存的影像（分类失败时调用）
    pub async fn discard(&self, staged: &StagedImage) -> Result<()> {
        match tokio::fs::remove_file(&staged.path).await {
            Ok(()) => {
                debug!("Discarded staged upload {}", staged.file_name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_all(file: &mut tokio::fs::File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

fn unsupported_type() -> PathoError {
    PathoError::Validation("只支持 JPEG、PNG、TIFF、BMP 格式的图像".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(size: usize) -> Vec<u8> {
        let mut data = vec![0u8; size.max(3)];
        data[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
        data
    }

    fn upload(name: &str, content_type: Option<&str>, data: Vec<u8>) -> ImageUpload {
        ImageUpload {
            file_name: Some(name.to_string()),
            content_type: content_type.map(str::to_string),
            data,
        }
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_accepted_upload_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), DEFAULT_MAX_UPLOAD_BYTES);

        let staged = store
            .stage(upload("slide.JPEG", Some("image/jpeg"), jpeg(2 * 1024 * 1024)))
            .await
            .unwrap();

        assert!(staged.file_name.ends_with(".JPEG"));
        assert_eq!(staged.format, ImageFormat::Jpeg);
        assert_eq!(staged.size, 2 * 1024 * 1024);
        assert_eq!(std::fs::metadata(&staged.path).unwrap().len(), 2 * 1024 * 1024);
        assert_eq!(staged.path.parent().unwrap(), dir.path());
    }

    #[tokio::test]
    async fn test_uploads_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), DEFAULT_MAX_UPLOAD_BYTES);

        let a = store.stage(upload("a.jpg", Some("image/jpeg"), jpeg(16))).await.unwrap();
        let b = store.stage(upload("a.jpg", Some("image/jpeg"), jpeg(16))).await.unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(entries(dir.path()), 2);
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected_without_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), DEFAULT_MAX_UPLOAD_BYTES);

        let result = store
            .stage(upload("big.jpg", Some("image/jpeg"), jpeg(DEFAULT_MAX_UPLOAD_BYTES + 1)))
            .await;
        assert!(matches!(result, Err(PathoError::Validation(_))));
        assert_eq!(entries(dir.path()), 0);

        // 恰好等于上限时接受
        assert!(store
            .stage(upload("max.jpg", Some("image/jpeg"), jpeg(DEFAULT_MAX_UPLOAD_BYTES)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_disallowed_types_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), DEFAULT_MAX_UPLOAD_BYTES);

        let cases = vec![
            upload("scan.gif", Some("image/gif"), b"GIF89a".to_vec()),
            upload("notes.txt", Some("text/plain"), b"hello".to_vec()),
            upload("evil.exe", Some("image/jpeg"), jpeg(16)),
            // 文件头与声明类型不符
            upload("fake.png", Some("image/png"), jpeg(16)),
            ImageUpload::default(),
        ];

        for case in cases {
            let result = store.stage(case).await;
            assert!(matches!(result, Err(PathoError::Validation(_))));
        }
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_extension_must_match_detected_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), DEFAULT_MAX_UPLOAD_BYTES);

        let mut png = vec![0u8; 32];
        png[..4].copy_from_slice(&[0x89, b'P', b'N', b'G']);

        let result = store.stage(upload("a.jpg", Some("image/png"), png.clone())).await;
        match result {
            Err(PathoError::Validation(message)) => assert!(message.contains("扩展名")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(entries(dir.path()), 0);

        let staged = store.stage(upload("a.png", Some("image/png"), png)).await.unwrap();
        assert!(staged.file_name.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_content_type_guessed_from_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), DEFAULT_MAX_UPLOAD_BYTES);

        let mut png = vec![0u8; 32];
        png[..4].copy_from_slice(&[0x89, b'P', b'N', b'G']);
        let staged = store.stage(upload("tissue.png", None, png)).await.unwrap();
        assert_eq!(staged.format, ImageFormat::Png);
        assert!(staged.file_name.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_missing_extension_gets_canonical_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), DEFAULT_MAX_UPLOAD_BYTES);

        let staged = store
            .stage(upload("slide", Some("image/tiff"), b"II*\0rest".to_vec()))
            .await
            .unwrap();
        assert!(staged.file_name.ends_with(".tiff"));
    }

    #[tokio::test]
    async fn test_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), DEFAULT_MAX_UPLOAD_BYTES);

        let staged = store.stage(upload("a.bmp", Some("image/bmp"), b"BMxxxx".to_vec())).await.unwrap();
        store.discard(&staged).await.unwrap();
        assert!(!staged.path.exists());
        // 再次删除不报错
        store.discard(&staged).await.unwrap();
    }

    #[test]
    fn test_format_lookup() {
        assert_eq!(ImageFormat::from_mime("IMAGE/PNG; charset=binary"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_mime("image/webp"), None);
        for format in ImageFormat::ALL {
            assert_eq!(ImageFormat::from_extension(format.canonical_extension()), Some(format));
            assert_eq!(ImageFormat::from_mime(format.mime_type()), Some(format));
        }
    }
}
