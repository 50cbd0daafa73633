//! 报告文件输出
//!
//! 渲染在阻塞线程池中执行。字节先写入报告目录下的临时文件，
//! 再以不覆盖的方式原子落盘，失败时不留下任何文件。

use crate::content::ReportContent;
use crate::pdf::render_pdf;
use crate::word::render_word;
use chrono::Local;
use pathodx_core::{PathoError, ReportKind, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

/// 已生成的报告文件
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub path: PathBuf,
    pub file_name: String,
    pub kind: ReportKind,
    pub size: usize,
}

/// 报告渲染器
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    reports_dir: PathBuf,
    font_path: Option<PathBuf>,
}

impl ReportRenderer {
    pub fn new(reports_dir: impl Into<PathBuf>, font_path: Option<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            font_path,
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// 渲染并写入报告目录
    ///
    /// 未配置字体时无法输出中文，拒绝生成PDF。
    pub async fn render(&self, content: &ReportContent, kind: ReportKind) -> Result<RenderedReport> {
        if kind == ReportKind::Pdf && self.font_path.is_none() {
            warn!("PDF report requested but report.font_path is not configured");
            return Err(PathoError::ReportGeneration(
                "未配置报告字体 (report.font_path)，无法生成PDF报告，请选择 word 格式".to_string(),
            ));
        }

        let content = content.clone();
        let dir = self.reports_dir.clone();
        let font_path = self.font_path.clone();

        let rendered = tokio::task::spawn_blocking(move || {
            render_to_file(&content, kind, &dir, font_path.as_deref())
        })
        .await
        .map_err(|e| PathoError::ReportGeneration(format!("渲染任务异常终止: {e}")))?;

        match &rendered {
            Ok(report) => info!(
                "Generated {} report {} ({} bytes)",
                kind, report.file_name, report.size
            ),
            Err(e) => error!("Failed to generate {} report: {}", kind, e),
        }
        rendered
    }
}

/// `diagnosis_report_<id>_<时间戳>_<随机>.<扩展名>`
pub fn report_file_name(diagnosis_id: i64, kind: ReportKind) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "diagnosis_report_{}_{}_{}.{}",
        diagnosis_id,
        Local::now().format("%Y%m%d_%H%M%S"),
        &random[..8],
        kind.extension()
    )
}

fn render_to_file(
    content: &ReportContent,
    kind: ReportKind,
    dir: &Path,
    font_path: Option<&Path>,
) -> Result<RenderedReport> {
    let bytes = match (kind, font_path) {
        (ReportKind::Pdf, Some(font_path)) => render_pdf(content, font_path)?,
        (ReportKind::Pdf, None) => {
            return Err(PathoError::ReportGeneration("未配置报告字体".to_string()))
        }
        (ReportKind::Word, _) => render_word(content)?,
    };

    let file_name = report_file_name(content.diagnosis_id, kind);
    let path = dir.join(&file_name);

    let io_error = |e: std::io::Error| {
        PathoError::ReportGeneration(format!("无法写入报告文件 {}: {}", path.display(), e))
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".report-")
        .tempfile_in(dir)
        .map_err(io_error)?;
    tmp.write_all(&bytes).map_err(io_error)?;
    tmp.as_file().sync_all().map_err(io_error)?;
    tmp.persist_noclobber(&path).map_err(|e| io_error(e.error))?;

    Ok(RenderedReport {
        path,
        file_name,
        kind,
        size: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::tests::sample_content;
    use crate::pdf::tests::fixture_font;
    use crate::word::tests::read_document;

    #[tokio::test]
    async fn test_pdf_then_word_are_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ReportRenderer::new(dir.path(), Some(fixture_font()));
        let content = sample_content();

        let pdf = renderer.render(&content, ReportKind::Pdf).await.unwrap();
        let word = renderer.render(&content, ReportKind::Word).await.unwrap();

        assert_ne!(pdf.path, word.path);
        assert!(pdf.file_name.starts_with("diagnosis_report_42_"));
        assert!(pdf.file_name.ends_with(".pdf"));
        assert!(word.file_name.ends_with(".docx"));

        let pdf_bytes = std::fs::read(&pdf.path).unwrap();
        assert!(pdf_bytes.starts_with(b"%PDF"));

        let xml = read_document(&std::fs::read(&word.path).unwrap());
        assert!(xml.contains("肺炎"));
        assert!(xml.contains("87.00%"));

        // 目录中只有两份报告, 没有残留的临时文件
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_repeated_renders_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ReportRenderer::new(dir.path(), None);
        let content = sample_content();

        let a = renderer.render(&content, ReportKind::Word).await.unwrap();
        let b = renderer.render(&content, ReportKind::Word).await.unwrap();
        assert_ne!(a.file_name, b.file_name);
    }

    #[tokio::test]
    async fn test_unwritable_directory_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let renderer = ReportRenderer::new(&missing, Some(fixture_font()));

        let result = renderer.render(&sample_content(), ReportKind::Pdf).await;
        assert!(matches!(result, Err(PathoError::ReportGeneration(_))));
        assert!(!missing.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_bad_font_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ReportRenderer::new(dir.path(), Some(PathBuf::from("/nonexistent/simhei.ttf")));

        let result = renderer.render(&sample_content(), ReportKind::Pdf).await;
        assert!(matches!(result, Err(PathoError::ReportGeneration(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_pdf_without_font_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ReportRenderer::new(dir.path(), None);

        let result = renderer.render(&sample_content(), ReportKind::Pdf).await;
        match result {
            Err(PathoError::ReportGeneration(message)) => assert!(message.contains("font_path")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        // Word报告不依赖字体
        let word = renderer.render(&sample_content(), ReportKind::Word).await.unwrap();
        assert!(word.file_name.ends_with(".docx"));
    }
}
