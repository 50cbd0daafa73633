//! 外部分类进程调用
//!
//! 以 `<program> <args...> <image_path>` 的形式启动预测脚本并等待其结果。
//! 等待时间有上限，超时后子进程随 future 一起被终止。

use crate::catalog::PathologyCatalog;
use crate::classifier::Classifier;
use crate::output::parse_output;
use async_trait::async_trait;
use pathodx_core::{ClassificationResult, PathoError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// 默认超时: 120秒
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// 错误信息中保留的 stderr 末尾字符数
const STDERR_TAIL_CHARS: usize = 500;

/// 分类进程配置
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// 可执行程序, 例如 `python3`
    pub program: String,
    /// 位于影像路径之前的参数, 例如预测脚本路径
    pub args: Vec<String>,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["model/predict.py".to_string()],
            timeout: DEFAULT_TIMEOUT,
            working_dir: None,
        }
    }
}

/// 基于子进程的分类器
#[derive(Debug, Clone)]
pub struct SubprocessClassifier {
    config: ClassifierConfig,
    catalog: PathologyCatalog,
}

impl SubprocessClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            catalog: PathologyCatalog::new(),
        }
    }

    fn command(&self, image: &Path) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg(image)
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl Classifier for SubprocessClassifier {
    async fn classify(&self, image: &Path) -> Result<ClassificationResult> {
        if !image.is_file() {
            return Err(PathoError::prediction(format!(
                "影像文件不存在: {}",
                image.display()
            )));
        }

        debug!(
            "Invoking classifier: {} {:?} {}",
            self.config.program,
            self.config.args,
            image.display()
        );

        let started = Instant::now();
        let output = match tokio::time::timeout(self.config.timeout, self.command(image).output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Failed to start classifier {}: {}", self.config.program, e);
                return Err(PathoError::prediction(format!(
                    "无法启动分类进程 {}: {}",
                    self.config.program, e
                )));
            }
            Err(_) => {
                warn!(
                    "Classifier timed out after {:?} on {}",
                    self.config.timeout,
                    image.display()
                );
                return Err(PathoError::prediction(format!(
                    "分类进程超时 (超过 {} 秒)",
                    self.config.timeout.as_secs_f64()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            warn!("Classifier exited with {}: {}", code, stderr.trim());
            return Err(PathoError::prediction(format!(
                "分类进程退出码 {}: {}",
                code,
                tail(stderr.trim(), STDERR_TAIL_CHARS)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let result = parse_output(&stdout, &self.catalog)?;

        info!(
            "Classified {} as {} ({:.4}) in {:?}",
            image.display(),
            result.result,
            result.confidence,
            started.elapsed()
        );
        Ok(result)
    }
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), [0xFF, 0xD8, 0xFF, 0x00]).unwrap();
        file
    }

    #[cfg(unix)]
    fn shell(script: &str, timeout: Duration) -> SubprocessClassifier {
        SubprocessClassifier::new(ClassifierConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "classify".to_string()],
            timeout,
            working_dir: None,
        })
    }

    #[test]
    fn test_tail_keeps_char_boundaries() {
        assert_eq!(tail("abc", 5), "abc");
        assert_eq!(tail("模型加载失败", 2), "失败");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_classification() {
        let image = image();
        let classifier = shell(
            r#"echo "loading $1"; echo '{"predicted_class": "肺炎", "confidence": 0.87}'"#,
            DEFAULT_TIMEOUT,
        );

        let result = classifier.classify(image.path()).await.unwrap();
        assert_eq!(result.result, "肺炎");
        assert_eq!(result.diagnosis_type, "肺部病变");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_image_path_is_passed_last() {
        let image = image();
        let classifier = shell(
            r#"test -f "$1" && echo '{"predicted_class": "肝脂肪变性", "confidence": 0.91}'"#,
            DEFAULT_TIMEOUT,
        );

        let result = classifier.classify(image.path()).await.unwrap();
        assert_eq!(result.diagnosis_type, "肝脏病变");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let image = image();
        let classifier = shell("echo 'model file missing' >&2; exit 3", DEFAULT_TIMEOUT);

        let err = classifier.classify(image.path()).await.unwrap_err();
        assert!(matches!(err, PathoError::Prediction(_)));
        let message = err.to_string();
        assert!(message.contains("3"));
        assert!(message.contains("model file missing"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let image = image();
        let classifier = shell("sleep 5", Duration::from_millis(100));

        let started = Instant::now();
        let err = classifier.classify(image.path()).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(matches!(err, PathoError::Prediction(_)));
        assert!(err.to_string().contains("超时"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let image = image();
        let classifier = SubprocessClassifier::new(ClassifierConfig {
            program: "/nonexistent/pathodx-python".to_string(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            working_dir: None,
        });

        let err = classifier.classify(image.path()).await.unwrap_err();
        assert!(matches!(err, PathoError::Prediction(_)));
    }

    #[tokio::test]
    async fn test_missing_image() {
        let classifier = SubprocessClassifier::new(ClassifierConfig::default());
        let err = classifier
            .classify(Path::new("/nonexistent/slide.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, PathoError::Prediction(_)));
    }
}
