//! 服务器配置
//!
//! 加载顺序: 内置默认值 -> 配置文件 -> 环境变量。
//! 环境变量以 `PATHODX_` 开头，层级之间用 `__` 分隔，例如
//! `PATHODX_SERVER__PORT=8080`、`PATHODX_CLASSIFIER__TIMEOUT_SECS=60`。

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use pathodx_classifier::ClassifierConfig;
use pathodx_web::AuthConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const ENV_PREFIX: &str = "PATHODX";
const DEFAULT_TOKEN_SECRET: &str = "pathodx-change-me";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://data/pathodx.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub upload_dir: PathBuf,
    pub report_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("data/uploads"),
            report_dir: PathBuf::from("data/reports"),
            max_upload_bytes: pathodx_storage::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub working_dir: Option<PathBuf>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        let defaults = ClassifierConfig::default();
        Self {
            program: defaults.program,
            args: defaults.args,
            timeout_secs: defaults.timeout.as_secs(),
            working_dir: defaults.working_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub token_secret: String,
    pub token_ttl_hours: i64,
    pub hash_iterations: u32,
    /// 启动时创建的管理员账户
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub admin_display_name: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_secret: DEFAULT_TOKEN_SECRET.to_string(),
            token_ttl_hours: 24,
            hash_iterations: pathodx_web::auth::DEFAULT_HASH_ITERATIONS,
            admin_username: None,
            admin_password: None,
            admin_display_name: "系统管理员".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// 含中文字形的 TrueType 字体, 用于PDF报告
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 全部配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub classifier: ClassifierSettings,
    pub auth: AuthSettings,
    pub report: ReportSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// 加载配置
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(config_path, ENV_PREFIX)
    }

    fn load_with_prefix(config_path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let defaults = Config::try_from(&Settings::default())
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to load configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port 不能为 0");
        }
        if self.database.url.trim().is_empty() {
            bail!("database.url 不能为空");
        }
        if self.storage.max_upload_bytes == 0 {
            bail!("storage.max_upload_bytes 必须大于 0");
        }
        if self.classifier.program.trim().is_empty() {
            bail!("classifier.program 不能为空");
        }
        if self.classifier.timeout_secs == 0 {
            bail!("classifier.timeout_secs 必须大于 0");
        }
        if self.auth.token_secret.is_empty() {
            bail!("auth.token_secret 不能为空");
        }
        if self.auth.token_ttl_hours <= 0 {
            bail!("auth.token_ttl_hours 必须大于 0");
        }
        if self.auth.admin_username.is_some() != self.auth.admin_password.is_some() {
            bail!("auth.admin_username 与 auth.admin_password 需同时设置");
        }
        if let Some(font) = &self.report.font_path {
            if !font.is_file() {
                bail!("report.font_path 不是有效的字体文件: {}", font.display());
            }
        }

        if self.auth.token_secret == DEFAULT_TOKEN_SECRET {
            warn!("auth.token_secret is using the built-in default; set PATHODX_AUTH__TOKEN_SECRET");
        }
        Ok(())
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            program: self.classifier.program.clone(),
            args: self.classifier.args.clone(),
            timeout: Duration::from_secs(self.classifier.timeout_secs),
            working_dir: self.classifier.working_dir.clone(),
        }
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            token_secret: self.auth.token_secret.clone(),
            token_ttl_hours: self.auth.token_ttl_hours,
            hash_iterations: self.auth.hash_iterations,
        }
    }

    /// SQLite数据库文件路径, 内存数据库返回 `None`
    pub fn database_file(&self) -> Option<PathBuf> {
        let url = self.database.url.trim();
        if url.contains(":memory:") {
            return None;
        }
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        let path = path.split('?').next().unwrap_or(path);
        Some(PathBuf::from(path)).filter(|p| !p.as_os_str().is_empty())
    }
}
