//! 法医病理辅助诊断系统服务器主程序

mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use pathodx_classifier::SubprocessClassifier;
use pathodx_database::{DatabasePool, DatabaseQueries};
use pathodx_report::ReportRenderer;
use pathodx_storage::StorageLayout;
use pathodx_web::{AppState, WebServer};
use settings::Settings;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "pathodx-server")]
#[command(about = "法医病理辅助诊断系统 (PathoDx) 服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 监听地址
    #[arg(long)]
    host: Option<String>,

    /// 服务器端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(level) = args.log_level {
        settings.logging.level = level;
    }

    // 初始化日志
    let filter = EnvFilter::try_new(&settings.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("启动法医病理辅助诊断系统...");
    settings.validate()?;

    info!("服务器配置:");
    info!("  监听地址: {}:{}", settings.server.host, settings.server.port);
    info!("  数据库: {}", settings.database.url);
    info!("  上传目录: {}", settings.storage.upload_dir.display());
    info!("  报告目录: {}", settings.storage.report_dir.display());
    info!(
        "  分类程序: {} {:?} (超时 {} 秒)",
        settings.classifier.program, settings.classifier.args, settings.classifier.timeout_secs
    );

    let layout = StorageLayout::new(&settings.storage.upload_dir, &settings.storage.report_dir);
    layout
        .prepare()
        .await
        .context("Failed to prepare storage directories")?;

    if let Some(parent) = settings.database_file().as_deref().and_then(|p| p.parent()) {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }
    }

    let db = DatabasePool::connect(&settings.database.url, settings.database.max_connections)
        .await
        .context("Failed to connect to database")?;
    DatabaseQueries::new(&db)
        .create_tables()
        .await
        .context("Failed to initialize database schema")?;

    if settings.report.font_path.is_none() {
        warn!("report.font_path is not set; PDF reports are disabled, Word reports remain available");
    }
    let renderer = ReportRenderer::new(layout.report_dir(), settings.report.font_path.clone());
    let classifier = Arc::new(SubprocessClassifier::new(settings.classifier_config()));

    let state = Arc::new(AppState::new(
        db,
        settings.auth_config(),
        layout,
        settings.storage.max_upload_bytes,
        classifier,
        renderer,
    ));

    if let (Some(username), Some(password)) = (&settings.auth.admin_username, &settings.auth.admin_password) {
        state
            .auth
            .seed_admin(username, password, &settings.auth.admin_display_name)
            .await
            .context("Failed to create admin account")?;
    }

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid listen address")?;

    let server = WebServer::new(addr, state.clone());
    let result = server.run().await;
    state.db.close().await;
    if let Err(e) = result {
        error!("服务器运行失败: {}", e);
        return Err(e.into());
    }

    info!("服务器已停止");
    Ok(())
}
