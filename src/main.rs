// ==========================================
// 小额信贷平台 - 批量数据导入服务入口
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md
// 技术栈: axum + Rust + SQLite
// ==========================================

use microfin_import::app::{build_router, AppState};
use microfin_import::config::{ConfigManager, ImportConfigReader};
use microfin_import::importer::{BatchRunner, ImportJobQueue, ProgressTracker};
use microfin_import::repository::ImportSessionRepositoryImpl;
use microfin_import::{db, logging, ImportSessionApi};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// 任务轮询间隔（毫秒）
const WORKER_POLL_INTERVAL_MS: u64 = 500;

/// 数据目录: ~/.microfin-import/（不可用时退回当前目录）
fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".microfin-import"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("小额信贷平台 - 批量数据导入服务");
    tracing::info!("系统版本: {}", microfin_import::VERSION);
    tracing::info!("==================================================");

    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("import.db").display().to_string();
    let upload_dir = data_dir.join("uploads");
    tracing::info!("使用数据库: {}", db_path);

    // 建表（幂等）
    {
        let conn = db::open_sqlite_connection(&db_path)?;
        db::ensure_schema(&conn)?;
    }

    // 配置层（config_kv 表，含默认值兜底）
    let config = Arc::new(ConfigManager::new(&db_path)?);
    let backoff_base_ms = config.get_job_backoff_base_ms().await?;
    let max_retries = config.get_job_max_retries().await?;

    // 仓储与任务队列
    let repo = Arc::new(ImportSessionRepositoryImpl::new(&db_path)?);
    let queue_conn = db::open_sqlite_connection(&db_path)?;
    let queue = Arc::new(ImportJobQueue::new(
        Arc::new(Mutex::new(queue_conn)),
        backoff_base_ms,
        max_retries,
    )?);

    // 落库进度共享视图（执行器写入，进度端点读取）
    let progress = Arc::new(ProgressTracker::new());

    // 后台执行器（落库/回退）
    let runner = Arc::new(BatchRunner::new(
        &db_path,
        repo.clone(),
        queue.clone(),
        progress.clone(),
        WORKER_POLL_INTERVAL_MS,
    )?);
    tokio::spawn(runner.run());

    // HTTP 服务
    let api = Arc::new(ImportSessionApi::new(
        repo, queue, config, progress, upload_dir,
    ));
    let router = build_router(AppState::new(api));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("HTTP 服务监听: {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
