// ==========================================
// 小额信贷平台 - 导入任务执行器
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 5. 落库 / 6. 任务编排
// 职责: 轮询任务队列，执行落库与回退（单事务，整批原子）
// 进度: 事务持有写锁期间行级进度只进内存（ProgressTracker），
//       processed_rows 随事务提交统一落库
// ==========================================

use crate::domain::session::{ErrorReport, ImportSession, ProcessResult};
use crate::domain::types::SessionStatus;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper;
use crate::importer::file_reader::{ParseOptions, TabularFileReader};
use crate::importer::job_queue::{ImportJob, ImportJobQueue, JobType};
use crate::importer::progress::ProgressTracker;
use crate::importer::strategy::ImporterRegistry;
use crate::repository::import_session_repo::ImportSessionRepository;
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// 每处理多少行刷新一次进度
const PROGRESS_EVERY_ROWS: i64 = 50;

// ==========================================
// BatchRunner - 任务执行器
// ==========================================
pub struct BatchRunner {
    repo: Arc<dyn ImportSessionRepository>,
    queue: Arc<ImportJobQueue>,
    registry: ImporterRegistry,
    /// 落库事务专用连接（与 repo 连接分离）
    apply_conn: Arc<Mutex<Connection>>,
    /// 行级进度共享视图（与查询端共用）
    progress: Arc<ProgressTracker>,
    poll_interval_ms: u64,
}

impl BatchRunner {
    /// 基于数据库路径构建（打开落库事务专用连接）
    pub fn new(
        db_path: &str,
        repo: Arc<dyn ImportSessionRepository>,
        queue: Arc<ImportJobQueue>,
        progress: Arc<ProgressTracker>,
        poll_interval_ms: u64,
    ) -> ImportResult<Self> {
        let apply_conn = crate::db::open_sqlite_connection(db_path)?;
        Ok(Self {
            repo,
            queue,
            registry: ImporterRegistry::with_builtin(),
            apply_conn: Arc::new(Mutex::new(apply_conn)),
            progress,
            poll_interval_ms,
        })
    }

    /// 轮询主循环（tokio 任务内运行，进程生命周期内不退出）
    pub async fn run(self: Arc<Self>) {
        info!(poll_interval_ms = self.poll_interval_ms, "导入任务执行器已启动");
        loop {
            match self.process_next().await {
                Ok(true) => {} // 还有任务，立即继续
                Ok(false) => {
                    tokio::time::sleep(std::time::Duration::from_millis(self.poll_interval_ms))
                        .await;
                }
                Err(e) => {
                    error!(error = %e, "任务轮询出错");
                    tokio::time::sleep(std::time::Duration::from_millis(self.poll_interval_ms))
                        .await;
                }
            }
        }
    }

    /// 处理下一个到期任务；返回 false 表示队列为空
    pub async fn process_next(&self) -> ImportResult<bool> {
        let Some(job) = self.queue.dequeue()? else {
            return Ok(false);
        };

        info!(job_id = %job.job_id, session_id = %job.session_id, job_type = %job.job_type.as_str(), "开始执行任务");

        let outcome = match job.job_type {
            JobType::Apply => self.run_apply(&job).await,
            JobType::Rollback => self.run_rollback(&job).await,
        };

        match outcome {
            Ok(()) => {
                self.queue.complete(&job.job_id)?;
            }
            Err(e) => {
                let retried = self.queue.fail(&job, &e.to_string())?;
                if !retried {
                    // 重试耗尽: 会话置 FAILED，记录致命错误
                    self.mark_session_failed(&job.session_id, &e).await;
                }
            }
        }
        // 本次尝试结束，内存进度项清除（重试时重新开始）
        self.progress.finish(&job.session_id);
        Ok(true)
    }

    // ==========================================
    // 落库任务
    // ==========================================
    async fn run_apply(&self, job: &ImportJob) -> ImportResult<()> {
        let mut session = self
            .repo
            .get_session(&job.session_id)
            .await
            .map_err(|e| ImportError::JobExecution(e.to_string()))?;

        // 入队与执行之间的竞态防护: 状态在此重查
        // VALIDATING 为正常入口，IMPORTING 为重试入口；
        // 其余状态（取消、入队后映射被改动回退到 MAPPED 等）一律跳过
        match session.status {
            SessionStatus::Validating | SessionStatus::Importing => {}
            SessionStatus::Cancelled => {
                warn!(session_id = %session.id, "会话已取消，跳过落库任务");
                return Ok(());
            }
            other => {
                warn!(session_id = %session.id, status = %other, "会话状态不可落库，跳过任务");
                return Ok(());
            }
        }
        if session.column_mapping.is_empty() {
            return Err(ImportError::EmptyMapping);
        }

        // === 步骤 1: 重新解析源文件 ===
        let opts = ParseOptions {
            has_headers: session.has_headers,
            delimiter: session.delimiter.bytes().next().unwrap_or(b','),
        };
        let table =
            TabularFileReader.read(Path::new(&session.file_path), session.file_type, &opts)?;

        // === 步骤 2: 列映射 ===
        let mapper = FieldMapper::new(&table.columns, &session.column_mapping);
        let records: Vec<_> = table.rows.iter().map(|row| mapper.map_row(row)).collect();

        // === 步骤 3: 会话进入 IMPORTING ===
        let started = Utc::now();
        session.status = SessionStatus::Importing;
        session.started_at = Some(started);
        session.total_rows = records.len() as i64;
        session.processed_rows = 0;
        self.repo
            .update_session(&session)
            .await
            .map_err(|e| ImportError::JobExecution(e.to_string()))?;

        let importer = self
            .registry
            .get(session.import_type)
            .ok_or_else(|| ImportError::InternalError(format!(
                "导入类型无落库策略: {}",
                session.import_type
            )))?;

        // === 步骤 4: 单事务整批落库 ===
        self.progress.begin(&session.id);
        let result = {
            let mut conn = self
                .apply_conn
                .lock()
                .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;
            let tx = conn
                .transaction()
                .map_err(|e| ImportError::DatabaseTransactionError(e.to_string()))?;

            let tracker = Arc::clone(&self.progress);
            let session_id = session.id.clone();
            let mut progress = |processed: i64| {
                if processed % PROGRESS_EVERY_ROWS == 0 {
                    tracker.record(&session_id, processed);
                }
            };

            let result =
                importer.apply(&tx, &records, &session.validation_rules, &mut progress)?;

            tx.commit()
                .map_err(|e| ImportError::DatabaseTransactionError(e.to_string()))?;
            result
        };

        // === 步骤 5: 结果折叠进会话 ===
        let completed = Utc::now();
        fold_result(&mut session, result, importer.supports_rollback());
        session.status = SessionStatus::Completed;
        session.completed_at = Some(completed);
        session.processing_time_ms = Some((completed - started).num_milliseconds());

        self.repo
            .update_session(&session)
            .await
            .map_err(|e| ImportError::JobExecution(e.to_string()))?;

        info!(
            session_id = %session.id,
            success = session.success_rows,
            failed = session.failed_rows,
            skipped = session.skipped_rows,
            elapsed_ms = session.processing_time_ms.unwrap_or(0),
            "落库任务完成"
        );
        Ok(())
    }

    // ==========================================
    // 回退任务
    // ==========================================
    async fn run_rollback(&self, job: &ImportJob) -> ImportResult<()> {
        let session = self
            .repo
            .get_session(&job.session_id)
            .await
            .map_err(|e| ImportError::JobExecution(e.to_string()))?;

        // 入队与执行之间的竞态防护: 资格在此重查
        if session.rolled_back_at.is_some() {
            warn!(session_id = %session.id, "会话已回退，跳过回退任务");
            return Ok(());
        }
        let Some(ledger) = session.rollback_data.as_ref() else {
            warn!(session_id = %session.id, "会话无回退台账，跳过回退任务");
            return Ok(());
        };

        let importer = self
            .registry
            .get(session.import_type)
            .ok_or_else(|| ImportError::InternalError(format!(
                "导入类型无落库策略: {}",
                session.import_type
            )))?;

        let deleted = {
            let mut conn = self
                .apply_conn
                .lock()
                .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;
            let tx = conn
                .transaction()
                .map_err(|e| ImportError::DatabaseTransactionError(e.to_string()))?;
            let deleted = importer.rollback(&tx, ledger)?;
            tx.commit()
                .map_err(|e| ImportError::DatabaseTransactionError(e.to_string()))?;
            deleted
        };

        let by = job.requested_by.as_deref().unwrap_or("system");
        self.repo
            .mark_rolled_back(&session.id, by, Utc::now())
            .await
            .map_err(|e| ImportError::JobExecution(e.to_string()))?;

        info!(session_id = %session.id, deleted, by, "回退任务完成");
        Ok(())
    }

    /// 重试耗尽后的会话收尾
    async fn mark_session_failed(&self, session_id: &str, cause: &ImportError) {
        match self.repo.get_session(session_id).await {
            Ok(mut session) => {
                session.status = SessionStatus::Failed;
                session.completed_at = Some(Utc::now());
                let mut report = session.error_report.unwrap_or_else(ErrorReport::default);
                report.fatal = Some(cause.to_string());
                session.error_report = Some(report);
                if let Err(e) = self.repo.update_session(&session).await {
                    error!(session_id = %session_id, error = %e, "会话置 FAILED 失败");
                }
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "加载会话失败，无法标记 FAILED");
            }
        }
    }
}

fn fold_result(session: &mut ImportSession, result: ProcessResult, supports_rollback: bool) {
    session.processed_rows = result.processed;
    session.success_rows = result.success;
    session.failed_rows = result.failed;
    session.skipped_rows = result.skipped;
    session.can_rollback = supports_rollback
        && result
            .rollback_data
            .as_ref()
            .map(|l| !l.is_empty())
            .unwrap_or(false);
    session.rollback_data = result.rollback_data;
    session.success_report = Some(result.success_report);
    session.error_report = if result.error_report.rows.is_empty() && result.error_report.fatal.is_none()
    {
        None
    } else {
        Some(result.error_report)
    };
}
