// ==========================================
// 小额信贷平台 - 导入任务队列管理器
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 6. 任务编排
// 职责: 管理落库/回退任务队列（SQLite 持久化，进程重启不丢任务）
// 重试: 指数退避（基础间隔 × 2^重试次数），默认最多 3 次
// ==========================================

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::importer::error::{ImportError, ImportResult};

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    /// 落库（校验通过后的批量写入）
    Apply,
    /// 回退（删除台账中的新建记录）
    Rollback,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Apply => "APPLY",
            JobType::Rollback => "ROLLBACK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "APPLY" => Some(JobType::Apply),
            "ROLLBACK" => Some(JobType::Rollback),
            _ => None,
        }
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => JobStatus::Pending,
            "RUNNING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "CANCELLED" => JobStatus::Cancelled,
            _ => JobStatus::Failed,
        }
    }
}

/// 导入任务
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub job_id: String,
    pub session_id: String,
    pub job_type: JobType,
    /// 回退任务的操作人（落库任务为 None）
    pub requested_by: Option<String>,
    pub status: JobStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    /// 早于该时刻不出队（退避窗口）
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ImportJob {
    pub fn new(session_id: &str, job_type: JobType, requested_by: Option<String>, max_retries: i32) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            job_type,
            requested_by,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries,
            next_attempt_at: now,
            created_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// 是否还有重试额度
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// 队列统计
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

// ==========================================
// ImportJobQueue - 任务队列管理器
// ==========================================
pub struct ImportJobQueue {
    conn: Arc<Mutex<Connection>>,
    /// 指数退避基础间隔（毫秒）
    backoff_base_ms: i64,
    default_max_retries: i32,
}

impl ImportJobQueue {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        backoff_base_ms: i64,
        default_max_retries: i32,
    ) -> ImportResult<Self> {
        let queue = Self {
            conn,
            backoff_base_ms,
            default_max_retries,
        };
        queue.ensure_queue_table()?;
        Ok(queue)
    }

    fn lock(&self) -> ImportResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))
    }

    /// 确保任务队列表存在
    fn ensure_queue_table(&self) -> ImportResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS import_job_queue (
                job_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                job_type TEXT NOT NULL,
                requested_by TEXT,
                status TEXT NOT NULL DEFAULT 'PENDING',
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                next_attempt_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                error_message TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_import_job_queue_status
              ON import_job_queue(status, next_attempt_at);

            CREATE INDEX IF NOT EXISTS idx_import_job_queue_session
              ON import_job_queue(session_id, status);
            "#,
        )?;
        Ok(())
    }

    /// 提交任务到队列
    pub fn enqueue(&self, job: ImportJob) -> ImportResult<String> {
        let conn = self.lock()?;

        // 同一会话已有未完成任务时拒绝重复提交
        let active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_job_queue WHERE session_id = ?1 AND status IN ('PENDING', 'RUNNING')",
            params![job.session_id],
            |row| row.get(0),
        )?;
        if active > 0 {
            return Err(ImportError::JobExecution(format!(
                "会话已有进行中的任务: {}",
                job.session_id
            )));
        }

        conn.execute(
            r#"
            INSERT INTO import_job_queue (
                job_id, session_id, job_type, requested_by, status,
                retry_count, max_retries, next_attempt_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                job.job_id,
                job.session_id,
                job.job_type.as_str(),
                job.requested_by,
                job.status.as_str(),
                job.retry_count,
                job.max_retries,
                job.next_attempt_at,
                job.created_at,
            ],
        )?;

        tracing::info!(job_id = %job.job_id, session_id = %job.session_id, job_type = %job.job_type.as_str(), "任务已加入队列");
        Ok(job.job_id)
    }

    /// 以默认重试配置构造并提交任务
    pub fn submit(
        &self,
        session_id: &str,
        job_type: JobType,
        requested_by: Option<String>,
    ) -> ImportResult<String> {
        self.enqueue(ImportJob::new(
            session_id,
            job_type,
            requested_by,
            self.default_max_retries,
        ))
    }

    /// 取出下一个到期的待执行任务并置为 RUNNING
    pub fn dequeue(&self) -> ImportResult<Option<ImportJob>> {
        let conn = self.lock()?;

        let job_opt = conn
            .query_row(
                &format!(
                    "SELECT {} FROM import_job_queue \
                     WHERE status = 'PENDING' AND next_attempt_at <= ?1 \
                     ORDER BY created_at ASC LIMIT 1",
                    JOB_COLUMNS
                ),
                params![Utc::now()],
                row_to_job,
            )
            .optional()?;

        if let Some(mut job) = job_opt {
            let started = Utc::now();
            conn.execute(
                "UPDATE import_job_queue SET status = 'RUNNING', started_at = ?1 WHERE job_id = ?2",
                params![started, job.job_id],
            )?;
            job.status = JobStatus::Running;
            job.started_at = Some(started);
            Ok(Some(job))
        } else {
            Ok(None)
        }
    }

    /// 标记任务完成
    pub fn complete(&self, job_id: &str) -> ImportResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE import_job_queue SET status = 'COMPLETED', completed_at = ?1 WHERE job_id = ?2",
            params![Utc::now(), job_id],
        )?;
        tracing::info!(job_id = %job_id, "任务执行成功");
        Ok(())
    }

    /// 标记任务失败；还有重试额度时重新入队并按指数退避
    ///
    /// 返回 true 表示已安排重试
    pub fn fail(&self, job: &ImportJob, error_message: &str) -> ImportResult<bool> {
        let conn = self.lock()?;
        let retry_count = job.retry_count + 1;

        if retry_count < job.max_retries {
            // 退避窗口: base × 2^已重试次数
            let backoff_ms = self.backoff_base_ms * (1i64 << job.retry_count);
            let next_attempt = Utc::now() + Duration::milliseconds(backoff_ms);
            conn.execute(
                r#"
                UPDATE import_job_queue
                   SET status = 'PENDING', retry_count = ?1, error_message = ?2, next_attempt_at = ?3
                 WHERE job_id = ?4
                "#,
                params![retry_count, error_message, next_attempt, job.job_id],
            )?;
            tracing::warn!(
                job_id = %job.job_id,
                retry_count,
                backoff_ms,
                error = %error_message,
                "任务失败，已安排重试"
            );
            Ok(true)
        } else {
            conn.execute(
                r#"
                UPDATE import_job_queue
                   SET status = 'FAILED', retry_count = ?1, error_message = ?2, completed_at = ?3
                 WHERE job_id = ?4
                "#,
                params![retry_count, error_message, Utc::now(), job.job_id],
            )?;
            tracing::error!(
                job_id = %job.job_id,
                retry_count,
                error = %error_message,
                "任务失败，已达最大重试次数"
            );
            Ok(false)
        }
    }

    /// 某会话是否存在未完成任务（PENDING / RUNNING）
    pub fn has_active_job(&self, session_id: &str) -> ImportResult<bool> {
        let conn = self.lock()?;
        let active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_job_queue WHERE session_id = ?1 AND status IN ('PENDING', 'RUNNING')",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(active > 0)
    }

    /// 取消某会话的全部待执行任务，返回取消数
    pub fn cancel_for_session(&self, session_id: &str) -> ImportResult<usize> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE import_job_queue SET status = 'CANCELLED', completed_at = ?1 \
             WHERE session_id = ?2 AND status = 'PENDING'",
            params![Utc::now(), session_id],
        )?;
        Ok(affected)
    }

    /// 按 ID 查询任务
    pub fn get_job(&self, job_id: &str) -> ImportResult<Option<ImportJob>> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                &format!("SELECT {} FROM import_job_queue WHERE job_id = ?1", JOB_COLUMNS),
                params![job_id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// 队列统计
    pub fn get_queue_stats(&self) -> ImportResult<QueueStats> {
        let conn = self.lock()?;
        let mut stats = QueueStats::default();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM import_job_queue GROUP BY status")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            match status.as_str() {
                "PENDING" => stats.pending = count,
                "RUNNING" => stats.running = count,
                "COMPLETED" => stats.completed = count,
                "FAILED" => stats.failed = count,
                "CANCELLED" => stats.cancelled = count,
                _ => {}
            }
        }
        Ok(stats)
    }
}

const JOB_COLUMNS: &str = "job_id, session_id, job_type, requested_by, status, retry_count, \
     max_retries, next_attempt_at, created_at, started_at, completed_at, error_message";

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<ImportJob> {
    let job_type_raw: String = row.get(2)?;
    let status_raw: String = row.get(4)?;
    Ok(ImportJob {
        job_id: row.get(0)?,
        session_id: row.get(1)?,
        job_type: JobType::parse(&job_type_raw).unwrap_or(JobType::Apply),
        requested_by: row.get(3)?,
        status: JobStatus::parse(&status_raw),
        retry_count: row.get(5)?,
        max_retries: row.get(6)?,
        next_attempt_at: row.get(7)?,
        created_at: row.get(8)?,
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
        error_message: row.get(11)?,
    })
}
