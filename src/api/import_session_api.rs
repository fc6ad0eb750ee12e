// ==========================================
// 小额信贷平台 - 导入会话 API
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 4. 会话生命周期 / 6. 任务编排
// 职责: 封装导入会话的全部同步操作；落库与回退只入队，不在请求内执行
// 红线: 所有操作按 created_by 做归属检查
// ==========================================

use crate::api::error::ApiError;
use crate::config::ImportConfigReader;
use crate::domain::session::{
    FieldMapping, ImportSession, ValidationFinding, ValidationOptions,
};
use crate::domain::types::{FileType, ImportType, SessionStatus, Severity};
use crate::importer::file_reader::{ParseOptions, TabularFileReader};
use crate::importer::field_mapper::FieldMapper;
use crate::importer::job_queue::{ImportJobQueue, JobType, QueueStats};
use crate::importer::progress::ProgressTracker;
use crate::importer::suggest::{suggest_mapping, ColumnSuggestion};
use crate::importer::validator::{RuleSet, ValidationEngine};
use crate::repository::import_session_repo::{
    ImportSessionRepository, SessionFilter, SessionPage,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

// ==========================================
// 响应类型
// ==========================================

/// 预览响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub columns: Vec<String>,
    pub sample_data: Vec<Vec<String>>,
    pub total_rows: usize,
    pub encoding: String,
    pub has_headers: bool,
    pub suggested_mapping: Vec<ColumnSuggestion>,
}

/// 校验汇总响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub is_valid: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    pub auto_fixable_count: usize,
    pub findings: Vec<ValidationFinding>,
}

/// 任务入队响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: String,
    pub session_id: String,
}

/// 进度响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub processed_rows: i64,
    pub total_rows: i64,
    /// 0-100 向下取整
    pub percentage: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
}

/// 结果报告响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub session: ImportSession,
    pub findings: Vec<ValidationFinding>,
}

// ==========================================
// ImportSessionApi
// ==========================================
pub struct ImportSessionApi {
    repo: Arc<dyn ImportSessionRepository>,
    queue: Arc<ImportJobQueue>,
    config: Arc<dyn ImportConfigReader>,
    engine: ValidationEngine,
    /// 落库进行中的行级进度（与执行器共用）
    progress: Arc<ProgressTracker>,
    upload_dir: PathBuf,
}

impl ImportSessionApi {
    pub fn new(
        repo: Arc<dyn ImportSessionRepository>,
        queue: Arc<ImportJobQueue>,
        config: Arc<dyn ImportConfigReader>,
        progress: Arc<ProgressTracker>,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            repo,
            queue,
            config,
            engine: ValidationEngine::new(),
            progress,
            upload_dir,
        }
    }

    /// 归属检查: 非本人会话一律拒绝
    async fn get_owned(&self, owner: &str, id: &str) -> Result<ImportSession, ApiError> {
        let session = self.repo.get_session(id).await?;
        if session.created_by != owner {
            return Err(ApiError::Forbidden(format!("会话不属于当前用户: {}", id)));
        }
        Ok(session)
    }

    // ==========================================
    // 创建会话（文件上传）
    // ==========================================
    pub async fn create_session(
        &self,
        owner: &str,
        original_name: &str,
        import_type: ImportType,
        has_headers: bool,
        delimiter: Option<String>,
        bytes: &[u8],
    ) -> Result<ImportSession, ApiError> {
        // 扩展名检查在任何 I/O 之前
        let ext = original_name
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_lowercase();
        let file_type = FileType::from_extension(&ext)
            .ok_or_else(|| ApiError::UnsupportedFormat(original_name.to_string()))?;

        let limit = self
            .config
            .get_max_file_size_bytes()
            .await
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        if bytes.len() as i64 > limit {
            return Err(ApiError::FileTooLarge {
                size: bytes.len() as i64,
                limit,
            });
        }
        if bytes.is_empty() {
            return Err(ApiError::InvalidInput("上传文件为空".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let file_name = format!("{}.{}", id, ext);
        let file_path = self.upload_dir.join(&file_name);
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| ApiError::InternalError(format!("上传目录创建失败: {}", e)))?;
        tokio::fs::write(&file_path, bytes)
            .await
            .map_err(|e| ApiError::InternalError(format!("文件落盘失败: {}", e)))?;

        let session_number = self.repo.next_session_number().await?;
        let now = Utc::now();
        let session = ImportSession {
            id: id.clone(),
            session_number,
            file_name,
            original_name: original_name.to_string(),
            file_size: bytes.len() as i64,
            file_type,
            file_path: file_path.display().to_string(),
            has_headers,
            delimiter: delimiter.unwrap_or_else(|| ",".to_string()),
            encoding: "utf-8".to_string(),
            import_type,
            status: SessionStatus::Pending,
            column_mapping: Vec::new(),
            validation_rules: ValidationOptions::default(),
            total_rows: 0,
            processed_rows: 0,
            success_rows: 0,
            failed_rows: 0,
            skipped_rows: 0,
            started_at: None,
            completed_at: None,
            processing_time_ms: None,
            can_rollback: false,
            rollback_data: None,
            rolled_back_at: None,
            rolled_back_by: None,
            success_report: None,
            error_report: None,
            created_by: owner.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.repo.create_session(&session).await?;

        info!(
            session_id = %session.id,
            session_number = %session.session_number,
            import_type = %session.import_type,
            file_size = session.file_size,
            "导入会话已创建"
        );
        Ok(session)
    }

    // ==========================================
    // 查询
    // ==========================================
    pub async fn list_sessions(
        &self,
        owner: &str,
        filter: &SessionFilter,
    ) -> Result<SessionPage, ApiError> {
        Ok(self.repo.list_sessions(owner, filter).await?)
    }

    pub async fn get_session(&self, owner: &str, id: &str) -> Result<ImportSession, ApiError> {
        self.get_owned(owner, id).await
    }

    // ==========================================
    // 预览（解析 + 映射建议）
    // ==========================================
    pub async fn preview(&self, owner: &str, id: &str) -> Result<PreviewResponse, ApiError> {
        let mut session = self.get_owned(owner, id).await?;
        if session.status.is_terminal() || session.status == SessionStatus::Importing {
            return Err(ApiError::InvalidStateTransition {
                from: session.status.to_string(),
                to: SessionStatus::Parsing.to_string(),
            });
        }

        let opts = ParseOptions {
            has_headers: session.has_headers,
            delimiter: session.delimiter.bytes().next().unwrap_or(b','),
        };
        let table = TabularFileReader.read(
            std::path::Path::new(&session.file_path),
            session.file_type,
            &opts,
        )?;

        let sample_size = self
            .config
            .get_preview_sample_size()
            .await
            .map_err(|e| ApiError::InternalError(e.to_string()))? as usize;

        // 解析结果回写会话（总行数与实际编码）
        session.total_rows = table.total_rows as i64;
        session.encoding = table.encoding.clone();
        if session.status == SessionStatus::Pending {
            session.status = SessionStatus::Parsing;
        }
        self.repo.update_session(&session).await?;

        let suggested_mapping = suggest_mapping(&table.columns);
        let preview = table.into_preview(sample_size);

        Ok(PreviewResponse {
            columns: preview.columns,
            sample_data: preview.rows,
            total_rows: preview.total_rows,
            encoding: preview.encoding,
            has_headers: session.has_headers,
            suggested_mapping,
        })
    }

    // ==========================================
    // 列映射（整体替换）
    // ==========================================
    pub async fn update_mapping(
        &self,
        owner: &str,
        id: &str,
        mapping: Vec<FieldMapping>,
        rules: Option<ValidationOptions>,
    ) -> Result<ImportSession, ApiError> {
        let mut session = self.get_owned(owner, id).await?;
        if session.status.is_terminal() || session.status == SessionStatus::Importing {
            return Err(ApiError::InvalidStateTransition {
                from: session.status.to_string(),
                to: SessionStatus::Mapped.to_string(),
            });
        }
        if mapping.is_empty() {
            return Err(ApiError::InvalidInput("列映射不能为空".to_string()));
        }
        // 落库任务已入队时映射冻结，防止未校验的映射被落库
        if self.queue.has_active_job(id)? {
            return Err(ApiError::BusinessRuleViolation(
                "会话已有进行中的落库任务，映射不可修改".to_string(),
            ));
        }

        session.column_mapping = mapping;
        if let Some(rules) = rules {
            session.validation_rules = rules;
        }
        session.status = SessionStatus::Mapped;
        self.repo.update_session(&session).await?;
        Ok(session)
    }

    // ==========================================
    // 校验（结果全量替换）
    // ==========================================
    pub async fn validate(&self, owner: &str, id: &str) -> Result<ValidationSummary, ApiError> {
        let mut session = self.get_owned(owner, id).await?;
        if !matches!(
            session.status,
            SessionStatus::Mapped | SessionStatus::Validating
        ) {
            return Err(ApiError::InvalidStateTransition {
                from: session.status.to_string(),
                to: SessionStatus::Validating.to_string(),
            });
        }
        if session.column_mapping.is_empty() {
            return Err(ApiError::InvalidInput(
                "列映射为空，无法进入校验阶段".to_string(),
            ));
        }
        // 落库任务已入队时校验结果冻结
        if self.queue.has_active_job(id)? {
            return Err(ApiError::BusinessRuleViolation(
                "会话已有进行中的落库任务，不可重新校验".to_string(),
            ));
        }

        // === 步骤 1: 解析 + 映射 ===
        let opts = ParseOptions {
            has_headers: session.has_headers,
            delimiter: session.delimiter.bytes().next().unwrap_or(b','),
        };
        let table = TabularFileReader.read(
            std::path::Path::new(&session.file_path),
            session.file_type,
            &opts,
        )?;
        let mapper = FieldMapper::new(&table.columns, &session.column_mapping);
        let records: Vec<_> = table.rows.iter().map(|row| mapper.map_row(row)).collect();

        // === 步骤 2: 规则集校验 ===
        let rule_set = RuleSet::for_import_type(session.import_type);
        let report = self.engine.validate(
            &session.id,
            &records,
            &session.column_mapping,
            &rule_set,
            &session.validation_rules,
        );

        // === 步骤 3: 结果持久化 ===
        self.repo.replace_findings(&session.id, &report.findings).await?;
        session.total_rows = table.total_rows as i64;
        session.status = SessionStatus::Validating;
        self.repo.update_session(&session).await?;

        info!(
            session_id = %session.id,
            errors = report.error_count,
            warnings = report.warning_count,
            "校验完成"
        );

        Ok(ValidationSummary {
            is_valid: report.is_valid(),
            error_count: report.error_count,
            warning_count: report.warning_count,
            info_count: report.info_count,
            auto_fixable_count: report.auto_fixable_count,
            findings: report.findings,
        })
    }

    // ==========================================
    // 启动落库（只入队）
    // ==========================================
    pub async fn start_import(&self, owner: &str, id: &str) -> Result<JobAccepted, ApiError> {
        let session = self.get_owned(owner, id).await?;
        if session.status != SessionStatus::Validating {
            return Err(ApiError::InvalidStateTransition {
                from: session.status.to_string(),
                to: SessionStatus::Importing.to_string(),
            });
        }

        // ERROR 级结果存在时禁止启动
        let findings = self.repo.list_findings(id).await?;
        let error_count = findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .count();
        if error_count > 0 {
            return Err(ApiError::BusinessRuleViolation(format!(
                "存在 {} 条 ERROR 级校验结果，需修正后重新校验",
                error_count
            )));
        }

        let job_id = self.queue.submit(id, JobType::Apply, None)?;
        Ok(JobAccepted {
            job_id,
            session_id: id.to_string(),
        })
    }

    // ==========================================
    // 进度
    // ==========================================
    pub async fn progress(&self, owner: &str, id: &str) -> Result<ProgressResponse, ApiError> {
        let session = self.get_owned(owner, id).await?;

        // 落库事务提交前 processed_rows 不可见，IMPORTING 期间叠加内存进度
        let processed_rows = if session.status == SessionStatus::Importing {
            self.progress
                .get(&session.id)
                .unwrap_or(session.processed_rows)
                .max(session.processed_rows)
        } else {
            session.processed_rows
        };

        let percentage = match session.status {
            SessionStatus::Completed => 100,
            _ if session.total_rows > 0 => {
                (processed_rows * 100 / session.total_rows).clamp(0, 100)
            }
            _ => 0,
        };

        // 线性外推: 已用时间 / 已处理行 × 剩余行
        let estimated_completion = match (session.status, session.started_at) {
            (SessionStatus::Importing, Some(started))
                if processed_rows > 0 && session.total_rows > processed_rows =>
            {
                let elapsed_ms = (Utc::now() - started).num_milliseconds().max(1);
                let remaining = session.total_rows - processed_rows;
                let remaining_ms = elapsed_ms * remaining / processed_rows;
                Some(Utc::now() + Duration::milliseconds(remaining_ms))
            }
            _ => None,
        };

        Ok(ProgressResponse {
            session_id: session.id,
            status: session.status,
            processed_rows,
            total_rows: session.total_rows,
            percentage,
            estimated_completion,
        })
    }

    // ==========================================
    // 结果报告
    // ==========================================
    pub async fn report(&self, owner: &str, id: &str) -> Result<ReportResponse, ApiError> {
        let session = self.get_owned(owner, id).await?;
        let findings = self.repo.list_findings(id).await?;
        Ok(ReportResponse { session, findings })
    }

    // ==========================================
    // 回退（只入队）
    // ==========================================
    pub async fn rollback(&self, owner: &str, id: &str) -> Result<JobAccepted, ApiError> {
        let session = self.get_owned(owner, id).await?;

        if session.status != SessionStatus::Completed {
            return Err(ApiError::BusinessRuleViolation(
                "仅 COMPLETED 会话可回退".to_string(),
            ));
        }
        if session.rolled_back_at.is_some() {
            return Err(ApiError::BusinessRuleViolation(
                "会话已回退，不可重复回退".to_string(),
            ));
        }
        let eligible = session.can_rollback
            && session
                .rollback_data
                .as_ref()
                .map(|l| !l.is_empty())
                .unwrap_or(false);
        if !eligible {
            return Err(ApiError::BusinessRuleViolation(
                "会话无可回退的新建记录".to_string(),
            ));
        }

        let job_id = self
            .queue
            .submit(id, JobType::Rollback, Some(owner.to_string()))?;
        Ok(JobAccepted {
            job_id,
            session_id: id.to_string(),
        })
    }

    // ==========================================
    // 取消
    // ==========================================
    pub async fn cancel(&self, owner: &str, id: &str) -> Result<ImportSession, ApiError> {
        let mut session = self.get_owned(owner, id).await?;
        if !session.status.can_cancel() {
            return Err(ApiError::InvalidStateTransition {
                from: session.status.to_string(),
                to: SessionStatus::Cancelled.to_string(),
            });
        }

        session.status = SessionStatus::Cancelled;
        self.repo.update_session(&session).await?;
        // 已入队未执行的任务一并取消
        let cancelled = self.queue.cancel_for_session(id)?;
        info!(session_id = %id, cancelled_jobs = cancelled, "会话已取消");
        Ok(session)
    }

    // ==========================================
    // 删除（会话 + 落盘文件）
    // ==========================================
    pub async fn delete(&self, owner: &str, id: &str) -> Result<(), ApiError> {
        let session = self.get_owned(owner, id).await?;
        if session.status == SessionStatus::Importing {
            return Err(ApiError::BusinessRuleViolation(
                "落库进行中的会话不可删除".to_string(),
            ));
        }

        // 文件缺失不阻断删除
        let _ = tokio::fs::remove_file(&session.file_path).await;
        self.repo.delete_session(id).await?;
        info!(session_id = %id, "会话已删除");
        Ok(())
    }

    // ==========================================
    // 队列统计
    // ==========================================
    pub fn queue_stats(&self) -> Result<QueueStats, ApiError> {
        Ok(self.queue.get_queue_stats()?)
    }
}
