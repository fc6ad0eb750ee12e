// ==========================================
// 小额信贷平台 - 导入会话 Repository 实现
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 3. 数据模型
// 职责: 实现会话与校验结果的数据访问（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::db;
use crate::domain::session::{
    ErrorReport, FieldMapping, ImportSession, RollbackLedger, SuccessReport, ValidationFinding,
    ValidationOptions,
};
use crate::domain::types::{FileType, ImportType, SessionStatus, Severity};
use crate::repository::error::RepositoryError;
use crate::repository::import_session_repo::{
    ImportSessionRepository, SessionFilter, SessionPage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// ImportSessionRepositoryImpl
// ==========================================
pub struct ImportSessionRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

const SESSION_COLUMNS: &str = r#"
    id, session_number, file_name, original_name, file_size, file_type,
    file_path, has_headers, delimiter, encoding, import_type, status,
    column_mapping, validation_rules, total_rows, processed_rows,
    success_rows, failed_rows, skipped_rows, started_at, completed_at,
    processing_time_ms, can_rollback, rollback_data, rolled_back_at,
    rolled_back_by, success_report, error_report, created_by,
    created_at, updated_at
"#;

impl ImportSessionRepositoryImpl {
    /// 创建新的 Repository 实例
    pub fn new(db_path: &str) -> Result<Self, RepositoryError> {
        let conn = db::open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 复用既有连接（测试与 AppState 共享连接时使用）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 行 → ImportSession（列序与 SESSION_COLUMNS 一致）
    fn row_to_session(row: &Row<'_>) -> Result<ImportSession, RepositoryError> {
        let file_type_raw: String = row.get(5)?;
        let import_type_raw: String = row.get(10)?;
        let status_raw: String = row.get(11)?;
        let mapping_json: String = row.get(12)?;
        let rules_json: String = row.get(13)?;
        let rollback_json: Option<String> = row.get(23)?;
        let success_json: Option<String> = row.get(26)?;
        let error_json: Option<String> = row.get(27)?;

        let column_mapping: Vec<FieldMapping> = serde_json::from_str(&mapping_json)?;
        let validation_rules: ValidationOptions = serde_json::from_str(&rules_json)?;
        let rollback_data: Option<RollbackLedger> = rollback_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let success_report: Option<SuccessReport> = success_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let error_report: Option<ErrorReport> = error_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(ImportSession {
            id: row.get(0)?,
            session_number: row.get(1)?,
            file_name: row.get(2)?,
            original_name: row.get(3)?,
            file_size: row.get(4)?,
            file_type: FileType::parse(&file_type_raw).ok_or_else(|| {
                RepositoryError::InvalidData(format!("未知文件类型: {}", file_type_raw))
            })?,
            file_path: row.get(6)?,
            has_headers: row.get::<_, i64>(7)? != 0,
            delimiter: row.get(8)?,
            encoding: row.get(9)?,
            import_type: ImportType::parse(&import_type_raw).ok_or_else(|| {
                RepositoryError::InvalidData(format!("未知导入类型: {}", import_type_raw))
            })?,
            status: SessionStatus::parse(&status_raw).ok_or_else(|| {
                RepositoryError::InvalidData(format!("未知会话状态: {}", status_raw))
            })?,
            column_mapping,
            validation_rules,
            total_rows: row.get(14)?,
            processed_rows: row.get(15)?,
            success_rows: row.get(16)?,
            failed_rows: row.get(17)?,
            skipped_rows: row.get(18)?,
            started_at: row.get(19)?,
            completed_at: row.get(20)?,
            processing_time_ms: row.get(21)?,
            can_rollback: row.get::<_, i64>(22)? != 0,
            rollback_data,
            rolled_back_at: row.get(24)?,
            rolled_back_by: row.get(25)?,
            success_report,
            error_report,
            created_by: row.get(28)?,
            created_at: row.get(29)?,
            updated_at: row.get(30)?,
        })
    }

    fn row_to_finding(row: &Row<'_>) -> Result<ValidationFinding, RepositoryError> {
        let severity_raw: String = row.get(5)?;
        Ok(ValidationFinding {
            id: row.get(0)?,
            session_id: row.get(1)?,
            row_number: row.get(2)?,
            column_name: row.get(3)?,
            field_name: row.get(4)?,
            severity: Severity::parse(&severity_raw).ok_or_else(|| {
                RepositoryError::InvalidData(format!("未知校验级别: {}", severity_raw))
            })?,
            error_code: row.get(6)?,
            message: row.get(7)?,
            expected_value: row.get(8)?,
            actual_value: row.get(9)?,
            suggested_fix: row.get(10)?,
            can_auto_fix: row.get::<_, i64>(11)? != 0,
            was_auto_fixed: row.get::<_, i64>(12)? != 0,
        })
    }
}

#[async_trait]
impl ImportSessionRepository for ImportSessionRepositoryImpl {
    async fn create_session(&self, session: &ImportSession) -> Result<(), RepositoryError> {
        let mapping_json = serde_json::to_string(&session.column_mapping)?;
        let rules_json = serde_json::to_string(&session.validation_rules)?;
        let rollback_json = session
            .rollback_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let success_json = session
            .success_report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let error_json = session
            .error_report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO import_session (
                id, session_number, file_name, original_name, file_size, file_type,
                file_path, has_headers, delimiter, encoding, import_type, status,
                column_mapping, validation_rules, total_rows, processed_rows,
                success_rows, failed_rows, skipped_rows, started_at, completed_at,
                processing_time_ms, can_rollback, rollback_data, rolled_back_at,
                rolled_back_by, success_report, error_report, created_by,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28,
                ?29, ?30, ?31
            )
            "#,
            params![
                session.id,
                session.session_number,
                session.file_name,
                session.original_name,
                session.file_size,
                session.file_type.as_str(),
                session.file_path,
                session.has_headers as i64,
                session.delimiter,
                session.encoding,
                session.import_type.as_str(),
                session.status.as_str(),
                mapping_json,
                rules_json,
                session.total_rows,
                session.processed_rows,
                session.success_rows,
                session.failed_rows,
                session.skipped_rows,
                session.started_at,
                session.completed_at,
                session.processing_time_ms,
                session.can_rollback as i64,
                rollback_json,
                session.rolled_back_at,
                session.rolled_back_by,
                success_json,
                error_json,
                session.created_by,
                session.created_at,
                session.updated_at,
            ],
        )?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<ImportSession, RepositoryError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM import_session WHERE id = ?1", SESSION_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Self::row_to_session(row),
            None => Err(RepositoryError::NotFound {
                entity: "import_session".to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn list_sessions(
        &self,
        owner: &str,
        filter: &SessionFilter,
    ) -> Result<SessionPage, RepositoryError> {
        let conn = self.lock()?;

        let mut where_clause = String::from("WHERE created_by = ?1");
        let mut args: Vec<String> = vec![owner.to_string()];
        if let Some(status) = filter.status {
            args.push(status.as_str().to_string());
            where_clause.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(import_type) = filter.import_type {
            args.push(import_type.as_str().to_string());
            where_clause.push_str(&format!(" AND import_type = ?{}", args.len()));
        }

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM import_session {}", where_clause),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM import_session {} ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}",
            SESSION_COLUMNS,
            where_clause,
            filter.limit(),
            filter.offset()
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args.iter()))?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(Self::row_to_session(row)?);
        }

        Ok(SessionPage { sessions, total })
    }

    async fn update_session(&self, session: &ImportSession) -> Result<(), RepositoryError> {
        let mapping_json = serde_json::to_string(&session.column_mapping)?;
        let rules_json = serde_json::to_string(&session.validation_rules)?;
        let rollback_json = session
            .rollback_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let success_json = session
            .success_report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let error_json = session
            .error_report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.lock()?;
        let affected = conn.execute(
            r#"
            UPDATE import_session SET
                status = ?2,
                column_mapping = ?3,
                validation_rules = ?4,
                total_rows = ?5,
                processed_rows = ?6,
                success_rows = ?7,
                failed_rows = ?8,
                skipped_rows = ?9,
                started_at = ?10,
                completed_at = ?11,
                processing_time_ms = ?12,
                can_rollback = ?13,
                rollback_data = ?14,
                rolled_back_at = ?15,
                rolled_back_by = ?16,
                success_report = ?17,
                error_report = ?18,
                updated_at = ?19
            WHERE id = ?1
            "#,
            params![
                session.id,
                session.status.as_str(),
                mapping_json,
                rules_json,
                session.total_rows,
                session.processed_rows,
                session.success_rows,
                session.failed_rows,
                session.skipped_rows,
                session.started_at,
                session.completed_at,
                session.processing_time_ms,
                session.can_rollback as i64,
                rollback_json,
                session.rolled_back_at,
                session.rolled_back_by,
                success_json,
                error_json,
                Utc::now(),
            ],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "import_session".to_string(),
                id: session.id.clone(),
            });
        }
        Ok(())
    }

    async fn update_status(&self, id: &str, status: SessionStatus) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE import_session SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), Utc::now()],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "import_session".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_progress(&self, id: &str, processed_rows: i64) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE import_session SET processed_rows = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, processed_rows, Utc::now()],
        )?;
        Ok(())
    }

    async fn mark_rolled_back(
        &self,
        id: &str,
        by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        // rolled_back_at IS NULL 条件保证至多回退一次
        let affected = conn.execute(
            r#"
            UPDATE import_session
               SET rolled_back_at = ?2, rolled_back_by = ?3, can_rollback = 0, updated_at = ?4
             WHERE id = ?1 AND rolled_back_at IS NULL
            "#,
            params![id, at, by, Utc::now()],
        )?;
        if affected == 0 {
            return Err(RepositoryError::InvalidData(format!(
                "会话已回退或不存在: {}",
                id
            )));
        }
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM import_session WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "import_session".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn replace_findings(
        &self,
        session_id: &str,
        findings: &[ValidationFinding],
    ) -> Result<usize, RepositoryError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        tx.execute(
            "DELETE FROM validation_finding WHERE session_id = ?1",
            params![session_id],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO validation_finding (
                    id, session_id, row_number, column_name, field_name, severity,
                    error_code, message, expected_value, actual_value, suggested_fix,
                    can_auto_fix, was_auto_fixed
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
            )?;
            for f in findings {
                stmt.execute(params![
                    f.id,
                    f.session_id,
                    f.row_number,
                    f.column_name,
                    f.field_name,
                    f.severity.as_str(),
                    f.error_code,
                    f.message,
                    f.expected_value,
                    f.actual_value,
                    f.suggested_fix,
                    f.can_auto_fix as i64,
                    f.was_auto_fixed as i64,
                ])?;
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(findings.len())
    }

    async fn list_findings(
        &self,
        session_id: &str,
    ) -> Result<Vec<ValidationFinding>, RepositoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, session_id, row_number, column_name, field_name, severity,
                   error_code, message, expected_value, actual_value, suggested_fix,
                   can_auto_fix, was_auto_fixed
              FROM validation_finding
             WHERE session_id = ?1
             ORDER BY row_number, field_name
            "#,
        )?;
        let mut rows = stmt.query(params![session_id])?;
        let mut findings = Vec::new();
        while let Some(row) = rows.next()? {
            findings.push(Self::row_to_finding(row)?);
        }
        Ok(findings)
    }

    async fn next_session_number(&self) -> Result<String, RepositoryError> {
        let conn = self.lock()?;
        let today = Utc::now().format("%Y%m%d").to_string();
        let prefix = format!("IMP-{}-", today);
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_session WHERE session_number LIKE ?1",
            params![format!("{}%", prefix)],
            |row| row.get(0),
        )?;
        Ok(format!("{}{:04}", prefix, count + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, ensure_schema};
    use crate::domain::types::DuplicateHandling;

    fn test_repo() -> ImportSessionRepositoryImpl {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        ImportSessionRepositoryImpl::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn sample_session(id: &str, number: &str, owner: &str) -> ImportSession {
        let now = Utc::now();
        ImportSession {
            id: id.to_string(),
            session_number: number.to_string(),
            file_name: format!("{}.csv", id),
            original_name: "members.csv".to_string(),
            file_size: 1024,
            file_type: FileType::Csv,
            file_path: format!("/tmp/{}.csv", id),
            has_headers: true,
            delimiter: ",".to_string(),
            encoding: "utf-8".to_string(),
            import_type: ImportType::Users,
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
        }
    }

    #[tokio::test]
    async fn test_create_and_get_roundtrip() {
        let repo = test_repo();
        let mut session = sample_session("s1", "IMP-20260101-0001", "admin");
        session.column_mapping = vec![FieldMapping {
            column_name: "Email".to_string(),
            field_name: "email".to_string(),
            transform: None,
            default_value: None,
            required: true,
        }];
        session.validation_rules.duplicate_handling = DuplicateHandling::Warn;

        repo.create_session(&session).await.unwrap();
        let loaded = repo.get_session("s1").await.unwrap();

        assert_eq!(loaded.session_number, "IMP-20260101-0001");
        assert_eq!(loaded.column_mapping.len(), 1);
        assert_eq!(loaded.column_mapping[0].field_name, "email");
        assert_eq!(
            loaded.validation_rules.duplicate_handling,
            DuplicateHandling::Warn
        );
        assert_eq!(loaded.status, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn test_get_missing_returns_not_found() {
        let repo = test_repo();
        let err = repo.get_session("nope").await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_sessions_scoped_and_filtered() {
        let repo = test_repo();
        repo.create_session(&sample_session("s1", "IMP-20260101-0001", "alice"))
            .await
            .unwrap();
        repo.create_session(&sample_session("s2", "IMP-20260101-0002", "alice"))
            .await
            .unwrap();
        repo.create_session(&sample_session("s3", "IMP-20260101-0003", "bob"))
            .await
            .unwrap();
        repo.update_status("s2", SessionStatus::Completed).await.unwrap();

        let filter = SessionFilter {
            page: 1,
            limit: 10,
            ..Default::default()
        };
        let page = repo.list_sessions("alice", &filter).await.unwrap();
        assert_eq!(page.total, 2);

        let filter = SessionFilter {
            status: Some(SessionStatus::Completed),
            page: 1,
            limit: 10,
            ..Default::default()
        };
        let page = repo.list_sessions("alice", &filter).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.sessions[0].id, "s2");
    }

    #[tokio::test]
    async fn test_replace_findings_is_full_rebuild() {
        let repo = test_repo();
        repo.create_session(&sample_session("s1", "IMP-20260101-0001", "admin"))
            .await
            .unwrap();

        let make = |id: &str, row: i64| ValidationFinding {
            id: id.to_string(),
            session_id: "s1".to_string(),
            row_number: row,
            column_name: Some("Email".to_string()),
            field_name: Some("email".to_string()),
            severity: Severity::Error,
            error_code: "INVALID_EMAIL".to_string(),
            message: "邮箱格式无效".to_string(),
            expected_value: None,
            actual_value: Some("bad".to_string()),
            suggested_fix: None,
            can_auto_fix: false,
            was_auto_fixed: false,
        };

        repo.replace_findings("s1", &[make("f1", 1), make("f2", 2)])
            .await
            .unwrap();
        repo.replace_findings("s1", &[make("f3", 5)]).await.unwrap();

        let findings = repo.list_findings("s1").await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].id, "f3");
        assert_eq!(findings[0].row_number, 5);
    }

    #[tokio::test]
    async fn test_mark_rolled_back_only_once() {
        let repo = test_repo();
        repo.create_session(&sample_session("s1", "IMP-20260101-0001", "admin"))
            .await
            .unwrap();

        repo.mark_rolled_back("s1", "admin", Utc::now()).await.unwrap();
        let loaded = repo.get_session("s1").await.unwrap();
        assert!(loaded.rolled_back_at.is_some());
        assert_eq!(loaded.rolled_back_by.as_deref(), Some("admin"));
        assert!(!loaded.can_rollback);

        // 第二次回退被拒绝
        let err = repo.mark_rolled_back("s1", "admin", Utc::now()).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_delete_cascades_findings() {
        let repo = test_repo();
        repo.create_session(&sample_session("s1", "IMP-20260101-0001", "admin"))
            .await
            .unwrap();
        repo.replace_findings(
            "s1",
            &[ValidationFinding {
                id: "f1".to_string(),
                session_id: "s1".to_string(),
                row_number: 1,
                column_name: None,
                field_name: Some("email".to_string()),
                severity: Severity::Warning,
                error_code: "DUPLICATE_VALUE".to_string(),
                message: "重复".to_string(),
                expected_value: None,
                actual_value: None,
                suggested_fix: None,
                can_auto_fix: false,
                was_auto_fixed: false,
            }],
        )
        .await
        .unwrap();

        repo.delete_session("s1").await.unwrap();
        let findings = repo.list_findings("s1").await.unwrap();
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_session_number_increments_per_day() {
        let repo = test_repo();
        let n1 = repo.next_session_number().await.unwrap();
        assert!(n1.starts_with("IMP-"));
        assert!(n1.ends_with("-0001"));

        let mut s = sample_session("s1", &n1, "admin");
        s.session_number = n1.clone();
        repo.create_session(&s).await.unwrap();

        let n2 = repo.next_session_number().await.unwrap();
        assert!(n2.ends_with("-0002"));
    }
}
