// ==========================================
// 小额信贷平台 - 用户导入策略
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 5. 落库策略 (USERS)
// 自然键: email（不区分大小写）
// 新建账号: 激活状态 PENDING_ACTIVATION，密码为占位符
// ==========================================

use crate::domain::session::{
    ProcessResult, RecordRef, RollbackLedger, RowError, ValidationOptions,
};
use crate::domain::types::{DuplicateHandling, ImportType};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::MappedRecord;
use crate::importer::strategy::{EntityImporter, ProgressFn};
use crate::repository::entity_store;
use rusqlite::Transaction;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

pub struct UserImporter;

impl EntityImporter for UserImporter {
    fn import_type(&self) -> ImportType {
        ImportType::Users
    }

    fn supports_rollback(&self) -> bool {
        true
    }

    fn apply(
        &self,
        tx: &Transaction,
        records: &[MappedRecord],
        opts: &ValidationOptions,
        progress: ProgressFn<'_>,
    ) -> ImportResult<ProcessResult> {
        let mut result = ProcessResult::default();
        let mut created_ids: Vec<String> = Vec::new();
        let mut seen_in_batch: HashSet<String> = HashSet::new();

        for (idx, record) in records.iter().enumerate() {
            let row_number = (idx + 1) as i64;
            result.processed += 1;

            match import_row(tx, record, opts, &mut seen_in_batch) {
                Ok(RowOutcome::Created { id, email }) => {
                    result.success += 1;
                    result.success_report.created.push(RecordRef {
                        row_number,
                        record_id: id.clone(),
                        natural_key: Some(email),
                    });
                    created_ids.push(id);
                }
                Ok(RowOutcome::Updated { id, email }) => {
                    result.success += 1;
                    result.success_report.updated.push(RecordRef {
                        row_number,
                        record_id: id,
                        natural_key: Some(email),
                    });
                }
                Ok(RowOutcome::Skipped { reason }) => {
                    result.skipped += 1;
                    result.error_report.rows.push(RowError {
                        row_number,
                        message: reason,
                    });
                }
                Err(ImportError::BusinessRule { message, .. }) => {
                    result.failed += 1;
                    result.error_report.rows.push(RowError {
                        row_number,
                        message,
                    });
                }
                Err(other) => return Err(other),
            }

            progress(row_number);
        }

        debug!(
            created = created_ids.len(),
            updated = result.success_report.updated.len(),
            "用户导入策略完成"
        );

        if !created_ids.is_empty() {
            result.rollback_data = Some(RollbackLedger::CreatedUsers(created_ids));
        }
        Ok(result)
    }

    fn rollback(&self, tx: &Transaction, ledger: &RollbackLedger) -> ImportResult<usize> {
        let RollbackLedger::CreatedUsers(ids) = ledger else {
            return Err(ImportError::RollbackRefused(
                "回退台账类型与导入类型不匹配".to_string(),
            ));
        };
        let mut deleted = 0;
        for id in ids {
            deleted += entity_store::delete_user_by_id(tx, id)?;
        }
        Ok(deleted)
    }
}

enum RowOutcome {
    Created { id: String, email: String },
    Updated { id: String, email: String },
    Skipped { reason: String },
}

fn import_row(
    tx: &Transaction,
    record: &MappedRecord,
    opts: &ValidationOptions,
    seen_in_batch: &mut HashSet<String>,
) -> ImportResult<RowOutcome> {
    let email = record
        .get("email")
        .map(|v| v.trim().to_string())
        .unwrap_or_default();
    if email.is_empty() {
        return Ok(RowOutcome::Skipped {
            reason: "缺少自然键 email".to_string(),
        });
    }

    // SKIP 策略: 批次内第二次出现的邮箱直接跳过
    let normalized = email.to_lowercase();
    if !seen_in_batch.insert(normalized)
        && opts.duplicate_handling == DuplicateHandling::Skip
    {
        return Ok(RowOutcome::Skipped {
            reason: format!("批次内重复邮箱已跳过: {}", email),
        });
    }

    match entity_store::find_user_by_email(tx, &email).map_err(row_error)? {
        Some(id) => {
            entity_store::update_user(tx, &id, record).map_err(row_error)?;
            Ok(RowOutcome::Updated { id, email })
        }
        None => {
            let id = Uuid::new_v4().to_string();
            entity_store::create_user(tx, &id, &email, record).map_err(row_error)?;
            Ok(RowOutcome::Created { id, email })
        }
    }
}

/// 行级 SQLite 错误降级为业务错误（不中断整批）
fn row_error(e: rusqlite::Error) -> ImportError {
    ImportError::BusinessRule {
        row: 0, // 行号由调用方补充到报告
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, ensure_schema};
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        conn
    }

    fn record(pairs: &[(&str, &str)]) -> MappedRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_create_then_update_same_email() {
        let mut conn = test_conn();
        let importer = UserImporter;
        let opts = ValidationOptions::default();

        let tx = conn.transaction().unwrap();
        let result = importer
            .apply(
                &tx,
                &[record(&[("email", "a@x.com"), ("firstName", "Alice")])],
                &opts,
                &mut |_| {},
            )
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(result.success, 1);
        assert_eq!(result.success_report.created.len(), 1);

        // 同邮箱第二次导入走更新路径，不进台账
        let tx = conn.transaction().unwrap();
        let result = importer
            .apply(
                &tx,
                &[record(&[("email", "a@x.com"), ("firstName", "Alicia")])],
                &opts,
                &mut |_| {},
            )
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(result.success_report.updated.len(), 1);
        assert!(result.rollback_data.is_none());
    }

    #[test]
    fn test_missing_email_is_skipped() {
        let mut conn = test_conn();
        let importer = UserImporter;
        let tx = conn.transaction().unwrap();

        let result = importer
            .apply(
                &tx,
                &[record(&[("firstName", "NoEmail")])],
                &ValidationOptions::default(),
                &mut |_| {},
            )
            .unwrap();

        assert_eq!(result.skipped, 1);
        assert_eq!(result.error_report.rows.len(), 1);
        assert_eq!(result.error_report.rows[0].row_number, 1);
    }

    #[test]
    fn test_skip_policy_skips_batch_duplicates() {
        let mut conn = test_conn();
        let importer = UserImporter;
        let opts = ValidationOptions {
            duplicate_handling: DuplicateHandling::Skip,
            check_existing: false,
        };
        let tx = conn.transaction().unwrap();

        let result = importer
            .apply(
                &tx,
                &[
                    record(&[("email", "a@x.com"), ("firstName", "First")]),
                    record(&[("email", "A@X.COM"), ("firstName", "Second")]),
                ],
                &opts,
                &mut |_| {},
            )
            .unwrap();

        assert_eq!(result.success, 1);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_rollback_deletes_only_ledgered_ids() {
        let mut conn = test_conn();
        let importer = UserImporter;

        let tx = conn.transaction().unwrap();
        let result = importer
            .apply(
                &tx,
                &[
                    record(&[("email", "a@x.com")]),
                    record(&[("email", "b@x.com")]),
                ],
                &ValidationOptions::default(),
                &mut |_| {},
            )
            .unwrap();
        tx.commit().unwrap();

        let ledger = result.rollback_data.unwrap();
        assert_eq!(ledger.ids().len(), 2);

        // 额外手工插入的用户不受回退影响
        let tx = conn.transaction().unwrap();
        entity_store::create_user(&tx, "manual", "keep@x.com", &MappedRecord::new()).unwrap();
        let deleted = importer.rollback(&tx, &ledger).unwrap();
        tx.commit().unwrap();

        assert_eq!(deleted, 2);
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM member_user", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn test_rollback_rejects_mismatched_ledger() {
        let mut conn = test_conn();
        let importer = UserImporter;
        let tx = conn.transaction().unwrap();

        let err = importer
            .rollback(&tx, &RollbackLedger::CreatedLoans(vec!["l1".to_string()]))
            .unwrap_err();
        assert!(matches!(err, ImportError::RollbackRefused(_)));
    }
}
