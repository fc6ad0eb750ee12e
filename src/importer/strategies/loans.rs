// ==========================================
// 小额信贷平台 - 贷款导入策略
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 5. 落库策略 (LOANS)
// 自然键: loanNumber；借款人由 borrowerEmail 在既有成员中解析
// 借款人不存在 → 行级失败，不中断整批
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
use uuid::Uuid;

pub struct LoanImporter;

impl EntityImporter for LoanImporter {
    fn import_type(&self) -> ImportType {
        ImportType::Loans
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

            let loan_number = record
                .get("loanNumber")
                .map(|v| v.trim().to_string())
                .unwrap_or_default();
            if loan_number.is_empty() {
                result.skipped += 1;
                result.error_report.rows.push(RowError {
                    row_number,
                    message: "缺少自然键 loanNumber".to_string(),
                });
                progress(row_number);
                continue;
            }

            if !seen_in_batch.insert(loan_number.clone())
                && opts.duplicate_handling == DuplicateHandling::Skip
            {
                result.skipped += 1;
                result.error_report.rows.push(RowError {
                    row_number,
                    message: format!("批次内重复贷款编号已跳过: {}", loan_number),
                });
                progress(row_number);
                continue;
            }

            match import_row(tx, &loan_number, record) {
                Ok(RowOutcome::Created(id)) => {
                    result.success += 1;
                    result.success_report.created.push(RecordRef {
                        row_number,
                        record_id: id.clone(),
                        natural_key: Some(loan_number),
                    });
                    created_ids.push(id);
                }
                Ok(RowOutcome::Updated(id)) => {
                    result.success += 1;
                    result.success_report.updated.push(RecordRef {
                        row_number,
                        record_id: id,
                        natural_key: Some(loan_number),
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

        if !created_ids.is_empty() {
            result.rollback_data = Some(RollbackLedger::CreatedLoans(created_ids));
        }
        Ok(result)
    }

    fn rollback(&self, tx: &Transaction, ledger: &RollbackLedger) -> ImportResult<usize> {
        let RollbackLedger::CreatedLoans(ids) = ledger else {
            return Err(ImportError::RollbackRefused(
                "回退台账类型与导入类型不匹配".to_string(),
            ));
        };
        let mut deleted = 0;
        for id in ids {
            deleted += entity_store::delete_loan_by_id(tx, id)
                .map_err(|e| ImportError::DatabaseQueryError(e.to_string()))?;
        }
        Ok(deleted)
    }
}

enum RowOutcome {
    Created(String),
    Updated(String),
}

fn import_row(
    tx: &Transaction,
    loan_number: &str,
    record: &MappedRecord,
) -> ImportResult<RowOutcome> {
    let business = |message: String| ImportError::BusinessRule { row: 0, message };

    match entity_store::find_loan_by_number(tx, loan_number)
        .map_err(|e| business(e.to_string()))?
    {
        Some(id) => {
            entity_store::update_loan(tx, &id, record).map_err(|e| business(e.to_string()))?;
            Ok(RowOutcome::Updated(id))
        }
        None => {
            // 新建必须先解析借款人
            let borrower_email = record
                .get("borrowerEmail")
                .map(|v| v.trim().to_string())
                .unwrap_or_default();
            if borrower_email.is_empty() {
                return Err(business("缺少借款人邮箱 borrowerEmail".to_string()));
            }
            let borrower_id = entity_store::find_user_by_email(tx, &borrower_email)
                .map_err(|e| business(e.to_string()))?
                .ok_or_else(|| business(format!("借款人不存在: {}", borrower_email)))?;

            let id = Uuid::new_v4().to_string();
            entity_store::create_loan(tx, &id, loan_number, &borrower_id, record)
                .map_err(|e| business(e.to_string()))?;
            Ok(RowOutcome::Created(id))
        }
    }
}
