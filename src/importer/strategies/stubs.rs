// ==========================================
// 小额信贷平台 - 担保/还款导入策略（空实现）
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 5. 落库策略（扩展点）
// 校验规则已定义，落库尚未接通: 所有行计为 skipped
// ==========================================

use crate::domain::session::{ProcessResult, RollbackLedger, RowError, ValidationOptions};
use crate::domain::types::ImportType;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::MappedRecord;
use crate::importer::strategy::{EntityImporter, ProgressFn};
use rusqlite::Transaction;
use tracing::warn;

fn skip_all(import_type: ImportType, records: &[MappedRecord]) -> ProcessResult {
    warn!(import_type = %import_type, rows = records.len(), "导入类型尚未接通落库，整批跳过");
    let mut result = ProcessResult::default();
    for idx in 0..records.len() {
        result.processed += 1;
        result.skipped += 1;
        result.error_report.rows.push(RowError {
            row_number: (idx + 1) as i64,
            message: format!("导入类型 {} 尚未支持落库", import_type),
        });
    }
    result
}

pub struct GuaranteeImporter;

impl EntityImporter for GuaranteeImporter {
    fn import_type(&self) -> ImportType {
        ImportType::Guarantees
    }

    fn supports_rollback(&self) -> bool {
        false
    }

    fn apply(
        &self,
        _tx: &Transaction,
        records: &[MappedRecord],
        _opts: &ValidationOptions,
        _progress: ProgressFn<'_>,
    ) -> ImportResult<ProcessResult> {
        Ok(skip_all(ImportType::Guarantees, records))
    }

    fn rollback(&self, _tx: &Transaction, _ledger: &RollbackLedger) -> ImportResult<usize> {
        Err(ImportError::RollbackRefused(
            "担保导入不支持回退".to_string(),
        ))
    }
}

pub struct PaymentImporter;

impl EntityImporter for PaymentImporter {
    fn import_type(&self) -> ImportType {
        ImportType::Payments
    }

    fn supports_rollback(&self) -> bool {
        false
    }

    fn apply(
        &self,
        _tx: &Transaction,
        records: &[MappedRecord],
        _opts: &ValidationOptions,
        _progress: ProgressFn<'_>,
    ) -> ImportResult<ProcessResult> {
        Ok(skip_all(ImportType::Payments, records))
    }

    fn rollback(&self, _tx: &Transaction, _ledger: &RollbackLedger) -> ImportResult<usize> {
        Err(ImportError::RollbackRefused(
            "还款导入不支持回退".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, ensure_schema};
    use rusqlite::Connection;

    #[test]
    fn test_stub_skips_every_row() {
        let mut conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        let tx = conn.transaction().unwrap();

        let records = vec![MappedRecord::new(), MappedRecord::new()];
        let result = GuaranteeImporter
            .apply(&tx, &records, &ValidationOptions::default(), &mut |_| {})
            .unwrap();

        assert_eq!(result.processed, 2);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.success, 0);
    }
}
