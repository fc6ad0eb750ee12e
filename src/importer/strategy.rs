// ==========================================
// 小额信贷平台 - 落库策略接口与注册表
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 5. 落库策略
// 职责: 按导入类型分发的实体落库策略（注册表分发，无 switch 分支）
// 红线: 策略只在调用方开启的事务内工作，不自行提交/回滚
// ==========================================

use crate::domain::session::{ProcessResult, RollbackLedger, ValidationOptions};
use crate::domain::types::ImportType;
use crate::importer::error::ImportResult;
use crate::importer::field_mapper::MappedRecord;
use crate::importer::strategies::{
    ContributionImporter, GuaranteeImporter, LoanImporter, PaymentImporter, UserImporter,
};
use rusqlite::Transaction;
use std::collections::HashMap;

/// 行级进度回调（worker 借此在事务外刷新 processed_rows）
pub type ProgressFn<'a> = &'a mut dyn FnMut(i64);

// ==========================================
// EntityImporter Trait
// ==========================================
// 每种导入类型一个实现，注册到 ImporterRegistry
pub trait EntityImporter: Send + Sync {
    fn import_type(&self) -> ImportType;

    /// 该类型的导入是否支持回退（担保/还款等空实现不支持）
    fn supports_rollback(&self) -> bool;

    /// 在事务内逐行落库
    ///
    /// 行级语义:
    /// - 自然键缺失 → skipped + 行错误
    /// - 自然键命中既有记录 → 更新（不计入回退台账）
    /// - 自然键未命中 → 新建（ID 计入回退台账）
    /// - 行级业务错误 → failed + 行错误，继续后续行
    fn apply(
        &self,
        tx: &Transaction,
        records: &[MappedRecord],
        opts: &ValidationOptions,
        progress: ProgressFn<'_>,
    ) -> ImportResult<ProcessResult>;

    /// 在事务内删除台账记录的新建 ID，返回删除数
    fn rollback(&self, tx: &Transaction, ledger: &RollbackLedger) -> ImportResult<usize>;
}

// ==========================================
// ImporterRegistry - 策略注册表
// ==========================================
pub struct ImporterRegistry {
    importers: HashMap<ImportType, Box<dyn EntityImporter>>,
}

impl ImporterRegistry {
    /// 注册全部内置策略
    pub fn with_builtin() -> Self {
        let mut registry = Self {
            importers: HashMap::new(),
        };
        registry.register(Box::new(UserImporter));
        registry.register(Box::new(LoanImporter));
        registry.register(Box::new(ContributionImporter));
        registry.register(Box::new(GuaranteeImporter));
        registry.register(Box::new(PaymentImporter));
        registry
    }

    pub fn register(&mut self, importer: Box<dyn EntityImporter>) {
        self.importers.insert(importer.import_type(), importer);
    }

    pub fn get(&self, import_type: ImportType) -> Option<&dyn EntityImporter> {
        self.importers.get(&import_type).map(|b| b.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_covers_all_types() {
        let registry = ImporterRegistry::with_builtin();
        for t in [
            ImportType::Users,
            ImportType::Loans,
            ImportType::Contributions,
            ImportType::Guarantees,
            ImportType::Payments,
        ] {
            let importer = registry.get(t).expect("内置类型必须有策略");
            assert_eq!(importer.import_type(), t);
        }
    }

    #[test]
    fn test_rollback_support_flags() {
        let registry = ImporterRegistry::with_builtin();
        assert!(registry.get(ImportType::Users).unwrap().supports_rollback());
        assert!(registry.get(ImportType::Loans).unwrap().supports_rollback());
        assert!(registry
            .get(ImportType::Contributions)
            .unwrap()
            .supports_rollback());
        assert!(!registry
            .get(ImportType::Guarantees)
            .unwrap()
            .supports_rollback());
        assert!(!registry
            .get(ImportType::Payments)
            .unwrap()
            .supports_rollback());
    }
}
