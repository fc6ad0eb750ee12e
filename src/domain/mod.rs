// ==========================================
// 小额信贷平台 - 导入领域模型层
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 3. 数据模型
// ==========================================
// 职责: 定义导入会话、映射、校验结果等领域实体
// 红线: 不含数据访问逻辑,不含校验/落库逻辑
// ==========================================

pub mod session;
pub mod types;

// 重导出核心类型
pub use session::{
    ErrorReport, FieldMapping, FieldTransform, ImportSession, ProcessResult, RecordRef,
    RollbackLedger, RowError, SuccessReport, ValidationFinding, ValidationOptions,
};
pub use types::{
    DuplicateHandling, FileType, ImportType, SessionStatus, Severity, TransformKind,
};
