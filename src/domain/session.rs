// ==========================================
// 小额信贷平台 - 导入会话领域模型
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 3. 数据模型
// 依据: Field_Mapping_Spec_v1.0.md - 列映射与转换
// ==========================================

use crate::domain::types::{
    DuplicateHandling, FileType, ImportType, SessionStatus, Severity, TransformKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ImportSession - 导入会话
// ==========================================
// 一次上传对应一个会话，驱动完整生命周期
// 对齐: schema import_session 表
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSession {
    // ===== 主键 =====
    pub id: String,             // UUID
    pub session_number: String, // 人类可读编号（IMP-YYYYMMDD-XXXX）

    // ===== 文件描述 =====
    pub file_name: String,      // 落盘文件名
    pub original_name: String,  // 原始上传文件名
    pub file_size: i64,         // 字节数
    pub file_type: FileType,    // CSV | EXCEL
    pub file_path: String,      // 存储路径（会话删除时一并删除）
    pub has_headers: bool,      // 首行是否为表头
    pub delimiter: String,      // CSV 分隔符（默认 ","）
    pub encoding: String,       // 检测到的编码（utf-8 / latin-1）

    // ===== 分类 =====
    pub import_type: ImportType,

    // ===== 状态机 =====
    pub status: SessionStatus,

    // ===== 映射与规则 =====
    pub column_mapping: Vec<FieldMapping>, // 进入 VALIDATING 前必须非空
    pub validation_rules: ValidationOptions,

    // ===== 进度计数 =====
    pub total_rows: i64,
    pub processed_rows: i64,
    pub success_rows: i64,
    pub failed_rows: i64,
    pub skipped_rows: i64,

    // ===== 时间 =====
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<i64>,

    // ===== 可回退性 =====
    pub can_rollback: bool,
    pub rollback_data: Option<RollbackLedger>, // 仅记录新建记录的 ID
    pub rolled_back_at: Option<DateTime<Utc>>, // 一经设置不可变（至多回退一次）
    pub rolled_back_by: Option<String>,

    // ===== 结果报告 =====
    pub success_report: Option<SuccessReport>,
    pub error_report: Option<ErrorReport>,

    // ===== 归属与审计 =====
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// FieldMapping - 列映射条目
// ==========================================
// 位置语义: 针对生成它的列序，列序改变会使映射失效
// 映射端点被调用时整体替换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub column_name: String, // 源列名
    pub field_name: String,  // 标准字段名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<FieldTransform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>, // 转换后为空时的兜底值
    #[serde(default)]
    pub required: bool,
}

/// 声明式值转换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTransform {
    pub kind: TransformKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>, // date 转换的显式格式
}

// ==========================================
// ValidationOptions - 会话级校验选项
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOptions {
    #[serde(default)]
    pub duplicate_handling: DuplicateHandling,
    /// 跨库查重（扩展点，基础实现不启用）
    #[serde(default)]
    pub check_existing: bool,
}

// ==========================================
// ValidationFinding - 单条校验结果
// ==========================================
/// 生命周期: 每次校验全量删除并重建（无增量 diff）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFinding {
    pub id: String,
    pub session_id: String,
    pub row_number: i64, // 1 起始，与源文件物理行序一致
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    pub severity: Severity,
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    pub can_auto_fix: bool,
    pub was_auto_fixed: bool,
}

// ==========================================
// RollbackLedger - 回退台账
// ==========================================
// 按导入类型打标签的新建记录 ID 清单
// 红线: 只追踪新建，更新操作不可回退（保持源系统的非对称语义）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ids")]
pub enum RollbackLedger {
    #[serde(rename = "CREATED_USERS")]
    CreatedUsers(Vec<String>),
    #[serde(rename = "CREATED_LOANS")]
    CreatedLoans(Vec<String>),
    #[serde(rename = "CREATED_CONTRIBUTIONS")]
    CreatedContributions(Vec<String>),
}

impl RollbackLedger {
    pub fn ids(&self) -> &[String] {
        match self {
            RollbackLedger::CreatedUsers(ids) => ids,
            RollbackLedger::CreatedLoans(ids) => ids,
            RollbackLedger::CreatedContributions(ids) => ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }
}

// ==========================================
// SuccessReport / ErrorReport - 结果报告
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessReport {
    /// 新建记录: 行号 → 记录 ID
    pub created: Vec<RecordRef>,
    /// 更新记录: 行号 → 记录 ID
    pub updated: Vec<RecordRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRef {
    pub row_number: i64,
    pub record_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natural_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorReport {
    pub rows: Vec<RowError>,
    /// 事务级致命错误（任务失败时填充）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row_number: i64,
    pub message: String,
}

// ==========================================
// ProcessResult - 落库阶段临时产物
// ==========================================
// 由策略实现产出，最终折叠进 ImportSession
#[derive(Debug, Default)]
pub struct ProcessResult {
    pub processed: i64,
    pub success: i64,
    pub failed: i64,
    pub skipped: i64,
    pub rollback_data: Option<RollbackLedger>,
    pub success_report: SuccessReport,
    pub error_report: ErrorReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_ledger_tagged_json() {
        let ledger = RollbackLedger::CreatedUsers(vec!["u1".to_string(), "u2".to_string()]);
        let json = serde_json::to_string(&ledger).unwrap();
        assert!(json.contains("CREATED_USERS"));

        let parsed: RollbackLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ledger);
        assert_eq!(parsed.ids().len(), 2);
    }

    #[test]
    fn test_field_mapping_optional_fields_omitted() {
        let mapping = FieldMapping {
            column_name: "Email".to_string(),
            field_name: "email".to_string(),
            transform: None,
            default_value: None,
            required: true,
        };
        let json = serde_json::to_string(&mapping).unwrap();
        assert!(!json.contains("transform"));
        assert!(!json.contains("default_value"));
    }

    #[test]
    fn test_validation_options_defaults() {
        let opts: ValidationOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(
            opts.duplicate_handling,
            crate::domain::types::DuplicateHandling::Reject
        );
        assert!(!opts.check_existing);
    }
}
