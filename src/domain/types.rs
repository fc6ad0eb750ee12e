// ==========================================
// 小额信贷平台 - 导入领域类型定义
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 2. 基础类型
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 导入类型 (Import Type)
// ==========================================
// 闭集: 每种类型对应一个导入策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportType {
    Users,         // 用户（成员账号）
    Loans,         // 贷款
    Contributions, // 储蓄缴款
    Guarantees,    // 担保（扩展点，当前为空实现）
    Payments,      // 还款（扩展点，当前为空实现）
}

impl ImportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportType::Users => "USERS",
            ImportType::Loans => "LOANS",
            ImportType::Contributions => "CONTRIBUTIONS",
            ImportType::Guarantees => "GUARANTEES",
            ImportType::Payments => "PAYMENTS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USERS" => Some(ImportType::Users),
            "LOANS" => Some(ImportType::Loans),
            "CONTRIBUTIONS" => Some(ImportType::Contributions),
            "GUARANTEES" => Some(ImportType::Guarantees),
            "PAYMENTS" => Some(ImportType::Payments),
            _ => None,
        }
    }
}

impl fmt::Display for ImportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 会话状态 (Session Status)
// ==========================================
// 状态机: PENDING → PARSING → MAPPED → VALIDATING → IMPORTING → {COMPLETED|FAILED}
// CANCELLED 仅可从 {PENDING, PARSING, MAPPED, VALIDATING} 进入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,    // 已创建，文件已落盘
    Parsing,    // 预览/解析中
    Mapped,     // 列映射已保存
    Validating, // 校验完成（结果已持久化）
    Importing,  // 落库任务执行中
    Completed,  // 终态：成功
    Failed,     // 终态：失败
    Cancelled,  // 终态：人工取消
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Parsing => "PARSING",
            SessionStatus::Mapped => "MAPPED",
            SessionStatus::Validating => "VALIDATING",
            SessionStatus::Importing => "IMPORTING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(SessionStatus::Pending),
            "PARSING" => Some(SessionStatus::Parsing),
            "MAPPED" => Some(SessionStatus::Mapped),
            "VALIDATING" => Some(SessionStatus::Validating),
            "IMPORTING" => Some(SessionStatus::Importing),
            "COMPLETED" => Some(SessionStatus::Completed),
            "FAILED" => Some(SessionStatus::Failed),
            "CANCELLED" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    /// 是否允许取消（仅导入任务尚未启动的阶段）
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            SessionStatus::Pending
                | SessionStatus::Parsing
                | SessionStatus::Mapped
                | SessionStatus::Validating
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 文件类型 (File Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    Csv,
    Excel,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Csv => "CSV",
            FileType::Excel => "EXCEL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CSV" => Some(FileType::Csv),
            "EXCEL" => Some(FileType::Excel),
            _ => None,
        }
    }

    /// 根据文件扩展名推断类型
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "csv" | "txt" => Some(FileType::Csv),
            "xlsx" | "xls" => Some(FileType::Excel),
            _ => None,
        }
    }
}

// ==========================================
// 校验级别 (Finding Severity)
// ==========================================
// ERROR 阻断导入启动，WARNING/INFO 仅提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ERROR" => Some(Severity::Error),
            "WARNING" => Some(Severity::Warning),
            "INFO" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 值转换类型 (Transform Kind)
// ==========================================
// 字段映射时对源值的声明式转换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    Uppercase,
    Lowercase,
    Trim,
    Number,
    Boolean,
    Date,
}

// ==========================================
// 批次内重复处理策略 (Duplicate Handling)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicateHandling {
    #[default]
    Reject, // 重复记为 ERROR（默认）
    Warn,   // 重复仅记为 WARNING
    Skip,   // 落库阶段跳过重复行
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_roundtrip() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::Parsing,
            SessionStatus::Mapped,
            SessionStatus::Validating,
            SessionStatus::Importing,
            SessionStatus::Completed,
            SessionStatus::Failed,
            SessionStatus::Cancelled,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_can_cancel_only_before_importing() {
        assert!(SessionStatus::Pending.can_cancel());
        assert!(SessionStatus::Parsing.can_cancel());
        assert!(SessionStatus::Mapped.can_cancel());
        assert!(SessionStatus::Validating.can_cancel());
        assert!(!SessionStatus::Importing.can_cancel());
        assert!(!SessionStatus::Completed.can_cancel());
        assert!(!SessionStatus::Failed.can_cancel());
        assert!(!SessionStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("csv"), Some(FileType::Csv));
        assert_eq!(FileType::from_extension("XLSX"), Some(FileType::Excel));
        assert_eq!(FileType::from_extension("pdf"), None);
    }

    #[test]
    fn test_import_type_parse() {
        assert_eq!(ImportType::parse("USERS"), Some(ImportType::Users));
        assert_eq!(ImportType::parse("users"), None);
    }
}
