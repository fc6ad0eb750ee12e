// ==========================================
// 小额信贷平台 - 导入模块错误类型
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 7. 错误分类
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件格式错误（同步 4xx）=====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .csv/.txt/.xlsx/.xls）")]
    UnsupportedFormat(String),

    #[error("文件超出大小上限: {size} 字节（上限 {limit} 字节）")]
    FileTooLarge { size: i64, limit: i64 },

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 映射错误 =====
    #[error("列映射为空，无法进入校验阶段")]
    EmptyMapping,

    // ===== 业务规则错误（逐行捕获，不中断事务）=====
    #[error("业务规则违反 (行 {row}): {message}")]
    BusinessRule { row: usize, message: String },

    // ===== 任务执行错误（中断事务，会话置 FAILED）=====
    #[error("落库任务执行失败: {0}")]
    JobExecution(String),

    // ===== 回退错误（同步 4xx，不改变状态）=====
    #[error("回退被拒绝: {0}")]
    RollbackRefused(String),

    // ===== 数据库错误 =====
    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::DatabaseQueryError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
