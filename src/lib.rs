// ==========================================
// 小额信贷平台 - 批量数据导入系统核心库
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md
// 技术栈: axum + Rust + SQLite
// 流水线: 上传 → 解析预览 → 列映射 → 校验 → 落库 → 回退
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 解析/映射/校验/落库
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - HTTP 集成
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::session::{
    ErrorReport, FieldMapping, ImportSession, RollbackLedger, SuccessReport, ValidationFinding,
    ValidationOptions,
};
pub use domain::types::{
    DuplicateHandling, FileType, ImportType, SessionStatus, Severity, TransformKind,
};

pub use api::{ApiError, ImportSessionApi};
pub use importer::{
    BatchRunner, ImportError, ImportJobQueue, ImportResult, ImporterRegistry, JobType,
    TabularFileReader, ValidationEngine,
};
pub use repository::{ImportSessionRepository, ImportSessionRepositoryImpl};

/// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
