// ==========================================
// 小额信贷平台 - 批量导入模块
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md
// 流水线: 文件解析 → 列映射 → 校验 → 落库 → 回退
// ==========================================

pub mod batch_runner;
pub mod error;
pub mod field_mapper;
pub mod file_reader;
pub mod job_queue;
pub mod progress;
pub mod strategies;
pub mod strategy;
pub mod suggest;
pub mod validator;

pub use batch_runner::BatchRunner;
pub use error::{ImportError, ImportResult};
pub use field_mapper::{FieldMapper, MappedRecord};
pub use file_reader::{ParseOptions, ParsedTable, TabularFileReader};
pub use job_queue::{ImportJob, ImportJobQueue, JobStatus, JobType, QueueStats};
pub use progress::ProgressTracker;
pub use strategy::{EntityImporter, ImporterRegistry};
pub use suggest::{suggest_mapping, ColumnSuggestion};
pub use validator::{RuleSet, ValidationEngine, ValidationReport};
