// ==========================================
// 小额信贷平台 - API 层模块
// ==========================================

pub mod error;
pub mod import_session_api;

pub use error::ApiError;
pub use import_session_api::ImportSessionApi;
