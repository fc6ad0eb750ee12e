// ==========================================
// 小额信贷平台 - 仓储层模块
// ==========================================

pub mod entity_store;
pub mod error;
pub mod import_session_repo;
pub mod import_session_repo_impl;

pub use error::RepositoryError;
pub use import_session_repo::{ImportSessionRepository, SessionFilter, SessionPage};
pub use import_session_repo_impl::ImportSessionRepositoryImpl;
