// ==========================================
// 小额信贷平台 - API 层错误类型
// ==========================================
// 职责: 将导入/仓储错误转换为带 HTTP 状态码的用户可读错误
// 约定: 同步校验失败 4xx，内部错误 5xx（细节只进日志）
// ==========================================

use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// API 层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("未认证: {0}")]
    Unauthorized(String),

    #[error("无权访问: {0}")]
    Forbidden(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("文件超出大小上限: {size} 字节（上限 {limit} 字节）")]
    FileTooLarge { size: i64, limit: i64 },

    #[error("文件格式不支持: {0}")]
    UnsupportedFormat(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_)
            | ApiError::BusinessRuleViolation(_)
            | ApiError::InvalidStateTransition { .. }
            | ApiError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::DatabaseError(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "API 内部错误");
        } else {
            tracing::debug!(error = %self, "API 请求被拒绝");
        }
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}: {}", entity, id))
            }
            RepositoryError::InvalidData(msg) => ApiError::BusinessRuleViolation(msg),
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::FileNotFound(p) => ApiError::NotFound(format!("文件: {}", p)),
            ImportError::UnsupportedFormat(ext) => ApiError::UnsupportedFormat(ext),
            ImportError::FileTooLarge { size, limit } => ApiError::FileTooLarge { size, limit },
            ImportError::EmptyMapping => {
                ApiError::InvalidInput("列映射为空，无法进入校验阶段".to_string())
            }
            ImportError::CsvParseError(msg) | ImportError::ExcelParseError(msg) => {
                ApiError::InvalidInput(msg)
            }
            ImportError::RollbackRefused(msg) => ApiError::BusinessRuleViolation(msg),
            ImportError::JobExecution(msg) => ApiError::BusinessRuleViolation(msg),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::FileTooLarge { size: 1, limit: 0 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_repository_not_found_maps_to_404() {
        let e = RepositoryError::NotFound {
            entity: "import_session".into(),
            id: "s1".into(),
        };
        assert_eq!(ApiError::from(e).status_code(), StatusCode::NOT_FOUND);
    }
}
