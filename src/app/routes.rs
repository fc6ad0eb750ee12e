// ==========================================
// 小额信贷平台 - 导入 REST 路由
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 2. 操作清单
// 认证: 由网关注入 X-User-Id 头（本服务只做归属检查）
// ==========================================

use crate::api::error::ApiError;
use crate::domain::session::{FieldMapping, ImportSession, ValidationOptions};
use crate::domain::types::{ImportType, SessionStatus};
use crate::repository::import_session_repo::SessionFilter;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::state::AppState;

/// 请求体上限（略高于文件上限，留出 multipart 开销）
const BODY_LIMIT_BYTES: usize = 64 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/import/sessions", post(create_session).get(list_sessions))
        .route("/api/v1/import/sessions/{id}", get(get_session))
        .route("/api/v1/import/sessions/{id}", delete(delete_session))
        .route("/api/v1/import/sessions/{id}/preview", post(preview))
        .route("/api/v1/import/sessions/{id}/mapping", put(update_mapping))
        .route("/api/v1/import/sessions/{id}/validate", post(validate))
        .route("/api/v1/import/sessions/{id}/start", post(start_import))
        .route("/api/v1/import/sessions/{id}/report", get(report))
        .route("/api/v1/import/sessions/{id}/rollback", post(rollback))
        .route("/api/v1/import/sessions/{id}/cancel", put(cancel))
        .route("/api/v1/import/status/{id}", get(session_status))
        .route("/api/v1/import/queue/stats", get(queue_stats))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 网关注入的用户标识
fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| ApiError::Unauthorized("缺少 X-User-Id 头".to_string()))
}

// ==========================================
// 创建会话（multipart 上传）
// ==========================================
async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ImportSession>), ApiError> {
    let owner = caller(&headers)?;

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;
    let mut import_type: Option<ImportType> = None;
    let mut has_headers = true;
    let mut delimiter: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                original_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
                file_bytes = Some(bytes.to_vec());
            }
            "importType" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
                import_type = Some(ImportType::parse(&text).ok_or_else(|| {
                    ApiError::InvalidInput(format!("未知导入类型: {}", text))
                })?);
            }
            "hasHeaders" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
                has_headers = text.trim() != "false";
            }
            "delimiter" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
                if !text.is_empty() {
                    delimiter = Some(text);
                }
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| ApiError::InvalidInput("缺少 file 字段".to_string()))?;
    let name =
        original_name.ok_or_else(|| ApiError::InvalidInput("缺少上传文件名".to_string()))?;
    let import_type =
        import_type.ok_or_else(|| ApiError::InvalidInput("缺少 importType 字段".to_string()))?;

    let session = state
        .api
        .create_session(&owner, &name, import_type, has_headers, delimiter, &bytes)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

// ==========================================
// 列表
// ==========================================
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    status: Option<String>,
    import_type: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    sessions: Vec<ImportSession>,
    total: i64,
    page: i64,
    limit: i64,
}

async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let owner = caller(&headers)?;

    let status = params
        .status
        .as_deref()
        .map(|s| {
            SessionStatus::parse(s)
                .ok_or_else(|| ApiError::InvalidInput(format!("未知会话状态: {}", s)))
        })
        .transpose()?;
    let import_type = params
        .import_type
        .as_deref()
        .map(|s| {
            ImportType::parse(s)
                .ok_or_else(|| ApiError::InvalidInput(format!("未知导入类型: {}", s)))
        })
        .transpose()?;

    let filter = SessionFilter {
        status,
        import_type,
        page: params.page,
        limit: params.limit,
    };
    let page = state.api.list_sessions(&owner, &filter).await?;

    Ok(Json(ListResponse {
        sessions: page.sessions,
        total: page.total,
        page: filter.page.max(1),
        limit: filter.limit(),
    }))
}

// ==========================================
// 单会话操作
// ==========================================
async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ImportSession>, ApiError> {
    let owner = caller(&headers)?;
    Ok(Json(state.api.get_session(&owner, &id).await?))
}

async fn preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = caller(&headers)?;
    Ok(Json(state.api.preview(&owner, &id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MappingRequest {
    mapping: Vec<FieldMapping>,
    #[serde(default)]
    validation_rules: Option<ValidationOptions>,
}

async fn update_mapping(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<MappingRequest>,
) -> Result<Json<ImportSession>, ApiError> {
    let owner = caller(&headers)?;
    let session = state
        .api
        .update_mapping(&owner, &id, body.mapping, body.validation_rules)
        .await?;
    Ok(Json(session))
}

async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = caller(&headers)?;
    Ok(Json(state.api.validate(&owner, &id).await?))
}

async fn start_import(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(StatusCode, impl IntoResponse), ApiError> {
    let owner = caller(&headers)?;
    let accepted = state.api.start_import(&owner, &id).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn session_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = caller(&headers)?;
    Ok(Json(state.api.progress(&owner, &id).await?))
}

async fn report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = caller(&headers)?;
    Ok(Json(state.api.report(&owner, &id).await?))
}

async fn rollback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(StatusCode, impl IntoResponse), ApiError> {
    let owner = caller(&headers)?;
    let accepted = state.api.rollback(&owner, &id).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ImportSession>, ApiError> {
    let owner = caller(&headers)?;
    Ok(Json(state.api.cancel(&owner, &id).await?))
}

async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let owner = caller(&headers)?;
    state.api.delete(&owner, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==========================================
// 队列统计
// ==========================================
async fn queue_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    caller(&headers)?;
    Ok(Json(state.api.queue_stats()?))
}
