// ==========================================
// 小额信贷平台 - 应用共享状态
// ==========================================

use crate::api::ImportSessionApi;
use std::sync::Arc;

/// axum 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<ImportSessionApi>,
}

impl AppState {
    pub fn new(api: Arc<ImportSessionApi>) -> Self {
        Self { api }
    }
}
