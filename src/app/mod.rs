// ==========================================
// 小额信贷平台 - HTTP 应用层
// ==========================================

pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
