// ==========================================
// 小额信贷平台 - 导入会话 Repository Trait
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 3. 数据模型
// 职责: 定义会话与校验结果的数据访问接口（不包含业务逻辑）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::session::{ImportSession, ValidationFinding};
use crate::domain::types::{ImportType, SessionStatus};
use crate::repository::error::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 列表查询过滤条件
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub import_type: Option<ImportType>,
    /// 1 起始页码
    pub page: i64,
    pub limit: i64,
}

impl SessionFilter {
    pub fn offset(&self) -> i64 {
        let page = self.page.max(1);
        let limit = self.limit.clamp(1, 100);
        (page - 1) * limit
    }

    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, 100)
    }
}

/// 分页结果
#[derive(Debug)]
pub struct SessionPage {
    pub sessions: Vec<ImportSession>,
    pub total: i64,
}

// ==========================================
// ImportSessionRepository Trait
// ==========================================
// 实现者: ImportSessionRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait ImportSessionRepository: Send + Sync {
    // ===== 会话 CRUD =====

    /// 写入新会话（全字段）
    async fn create_session(&self, session: &ImportSession) -> Result<(), RepositoryError>;

    /// 按 ID 读取会话
    async fn get_session(&self, id: &str) -> Result<ImportSession, RepositoryError>;

    /// 按归属人分页列出会话（按创建时间倒序）
    async fn list_sessions(
        &self,
        owner: &str,
        filter: &SessionFilter,
    ) -> Result<SessionPage, RepositoryError>;

    /// 全字段更新会话（updated_at 由实现刷新）
    async fn update_session(&self, session: &ImportSession) -> Result<(), RepositoryError>;

    /// 仅更新状态
    async fn update_status(&self, id: &str, status: SessionStatus) -> Result<(), RepositoryError>;

    /// 仅更新进度计数（worker 在事务外的独立连接上调用）
    async fn update_progress(&self, id: &str, processed_rows: i64) -> Result<(), RepositoryError>;

    /// 标记回退完成（rolled_back_at 一经设置不再改写）
    async fn mark_rolled_back(
        &self,
        id: &str,
        by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// 删除会话（级联删除校验结果）
    async fn delete_session(&self, id: &str) -> Result<(), RepositoryError>;

    // ===== 校验结果 =====

    /// 全量替换会话的校验结果（先删后插，单事务）
    async fn replace_findings(
        &self,
        session_id: &str,
        findings: &[ValidationFinding],
    ) -> Result<usize, RepositoryError>;

    /// 读取会话的全部校验结果（按行号排序）
    async fn list_findings(&self, session_id: &str)
        -> Result<Vec<ValidationFinding>, RepositoryError>;

    // ===== 编号生成 =====

    /// 生成下一个会话编号: IMP-YYYYMMDD-XXXX（当日递增）
    async fn next_session_number(&self) -> Result<String, RepositoryError>;
}
