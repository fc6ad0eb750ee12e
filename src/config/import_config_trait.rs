// ==========================================
// 小额信贷平台 - 导入配置读取 Trait
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 5. 资源与并发模型
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入模块所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取上传文件大小上限（字节）
    ///
    /// # 默认值
    /// - 52_428_800（50 MB）
    async fn get_max_file_size_bytes(&self) -> Result<i64, Box<dyn Error>>;

    /// 获取预览返回的样本行数上限
    ///
    /// # 默认值
    /// - 10
    async fn get_preview_sample_size(&self) -> Result<usize, Box<dyn Error>>;

    /// 获取落库任务的最大尝试次数
    ///
    /// # 默认值
    /// - 3
    async fn get_job_max_retries(&self) -> Result<i32, Box<dyn Error>>;

    /// 获取重试退避基数（毫秒，按 2 的幂倍增）
    ///
    /// # 默认值
    /// - 2_000
    async fn get_job_backoff_base_ms(&self) -> Result<i64, Box<dyn Error>>;
}
