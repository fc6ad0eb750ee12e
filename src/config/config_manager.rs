// ==========================================
// 小额信贷平台 - 配置管理器
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 5. 资源与并发模型
// ==========================================
// 职责: 配置加载、查询
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 配置键名集合
pub mod config_keys {
    pub const MAX_FILE_SIZE_BYTES: &str = "import.max_file_size_bytes";
    pub const PREVIEW_SAMPLE_SIZE: &str = "import.preview_sample_size";
    pub const JOB_MAX_RETRIES: &str = "import.job_max_retries";
    pub const JOB_BACKOFF_BASE_MS: &str = "import.job_backoff_base_ms";
}

/// 默认值（config_kv 中无对应键时使用）
pub mod config_defaults {
    pub const MAX_FILE_SIZE_BYTES: i64 = 52_428_800; // 50 MB
    pub const PREVIEW_SAMPLE_SIZE: usize = 10;
    pub const JOB_MAX_RETRIES: i32 = 3;
    pub const JOB_BACKOFF_BASE_MS: i64 = 2_000;
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取整数配置，解析失败或缺失时回退默认值
    fn get_i64_or(&self, key: &str, default: i64) -> Result<i64, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(default))
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_max_file_size_bytes(&self) -> Result<i64, Box<dyn Error>> {
        self.get_i64_or(
            config_keys::MAX_FILE_SIZE_BYTES,
            config_defaults::MAX_FILE_SIZE_BYTES,
        )
    }

    async fn get_preview_sample_size(&self) -> Result<usize, Box<dyn Error>> {
        Ok(self.get_i64_or(
            config_keys::PREVIEW_SAMPLE_SIZE,
            config_defaults::PREVIEW_SAMPLE_SIZE as i64,
        )? as usize)
    }

    async fn get_job_max_retries(&self) -> Result<i32, Box<dyn Error>> {
        Ok(self.get_i64_or(
            config_keys::JOB_MAX_RETRIES,
            config_defaults::JOB_MAX_RETRIES as i64,
        )? as i32)
    }

    async fn get_job_backoff_base_ms(&self) -> Result<i64, Box<dyn Error>> {
        self.get_i64_or(
            config_keys::JOB_BACKOFF_BASE_MS,
            config_defaults::JOB_BACKOFF_BASE_MS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, ensure_schema};

    fn setup_conn() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    #[tokio::test]
    async fn test_defaults_when_keys_missing() {
        let config = ConfigManager::from_connection(setup_conn()).unwrap();

        assert_eq!(
            config.get_max_file_size_bytes().await.unwrap(),
            config_defaults::MAX_FILE_SIZE_BYTES
        );
        assert_eq!(config.get_preview_sample_size().await.unwrap(), 10);
        assert_eq!(config.get_job_max_retries().await.unwrap(), 3);
        assert_eq!(config.get_job_backoff_base_ms().await.unwrap(), 2_000);
    }

    #[tokio::test]
    async fn test_override_from_config_kv() {
        let conn = setup_conn();
        conn.lock()
            .unwrap()
            .execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)",
                params![config_keys::PREVIEW_SAMPLE_SIZE, "25"],
            )
            .unwrap();

        let config = ConfigManager::from_connection(conn).unwrap();
        assert_eq!(config.get_preview_sample_size().await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_invalid_value_falls_back_to_default() {
        let conn = setup_conn();
        conn.lock()
            .unwrap()
            .execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)",
                params![config_keys::JOB_MAX_RETRIES, "not-a-number"],
            )
            .unwrap();

        let config = ConfigManager::from_connection(conn).unwrap();
        assert_eq!(config.get_job_max_retries().await.unwrap(), 3);
    }
}
