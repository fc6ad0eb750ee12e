// ==========================================
// 小额信贷平台 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少 worker 与 HTTP 请求并发写入时的偶发 busy 错误
// - 内置导入子系统的建表语句（幂等）
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 确保导入子系统的表结构存在（幂等）
///
/// 说明：
/// - import_job_queue 表由 job_queue 模块自行维护
/// - config_kv 为全局配置表，与平台其他子系统共用
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS import_session (
            id TEXT PRIMARY KEY,
            session_number TEXT NOT NULL UNIQUE,
            file_name TEXT NOT NULL,
            original_name TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            file_type TEXT NOT NULL,
            file_path TEXT NOT NULL,
            has_headers INTEGER NOT NULL DEFAULT 1,
            delimiter TEXT NOT NULL DEFAULT ',',
            encoding TEXT NOT NULL DEFAULT 'utf-8',
            import_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            column_mapping TEXT NOT NULL DEFAULT '[]',
            validation_rules TEXT NOT NULL DEFAULT '{}',
            total_rows INTEGER NOT NULL DEFAULT 0,
            processed_rows INTEGER NOT NULL DEFAULT 0,
            success_rows INTEGER NOT NULL DEFAULT 0,
            failed_rows INTEGER NOT NULL DEFAULT 0,
            skipped_rows INTEGER NOT NULL DEFAULT 0,
            started_at TEXT,
            completed_at TEXT,
            processing_time_ms INTEGER,
            can_rollback INTEGER NOT NULL DEFAULT 0,
            rollback_data TEXT,
            rolled_back_at TEXT,
            rolled_back_by TEXT,
            success_report TEXT,
            error_report TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_import_session_owner
          ON import_session(created_by, created_at);

        CREATE INDEX IF NOT EXISTS idx_import_session_status
          ON import_session(status, import_type);

        CREATE TABLE IF NOT EXISTS validation_finding (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES import_session(id) ON DELETE CASCADE,
            row_number INTEGER NOT NULL,
            column_name TEXT,
            field_name TEXT,
            severity TEXT NOT NULL,
            error_code TEXT NOT NULL,
            message TEXT NOT NULL,
            expected_value TEXT,
            actual_value TEXT,
            suggested_fix TEXT,
            can_auto_fix INTEGER NOT NULL DEFAULT 0,
            was_auto_fixed INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_validation_finding_session
          ON validation_finding(session_id, severity);

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL DEFAULT 'global',
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS member_user (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT,
            last_name TEXT,
            phone TEXT,
            address TEXT,
            city TEXT,
            postal_code TEXT,
            password_hash TEXT,
            activation_state TEXT NOT NULL DEFAULT 'PENDING_ACTIVATION',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS loan (
            id TEXT PRIMARY KEY,
            loan_number TEXT NOT NULL UNIQUE,
            borrower_id TEXT NOT NULL REFERENCES member_user(id),
            amount REAL NOT NULL,
            interest_rate REAL,
            duration_months INTEGER,
            purpose TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS contribution (
            id TEXT PRIMARY KEY,
            reference TEXT NOT NULL UNIQUE,
            member_id TEXT NOT NULL REFERENCES member_user(id),
            amount REAL NOT NULL,
            contribution_date TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        // 再次执行不应报错
        ensure_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM import_session", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
