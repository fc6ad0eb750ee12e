// ==========================================
// 小额信贷平台 - 落库进度共享视图
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 5. 落库
// 职责: 落库事务进行中的行级进度（进程内内存，不落库）
// 约束: 事务持有写锁期间其他连接写库会被阻塞，
//       行级进度只进内存，processed_rows 随事务提交统一落库
// ==========================================

use std::collections::HashMap;
use std::sync::Mutex;

/// 会话级落库进度的进程内共享视图
///
/// 查询端在会话处于 IMPORTING 时叠加读取，
/// 落库结束（提交、失败或重试）后由执行器清除。
#[derive(Debug, Default)]
pub struct ProgressTracker {
    inner: Mutex<HashMap<String, i64>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 落库开始时清零
    pub fn begin(&self, session_id: &str) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(session_id.to_string(), 0);
        }
    }

    /// 行级进度写入（落库事务内回调）
    pub fn record(&self, session_id: &str, processed: i64) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(session_id.to_string(), processed);
        }
    }

    /// 查询进行中的进度；无记录返回 None
    pub fn get(&self, session_id: &str) -> Option<i64> {
        self.inner
            .lock()
            .ok()
            .and_then(|map| map.get(session_id).copied())
    }

    /// 落库结束后清除
    pub fn finish(&self, session_id: &str) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(session_id);
        }
    }
}
