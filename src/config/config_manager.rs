// ==========================================
// 工序产能排程系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::types::DEFAULT_MIN_REMAINING_HOURS;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// LedgerPolicy - 台账/分配策略快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    /// 最小剩余工时阈值（小时）
    pub min_remaining_hours: f64,
    /// 倒排回看天数（0 = 不限）
    pub backward_horizon_days: i64,
    /// 顺延默认上限天数（未给出上限日期时使用）
    pub forward_ceiling_days: i64,
    /// 台账写入遇瞬时冲突的自动重试次数
    pub commit_max_retries: u32,
    /// 漂移判定容差（小时）
    pub drift_epsilon: f64,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            min_remaining_hours: DEFAULT_MIN_REMAINING_HOURS,
            backward_horizon_days: 0,
            forward_ceiling_days: 30,
            commit_max_retries: 1,
            drift_epsilon: 1e-6,
        }
    }
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
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(format!("{}: {}", db_path, e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 对账任务执行时记录当时的策略
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key",
        )?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        serde_json::to_string(&json!(config_map))
            .map_err(|e| RepositoryError::InternalError(e.to_string()))
    }

    /// 读取配置并解析，缺失或格式错误时使用默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T: FromStr + Copy,
    {
        let raw = match self.get_global_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };

        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    "配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    // ===== 分配策略 =====

    /// 最小剩余工时阈值（默认 0.5h，负数按默认处理）
    pub fn get_min_remaining_hours(&self) -> RepositoryResult<f64> {
        let defaults = LedgerPolicy::default();
        let value = self.get_parsed_or_default(config_keys::MIN_REMAINING_HOURS, defaults.min_remaining_hours)?;
        if !value.is_finite() || value < 0.0 {
            tracing::warn!(config_key = config_keys::MIN_REMAINING_HOURS, value, "阈值非法，使用默认值");
            return Ok(defaults.min_remaining_hours);
        }
        Ok(value)
    }

    /// 倒排回看天数（0 = 不限）
    pub fn get_backward_horizon_days(&self) -> RepositoryResult<i64> {
        let value = self.get_parsed_or_default(config_keys::BACKWARD_HORIZON_DAYS, 0i64)?;
        Ok(value.max(0))
    }

    /// 顺延默认上限天数
    pub fn get_forward_ceiling_days(&self) -> RepositoryResult<i64> {
        let defaults = LedgerPolicy::default();
        let value = self.get_parsed_or_default(config_keys::FORWARD_CEILING_DAYS, defaults.forward_ceiling_days)?;
        Ok(value.max(1))
    }

    // ===== 台账写入 =====

    /// 瞬时冲突自动重试次数
    pub fn get_commit_max_retries(&self) -> RepositoryResult<u32> {
        self.get_parsed_or_default(config_keys::LEDGER_COMMIT_MAX_RETRIES, LedgerPolicy::default().commit_max_retries)
    }

    /// 漂移判定容差
    pub fn get_drift_epsilon(&self) -> RepositoryResult<f64> {
        let defaults = LedgerPolicy::default();
        let value = self.get_parsed_or_default(config_keys::LEDGER_DRIFT_EPSILON, defaults.drift_epsilon)?;
        if !value.is_finite() || value < 0.0 {
            return Ok(defaults.drift_epsilon);
        }
        Ok(value)
    }

    /// 一次性加载策略快照
    pub fn load_policy(&self) -> RepositoryResult<LedgerPolicy> {
        Ok(LedgerPolicy {
            min_remaining_hours: self.get_min_remaining_hours()?,
            backward_horizon_days: self.get_backward_horizon_days()?,
            forward_ceiling_days: self.get_forward_ceiling_days()?,
            commit_max_retries: self.get_commit_max_retries()?,
            drift_epsilon: self.get_drift_epsilon()?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 分配
    pub const MIN_REMAINING_HOURS: &str = "min_remaining_hours";
    pub const BACKWARD_HORIZON_DAYS: &str = "backward_horizon_days";
    pub const FORWARD_CEILING_DAYS: &str = "forward_ceiling_days";

    // 台账写入
    pub const LEDGER_COMMIT_MAX_RETRIES: &str = "ledger_commit_max_retries";
    pub const LEDGER_DRIFT_EPSILON: &str = "ledger_drift_epsilon";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_missing() {
        let manager = setup_manager();
        assert_eq!(manager.load_policy().unwrap(), LedgerPolicy::default());
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let manager = setup_manager();
        manager.set_global_config_value(config_keys::MIN_REMAINING_HOURS, "1.25").unwrap();
        manager.set_global_config_value(config_keys::LEDGER_COMMIT_MAX_RETRIES, "abc").unwrap();
        manager.set_global_config_value(config_keys::BACKWARD_HORIZON_DAYS, "-5").unwrap();

        let policy = manager.load_policy().unwrap();
        assert_eq!(policy.min_remaining_hours, 1.25);
        assert_eq!(policy.commit_max_retries, 1);
        assert_eq!(policy.backward_horizon_days, 0);

        manager.set_global_config_value(config_keys::MIN_REMAINING_HOURS, "-1").unwrap();
        assert_eq!(manager.get_min_remaining_hours().unwrap(), DEFAULT_MIN_REMAINING_HOURS);
    }

    #[test]
    fn test_snapshot_contains_keys() {
        let manager = setup_manager();
        manager.set_global_config_value(config_keys::FORWARD_CEILING_DAYS, "14").unwrap();
        let snapshot = manager.get_config_snapshot().unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(parsed.get("forward_ceiling_days").map(String::as_str), Some("14"));
    }
}
