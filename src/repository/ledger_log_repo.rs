// ==========================================
// 工序产能排程系统 - 台账日志数据仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
// 说明: 写入由 CapacityLedgerRepository 在台账事务内调用 insert_in_tx，
//       保证日志与台账写入同生共死
// ==========================================

use crate::domain::ledger_log::LedgerLog;
use crate::domain::types::LedgerAction;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT log_id, action, process_name, plan_date, delta_hours,
           occupied_before, occupied_after, drift_hours, detail, created_at
    FROM ledger_log
"#;

/// 在给定连接/事务上插入一条台账日志
pub(crate) fn insert_in_tx(conn: &Connection, log: &LedgerLog) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO ledger_log (
            log_id, action, process_name, plan_date, delta_hours,
            occupied_before, occupied_after, drift_hours, detail, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            log.log_id,
            log.action.to_db_str(),
            log.process_name,
            log.plan_date,
            log.delta_hours,
            log.occupied_before,
            log.occupied_after,
            log.drift_hours,
            log.detail,
            log.created_at,
        ],
    )?;
    Ok(())
}

// ==========================================
// LedgerLogRepository - 台账日志仓储
// ==========================================
pub struct LedgerLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LedgerLogRepository {
    /// 创建新的台账日志仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入日志（台账事务之外的补录场景）
    pub fn insert(&self, log: &LedgerLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        insert_in_tx(&conn, log)?;
        Ok(log.log_id.clone())
    }

    /// 按单元格查询日志（时间升序）
    pub fn find_by_cell(&self, process_name: &str, plan_date: NaiveDate) -> RepositoryResult<Vec<LedgerLog>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE process_name = ?1 AND plan_date = ?2 ORDER BY created_at, rowid",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![process_name, plan_date], map_row)?
            .collect::<Result<Vec<LedgerLog>, _>>()?;
        Ok(logs)
    }

    /// 按动作类型查询最近的日志
    pub fn find_recent_by_action(&self, action: LedgerAction, limit: usize) -> RepositoryResult<Vec<LedgerLog>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE action = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![action.to_db_str(), limit as i64], map_row)?
            .collect::<Result<Vec<LedgerLog>, _>>()?;
        Ok(logs)
    }

    /// 统计某类动作的日志条数
    pub fn count_by_action(&self, action: LedgerAction) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM ledger_log WHERE action = ?1",
            params![action.to_db_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_row(row: &rusqlite::Row) -> rusqlite::Result<LedgerLog> {
    let action_raw: String = row.get(1)?;
    let action = LedgerAction::from_str(&action_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("未知台账动作: {}", action_raw).into(),
        )
    })?;

    Ok(LedgerLog {
        log_id: row.get(0)?,
        action,
        process_name: row.get(2)?,
        plan_date: row.get(3)?,
        delta_hours: row.get(4)?,
        occupied_before: row.get(5)?,
        occupied_after: row.get(6)?,
        drift_hours: row.get(7)?,
        detail: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn setup_test_db() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn make_log(action: LedgerAction, delta: f64) -> LedgerLog {
        LedgerLog {
            log_id: Uuid::new_v4().to_string(),
            action,
            process_name: "Pack".to_string(),
            plan_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            delta_hours: delta,
            occupied_before: 0.0,
            occupied_after: delta.max(0.0),
            drift_hours: 0.0,
            detail: None,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_insert_and_find_by_cell() {
        let repo = LedgerLogRepository::new(setup_test_db());

        repo.insert(&make_log(LedgerAction::Commit, 3.0)).unwrap();
        repo.insert(&make_log(LedgerAction::Release, -1.0)).unwrap();

        let logs = repo
            .find_by_cell("Pack", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, LedgerAction::Commit);
        assert_eq!(logs[1].action, LedgerAction::Release);

        assert_eq!(repo.count_by_action(LedgerAction::Commit).unwrap(), 1);
        assert_eq!(repo.count_by_action(LedgerAction::Reset).unwrap(), 0);
    }

    #[test]
    fn test_find_recent_by_action_respects_limit() {
        let repo = LedgerLogRepository::new(setup_test_db());
        for _ in 0..3 {
            repo.insert(&make_log(LedgerAction::Recalc, 0.0)).unwrap();
        }

        let logs = repo.find_recent_by_action(LedgerAction::Recalc, 2).unwrap();
        assert_eq!(logs.len(), 2);
    }
}
