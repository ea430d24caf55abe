// ==========================================
// 工序产能排程系统 - 工序计划行数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 用途: 日汇总（SUMIFS 风格条件求和）、单元格重算的事实来源
// ==========================================

use crate::domain::plan_row::PlanRow;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT row_id, plan_id, process_name, schedule_date, scheduled_work_hours, row_ordinal
    FROM plan_row
"#;

// ==========================================
// PlanRowRepository - 工序计划行仓储
// ==========================================
pub struct PlanRowRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PlanRowRepository {
    /// 创建新的PlanRowRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入
    // ==========================================

    /// 插入单条计划行
    pub fn insert(&self, row: &PlanRow) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        insert_row(&conn, row)?;
        Ok(row.row_id.clone())
    }

    /// 批量插入计划行（单事务）
    pub fn insert_batch(&self, rows: &[PlanRow]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for row in rows {
            count += insert_row(&tx, row)?;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 修改计划行工时
    ///
    /// # 返回
    /// - Ok(1): 修改成功
    /// - Err(NotFound): row_id 不存在
    pub fn update_hours(&self, row_id: &str, scheduled_work_hours: f64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE plan_row SET scheduled_work_hours = ?1 WHERE row_id = ?2",
            params![scheduled_work_hours, row_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "PlanRow".to_string(),
                id: row_id.to_string(),
            });
        }
        Ok(rows)
    }

    /// 删除单条计划行
    pub fn delete_by_id(&self, row_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute("DELETE FROM plan_row WHERE row_id = ?1", params![row_id])?;
        Ok(rows)
    }

    /// 删除计划实体下的全部计划行
    pub fn delete_by_plan(&self, plan_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute("DELETE FROM plan_row WHERE plan_id = ?1", params![plan_id])?;
        Ok(rows)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按 row_id 查询
    pub fn find_by_id(&self, row_id: &str) -> RepositoryResult<Option<PlanRow>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE row_id = ?1", SELECT_COLUMNS);
        let row = conn.query_row(&sql, params![row_id], map_row).optional()?;
        Ok(row)
    }

    /// 按计划实体查询（日期、序号升序）
    pub fn find_by_plan(&self, plan_id: &str) -> RepositoryResult<Vec<PlanRow>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE plan_id = ?1 ORDER BY schedule_date, row_ordinal",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![plan_id], map_row)?
            .collect::<Result<Vec<PlanRow>, _>>()?;
        Ok(rows)
    }

    /// 按单元格查询（序号升序）
    pub fn find_by_cell(&self, process_name: &str, schedule_date: NaiveDate) -> RepositoryResult<Vec<PlanRow>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE process_name = ?1 AND schedule_date = ?2 ORDER BY row_ordinal",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![process_name, schedule_date], map_row)?
            .collect::<Result<Vec<PlanRow>, _>>()?;
        Ok(rows)
    }

    /// 单元格已排工时之和，可排除正在编辑的行
    ///
    /// # 参数
    /// - exclude_row_id: 需要排除的行（编辑时排除自身的旧工时）
    pub fn sum_scheduled_hours(
        &self,
        process_name: &str,
        schedule_date: NaiveDate,
        exclude_row_id: Option<&str>,
    ) -> RepositoryResult<f64> {
        let conn = self.get_conn()?;
        let total: f64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(scheduled_work_hours), 0.0)
            FROM plan_row
            WHERE process_name = ?1
              AND schedule_date = ?2
              AND (?3 IS NULL OR row_id <> ?3)
            "#,
            params![process_name, schedule_date, exclude_row_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// 单元格内下一个序号
    pub fn next_ordinal(&self, process_name: &str, schedule_date: NaiveDate) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;
        let max_ordinal: Option<i32> = conn.query_row(
            "SELECT MAX(row_ordinal) FROM plan_row WHERE process_name = ?1 AND schedule_date = ?2",
            params![process_name, schedule_date],
            |row| row.get(0),
        )?;
        Ok(max_ordinal.unwrap_or(0) + 1)
    }
}

fn insert_row(conn: &Connection, row: &PlanRow) -> RepositoryResult<usize> {
    let rows = conn.execute(
        r#"
        INSERT INTO plan_row (
            row_id, plan_id, process_name, schedule_date, scheduled_work_hours, row_ordinal
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            row.row_id,
            row.plan_id,
            row.process_name,
            row.schedule_date,
            row.scheduled_work_hours,
            row.row_ordinal,
        ],
    )?;
    Ok(rows)
}

fn map_row(row: &rusqlite::Row) -> rusqlite::Result<PlanRow> {
    Ok(PlanRow {
        row_id: row.get(0)?,
        plan_id: row.get(1)?,
        process_name: row.get(2)?,
        schedule_date: row.get(3)?,
        scheduled_work_hours: row.get(4)?,
        row_ordinal: row.get(5)?,
    })
}
