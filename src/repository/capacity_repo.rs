// ==========================================
// 工序产能排程系统 - 产能台账数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: occupied_hours 与 remaining_* 必须在同一条 UPDATE 中写入
// ==========================================
// 并发:
// - 读扫描无锁，可能读到略旧的 remaining_hours
// - 单元格写入使用 IMMEDIATE 事务 + revision 条件更新，杜绝丢失更新
// - 全台账写入使用 EXCLUSIVE 事务
// ==========================================

use crate::domain::capacity::{derive_remaining, CalendarSeed, CapacityRecord};
use crate::domain::ledger_log::{LedgerLog, LedgerLogDraft};
use crate::domain::types::LedgerAction;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::ledger_log_repo::insert_in_tx;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, TransactionBehavior};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    SELECT
        process_name, plan_date, shift_hours, workstation_count,
        occupied_hours, remaining_hours, remaining_shift_equiv,
        revision, updated_at
    FROM capacity_ledger
"#;

// ==========================================
// 单元格写入上下文
// ==========================================

/// 写事务内读取到的单元格快照
#[derive(Debug, Clone, Copy)]
pub struct CellSnapshot<'a> {
    pub record: &'a CapacityRecord,
    /// 同一事务内汇总的现存计划行工时
    pub live_plan_hours: f64,
}

/// 引擎给出的占用工时新值
#[derive(Debug, Clone, Default)]
pub struct OccupiedChange {
    pub occupied_hours: f64,
    pub drift_hours: f64,
    pub detail: Option<String>,
}

/// 单元格写入结果
#[derive(Debug, Clone)]
pub struct OccupiedWrite {
    pub before: CapacityRecord,
    pub after: CapacityRecord,
    pub drift_hours: f64,
}

/// 全台账写入结果
#[derive(Debug, Clone, Default)]
pub struct BulkOccupiedWrite {
    pub total_records: usize,
    pub writes: Vec<OccupiedWrite>,
}

fn cell_key(process_name: &str, plan_date: NaiveDate) -> String {
    format!("{}@{}", process_name, plan_date)
}

// ==========================================
// CapacityLedgerRepository - 产能台账仓储
// ==========================================

/// 产能台账仓储
/// 职责: 管理 capacity_ledger 表的查询与原子写入
pub struct CapacityLedgerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CapacityLedgerRepository {
    /// 创建新的产能台账仓储实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(format!("{}: {}", db_path, e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按工序和日期查询单个台账单元格
    ///
    /// # 返回
    /// - Ok(Some(CapacityRecord)): 找到
    /// - Ok(None): 当日未配置产能
    pub fn find_by_process_and_date(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
    ) -> RepositoryResult<Option<CapacityRecord>> {
        let conn = self.get_conn()?;
        select_cell(&conn, process_name, plan_date)
    }

    /// 按工序和日期范围查询（闭区间，日期升序）
    ///
    /// 报表/列表视图的读取入口
    pub fn find_by_date_range(
        &self,
        process_name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<Vec<CapacityRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE process_name = ?1 AND plan_date BETWEEN ?2 AND ?3 ORDER BY plan_date",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![process_name, start_date, end_date], map_row)?
            .collect::<SqliteResult<Vec<CapacityRecord>>>()?;
        Ok(records)
    }

    /// 倒序扫描: floor <= plan_date <= upper（日期降序）
    ///
    /// # 参数
    /// - floor: 回看下界（None 表示扫描全部历史）
    pub fn scan_descending(
        &self,
        process_name: &str,
        upper: NaiveDate,
        floor: Option<NaiveDate>,
    ) -> RepositoryResult<Vec<CapacityRecord>> {
        let conn = self.get_conn()?;
        let records = match floor {
            Some(floor) => {
                let sql = format!(
                    "{} WHERE process_name = ?1 AND plan_date <= ?2 AND plan_date >= ?3 ORDER BY plan_date DESC",
                    SELECT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![process_name, upper, floor], map_row)?
                    .collect::<SqliteResult<Vec<CapacityRecord>>>()?;
                rows
            }
            None => {
                let sql = format!(
                    "{} WHERE process_name = ?1 AND plan_date <= ?2 ORDER BY plan_date DESC",
                    SELECT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![process_name, upper], map_row)?
                    .collect::<SqliteResult<Vec<CapacityRecord>>>()?;
                rows
            }
        };
        Ok(records)
    }

    /// 顺序扫描: after < plan_date <= ceiling（日期升序）
    pub fn scan_ascending(
        &self,
        process_name: &str,
        after: NaiveDate,
        ceiling: NaiveDate,
    ) -> RepositoryResult<Vec<CapacityRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE process_name = ?1 AND plan_date > ?2 AND plan_date <= ?3 ORDER BY plan_date",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![process_name, after, ceiling], map_row)?
            .collect::<SqliteResult<Vec<CapacityRecord>>>()?;
        Ok(records)
    }

    /// 查询全部台账单元格（工序、日期升序）
    pub fn list_all(&self) -> RepositoryResult<Vec<CapacityRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("{} ORDER BY process_name, plan_date", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([], map_row)?
            .collect::<SqliteResult<Vec<CapacityRecord>>>()?;
        Ok(records)
    }

    // ==========================================
    // 日历播种（外部日历/工位配置提供方）
    // ==========================================

    /// 批量写入日历配置
    ///
    /// 已存在的单元格只更新班次工时/工位数，占用工时保留，派生字段同步重算
    ///
    /// # 返回
    /// - Ok(usize): 写入的单元格数
    pub fn seed_calendar(&self, seeds: &[CalendarSeed]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().naive_utc();

        let mut count = 0;
        for seed in seeds {
            let existing = select_cell(&tx, &seed.process_name, seed.plan_date)?;
            match existing {
                Some(record) => {
                    let (remaining, shift_equiv) =
                        derive_remaining(seed.shift_hours, seed.workstation_count, record.occupied_hours);
                    count += tx.execute(
                        r#"
                        UPDATE capacity_ledger
                        SET shift_hours = ?1, workstation_count = ?2,
                            remaining_hours = ?3, remaining_shift_equiv = ?4,
                            revision = revision + 1, updated_at = ?5
                        WHERE process_name = ?6 AND plan_date = ?7
                        "#,
                        params![
                            seed.shift_hours,
                            seed.workstation_count,
                            remaining,
                            shift_equiv,
                            now,
                            seed.process_name,
                            seed.plan_date,
                        ],
                    )?;
                }
                None => {
                    let record = CapacityRecord::new(
                        seed.process_name.clone(),
                        seed.plan_date,
                        seed.shift_hours,
                        seed.workstation_count,
                        now,
                    );
                    count += tx.execute(
                        r#"
                        INSERT INTO capacity_ledger (
                            process_name, plan_date, shift_hours, workstation_count,
                            occupied_hours, remaining_hours, remaining_shift_equiv,
                            revision, updated_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                        "#,
                        params![
                            record.process_name,
                            record.plan_date,
                            record.shift_hours,
                            record.workstation_count,
                            record.occupied_hours,
                            record.remaining_hours,
                            record.remaining_shift_equiv,
                            record.revision,
                            record.updated_at,
                        ],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(count)
    }

    /// 删除工序在日期范围内的台账（日历重新播种前调用）
    pub fn clear_calendar_range(
        &self,
        process_name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM capacity_ledger WHERE process_name = ?1 AND plan_date BETWEEN ?2 AND ?3",
            params![process_name, start_date, end_date],
        )?;
        Ok(rows)
    }

    // ==========================================
    // 原子写入
    // ==========================================

    /// 在单个 IMMEDIATE 事务内读-改-写一个单元格的占用工时
    ///
    /// # 参数
    /// - draft: 台账日志意图（同事务落库）
    /// - expected_revision: 调用方持有的 revision（不一致则乐观锁冲突）
    /// - compute: 基于事务内快照给出新的占用工时
    ///
    /// # 错误
    /// - `RepositoryError::NotFound`: 单元格未配置
    /// - `RepositoryError::OptimisticLockFailure`: revision 不匹配
    /// - `RepositoryError::DatabaseBusy`: 写锁等待超时
    pub fn update_occupied<F>(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
        draft: LedgerLogDraft,
        expected_revision: Option<i64>,
        compute: F,
    ) -> RepositoryResult<OccupiedWrite>
    where
        F: FnOnce(CellSnapshot<'_>) -> OccupiedChange,
    {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let before = select_cell(&tx, process_name, plan_date)?.ok_or_else(|| {
            RepositoryError::NotFound {
                entity: "CapacityRecord".to_string(),
                id: cell_key(process_name, plan_date),
            }
        })?;

        if let Some(expected) = expected_revision {
            if expected != before.revision {
                return Err(RepositoryError::OptimisticLockFailure {
                    cell: cell_key(process_name, plan_date),
                    expected,
                    actual: before.revision,
                });
            }
        }

        let live_plan_hours = sum_live_plan_hours(&tx, process_name, plan_date)?;
        let change = compute(CellSnapshot {
            record: &before,
            live_plan_hours,
        });

        let now = Utc::now().naive_utc();
        let after = write_cell(&tx, &before, change.occupied_hours, now)?;
        insert_in_tx(&tx, &build_log(&draft, &before, &after, &change, now))?;

        tx.commit()?;

        Ok(OccupiedWrite {
            before,
            after,
            drift_hours: change.drift_hours,
        })
    }

    /// 在单个 EXCLUSIVE 事务内遍历全部单元格并改写占用工时
    ///
    /// compute 返回 None 表示该单元格无需写入
    pub fn update_all_occupied<F>(&self, action: LedgerAction, mut compute: F) -> RepositoryResult<BulkOccupiedWrite>
    where
        F: FnMut(CellSnapshot<'_>) -> Option<OccupiedChange>,
    {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;

        let records = {
            let sql = format!("{} ORDER BY process_name, plan_date", SELECT_COLUMNS);
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_row)?
                .collect::<SqliteResult<Vec<CapacityRecord>>>()?;
            rows
        };

        let now = Utc::now().naive_utc();
        let mut result = BulkOccupiedWrite {
            total_records: records.len(),
            writes: Vec::new(),
        };

        for before in records {
            let live_plan_hours = sum_live_plan_hours(&tx, &before.process_name, before.plan_date)?;
            let change = match compute(CellSnapshot {
                record: &before,
                live_plan_hours,
            }) {
                Some(change) => change,
                None => continue,
            };

            let after = write_cell(&tx, &before, change.occupied_hours, now)?;
            let draft = LedgerLogDraft::new(action, 0.0);
            insert_in_tx(&tx, &build_log(&draft, &before, &after, &change, now))?;

            result.writes.push(OccupiedWrite {
                before,
                after,
                drift_hours: change.drift_hours,
            });
        }

        tx.commit()?;
        Ok(result)
    }
}

// ==========================================
// 内部辅助
// ==========================================

fn select_cell(
    conn: &Connection,
    process_name: &str,
    plan_date: NaiveDate,
) -> RepositoryResult<Option<CapacityRecord>> {
    let sql = format!("{} WHERE process_name = ?1 AND plan_date = ?2", SELECT_COLUMNS);
    let record = conn
        .query_row(&sql, params![process_name, plan_date], map_row)
        .optional()?;
    Ok(record)
}

fn sum_live_plan_hours(conn: &Connection, process_name: &str, plan_date: NaiveDate) -> RepositoryResult<f64> {
    let total: f64 = conn.query_row(
        r#"
        SELECT COALESCE(SUM(scheduled_work_hours), 0.0)
        FROM plan_row
        WHERE process_name = ?1 AND schedule_date = ?2
        "#,
        params![process_name, plan_date],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// 写入占用工时 + 派生字段（同一条 UPDATE），带 revision 条件
fn write_cell(
    conn: &Connection,
    before: &CapacityRecord,
    occupied_hours: f64,
    now: NaiveDateTime,
) -> RepositoryResult<CapacityRecord> {
    let mut after = before.with_occupied(occupied_hours);
    after.revision = before.revision + 1;
    after.updated_at = now;

    let rows = conn.execute(
        r#"
        UPDATE capacity_ledger
        SET occupied_hours = ?1, remaining_hours = ?2, remaining_shift_equiv = ?3,
            revision = revision + 1, updated_at = ?4
        WHERE process_name = ?5 AND plan_date = ?6 AND revision = ?7
        "#,
        params![
            after.occupied_hours,
            after.remaining_hours,
            after.remaining_shift_equiv,
            now,
            before.process_name,
            before.plan_date,
            before.revision,
        ],
    )?;

    if rows == 0 {
        let actual: Option<i64> = conn
            .query_row(
                "SELECT revision FROM capacity_ledger WHERE process_name = ?1 AND plan_date = ?2",
                params![before.process_name, before.plan_date],
                |row| row.get(0),
            )
            .optional()?;

        return match actual {
            Some(actual) => Err(RepositoryError::OptimisticLockFailure {
                cell: cell_key(&before.process_name, before.plan_date),
                expected: before.revision,
                actual,
            }),
            None => Err(RepositoryError::NotFound {
                entity: "CapacityRecord".to_string(),
                id: cell_key(&before.process_name, before.plan_date),
            }),
        };
    }

    Ok(after)
}

fn build_log(
    draft: &LedgerLogDraft,
    before: &CapacityRecord,
    after: &CapacityRecord,
    change: &OccupiedChange,
    now: NaiveDateTime,
) -> LedgerLog {
    LedgerLog {
        log_id: Uuid::new_v4().to_string(),
        action: draft.action,
        process_name: before.process_name.clone(),
        plan_date: before.plan_date,
        delta_hours: match draft.action {
            LedgerAction::Commit | LedgerAction::Release => draft.delta_hours,
            LedgerAction::Recalc | LedgerAction::Reset => after.occupied_hours - before.occupied_hours,
        },
        occupied_before: before.occupied_hours,
        occupied_after: after.occupied_hours,
        drift_hours: change.drift_hours,
        detail: change.detail.clone(),
        created_at: now,
    }
}

fn map_row(row: &rusqlite::Row) -> rusqlite::Result<CapacityRecord> {
    Ok(CapacityRecord {
        process_name: row.get(0)?,
        plan_date: row.get(1)?,
        shift_hours: row.get(2)?,
        workstation_count: row.get(3)?,
        occupied_hours: row.get(4)?,
        remaining_hours: row.get(5)?,
        remaining_shift_equiv: row.get(6)?,
        revision: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
