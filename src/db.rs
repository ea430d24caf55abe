// ==========================================
// 工序产能排程系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入台账时的偶发 busy 错误
// - 提供建表入口（产能台账 / 工序计划行 / 台账日志 / 配置）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

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

/// 初始化数据库 schema（幂等）
///
/// 表:
/// - capacity_ledger: 每个 (工序, 日期) 一行，remaining_* 为派生列，只随 occupied_hours 一起写入
/// - plan_row: 工序计划行，occupied_hours 的事实来源
/// - ledger_log: 台账写入审计
/// - config_scope / config_kv: 策略配置
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS capacity_ledger (
            process_name TEXT NOT NULL,
            plan_date TEXT NOT NULL,
            shift_hours REAL NOT NULL DEFAULT 0,
            workstation_count INTEGER NOT NULL DEFAULT 0,
            occupied_hours REAL NOT NULL DEFAULT 0,
            remaining_hours REAL NOT NULL DEFAULT 0,
            remaining_shift_equiv REAL NOT NULL DEFAULT 0,
            revision INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (process_name, plan_date)
        );

        CREATE TABLE IF NOT EXISTS plan_row (
            row_id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL,
            process_name TEXT NOT NULL,
            schedule_date TEXT NOT NULL,
            scheduled_work_hours REAL NOT NULL,
            row_ordinal INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_plan_row_cell
            ON plan_row (process_name, schedule_date);
        CREATE INDEX IF NOT EXISTS idx_plan_row_plan
            ON plan_row (plan_id);

        CREATE TABLE IF NOT EXISTS ledger_log (
            log_id TEXT PRIMARY KEY,
            action TEXT NOT NULL,
            process_name TEXT NOT NULL,
            plan_date TEXT NOT NULL,
            delta_hours REAL NOT NULL,
            occupied_before REAL NOT NULL,
            occupied_after REAL NOT NULL,
            drift_hours REAL NOT NULL DEFAULT 0,
            detail TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ledger_log_cell
            ON ledger_log (process_name, plan_date);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
