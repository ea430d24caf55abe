// ==========================================
// 工序产能排程系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合分配/台账引擎所需的所有 Repository
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{CapacityLedgerRepository, LedgerLogRepository, PlanRowRepository};

/// 台账引擎仓储集合
///
/// # 包含的仓储
/// - `capacity_repo`: 产能台账
/// - `plan_row_repo`: 工序计划行
/// - `ledger_log_repo`: 台账写入日志
#[derive(Clone)]
pub struct LedgerRepositories {
    pub capacity_repo: Arc<CapacityLedgerRepository>,
    pub plan_row_repo: Arc<PlanRowRepository>,
    pub ledger_log_repo: Arc<LedgerLogRepository>,
}

impl LedgerRepositories {
    /// 创建新的仓储集合
    pub fn new(
        capacity_repo: Arc<CapacityLedgerRepository>,
        plan_row_repo: Arc<PlanRowRepository>,
        ledger_log_repo: Arc<LedgerLogRepository>,
    ) -> Self {
        Self {
            capacity_repo,
            plan_row_repo,
            ledger_log_repo,
        }
    }

    /// 所有仓储共享同一个连接
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            capacity_repo: Arc::new(CapacityLedgerRepository::from_connection(conn.clone())),
            plan_row_repo: Arc::new(PlanRowRepository::new(conn.clone())),
            ledger_log_repo: Arc::new(LedgerLogRepository::new(conn)),
        }
    }
}
