// ==========================================
// 工序产能排程系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod capacity_repo;
pub mod error;
pub mod ledger_log_repo;
pub mod plan_row_repo;

// 重导出核心仓储
pub use capacity_repo::{
    BulkOccupiedWrite, CapacityLedgerRepository, CellSnapshot, OccupiedChange, OccupiedWrite,
};
pub use error::{RepositoryError, RepositoryResult};
pub use ledger_log_repo::LedgerLogRepository;
pub use plan_row_repo::PlanRowRepository;
