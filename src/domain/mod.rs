// ==========================================
// 工序产能排程系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod capacity;
pub mod ledger_log;
pub mod plan_row;
pub mod types;

// 重导出核心类型
pub use capacity::{derive_remaining, CalendarSeed, CapacityRecord, SpareCapacity};
pub use ledger_log::{LedgerLog, LedgerLogDraft};
pub use plan_row::{PlanRow, SchedulingRequest};
pub use types::{LedgerAction, ResetMode, DEFAULT_MIN_REMAINING_HOURS, HOURS_EPSILON};
