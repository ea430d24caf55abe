// ==========================================
// 工序产能排程系统 - 引擎层
// ==========================================
// 职责: 日产能汇总、倒排/顺延分配、台账写入
// 红线: Engine 不拼 SQL
// 红线: occupied_hours 只经 LedgerMutator 写入
// ==========================================

pub mod backward_allocator;
pub mod daily_aggregator;
pub mod error;
pub mod forward_allocator;
pub mod ledger_mutator;
pub mod plan_allocation;
pub mod repositories;

// 重导出核心引擎
pub use backward_allocator::{AllocationWindow, BackwardAllocator, DayAllocation};
pub use daily_aggregator::{DailyAggregator, DailyCapacity};
pub use error::{SchedulingError, SchedulingResult, SearchDirection};
pub use forward_allocator::ForwardAllocator;
pub use ledger_mutator::{CellRecalcOutcome, LedgerMutator, ResetSummary};
pub use plan_allocation::{PlanAllocationService, ScheduledPlan};
pub use repositories::LedgerRepositories;
