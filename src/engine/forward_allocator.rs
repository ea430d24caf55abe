// ==========================================
// 工序产能排程系统 - 顺延分配引擎
// ==========================================
// 用途: 当日无法完全承接的工时顺延到之后的可用日，
//       且不超过已算出的结束日（上限日）
// 红线: 剩余工时必须严格大于阈值
// 红线: 无可行日期直接上报，不自动重试
// ==========================================

use crate::domain::capacity::SpareCapacity;
use crate::engine::backward_allocator::validate_threshold;
use crate::engine::error::{SchedulingError, SchedulingResult, SearchDirection};
use crate::repository::CapacityLedgerRepository;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::instrument;

pub struct ForwardAllocator {
    capacity_repo: Arc<CapacityLedgerRepository>,
}

impl ForwardAllocator {
    pub fn new(capacity_repo: Arc<CapacityLedgerRepository>) -> Self {
        Self { capacity_repo }
    }

    /// 计算下一个可排日期（after < date <= ceiling，升序首个 remaining > 阈值）
    ///
    /// # 错误
    /// - `NoFeasibleDate`: 区间内没有满足条件的日期（含 after >= ceiling 的空区间）
    #[instrument(skip(self), fields(process = %process_name, after = %after_date, ceiling = %ceiling_date))]
    pub fn compute_next_schedule_date(
        &self,
        process_name: &str,
        after_date: NaiveDate,
        ceiling_date: NaiveDate,
        min_remaining_hours: f64,
    ) -> SchedulingResult<NaiveDate> {
        validate_threshold(min_remaining_hours)?;

        if after_date < ceiling_date {
            let records = self
                .capacity_repo
                .scan_ascending(process_name, after_date, ceiling_date)?;

            if let Some(record) = records
                .iter()
                .find(|record| record.exceeds_threshold(min_remaining_hours))
            {
                return Ok(record.plan_date);
            }
        }

        tracing::warn!(threshold = min_remaining_hours, "顺延区间内无可用日期");
        Err(SchedulingError::NoFeasibleDate {
            process_name: process_name.to_string(),
            direction: SearchDirection::Forward,
            anchor: after_date,
            ceiling: Some(ceiling_date),
            threshold: min_remaining_hours,
        })
    }
}
