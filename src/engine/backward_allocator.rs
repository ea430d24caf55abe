// ==========================================
// 工序产能排程系统 - 倒排分配引擎
// ==========================================
// 策略: 有限产能倒排（尽可能晚，但不晚于交期）
// 1) 结束日: 交期当天或之前、剩余工时 >= 阈值的最近一天
// 2) 开始日: 自结束日倒序累加合格日的剩余工时，首次达到需求工时的那一天
// 红线: 日期只按日历日比较，不含时刻
// ==========================================

use crate::domain::capacity::{CapacityRecord, SpareCapacity};
use crate::domain::plan_row::SchedulingRequest;
use crate::domain::types::HOURS_EPSILON;
use crate::engine::error::{SchedulingError, SchedulingResult, SearchDirection};
use crate::repository::CapacityLedgerRepository;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// 单日分配明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayAllocation {
    pub date: NaiveDate,
    /// 扫描时读到的剩余工时
    pub remaining_hours: f64,
    /// 该日承接的工时
    pub allocated_hours: f64,
}

/// 倒排窗口（结束日、开始日及逐日消耗，日期降序）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationWindow {
    pub process_name: String,
    pub end_date: NaiveDate,
    pub start_date: NaiveDate,
    pub required_hours: f64,
    pub days: Vec<DayAllocation>,
}

/// 累加失败时的已累计工时
struct Shortfall {
    accumulated_hours: f64,
}

// ==========================================
// BackwardAllocator - 倒排分配
// ==========================================
pub struct BackwardAllocator {
    capacity_repo: Arc<CapacityLedgerRepository>,
    /// 回看天数（0 = 扫描全部历史）
    horizon_days: i64,
}

impl BackwardAllocator {
    pub fn new(capacity_repo: Arc<CapacityLedgerRepository>) -> Self {
        Self {
            capacity_repo,
            horizon_days: 0,
        }
    }

    /// 限定倒序扫描的回看天数
    pub fn with_horizon_days(mut self, horizon_days: i64) -> Self {
        self.horizon_days = horizon_days.max(0);
        self
    }

    fn scan(&self, process_name: &str, upper: NaiveDate) -> SchedulingResult<Vec<CapacityRecord>> {
        let floor = if self.horizon_days > 0 {
            upper.checked_sub_signed(Duration::days(self.horizon_days))
        } else {
            None
        };
        Ok(self.capacity_repo.scan_descending(process_name, upper, floor)?)
    }

    /// 计算结束日
    ///
    /// # 错误
    /// - `NoFeasibleDate`: 交期及之前没有剩余工时 >= 阈值的日期
    #[instrument(skip(self), fields(process = %process_name, due = %due_date))]
    pub fn compute_end_date(
        &self,
        process_name: &str,
        due_date: NaiveDate,
        min_remaining_hours: f64,
    ) -> SchedulingResult<NaiveDate> {
        validate_threshold(min_remaining_hours)?;
        let records = self.scan(process_name, due_date)?;

        match find_end_index(&records, min_remaining_hours) {
            Some(idx) => {
                let end_date = records[idx].plan_date;
                if end_date != due_date {
                    tracing::debug!(%end_date, "交期当日不可用，结束日前移");
                }
                Ok(end_date)
            }
            None => Err(no_feasible_backward(process_name, due_date, min_remaining_hours)),
        }
    }

    /// 计算开始日
    ///
    /// # 错误
    /// - `InvalidInput`: 需求工时非正
    /// - `InsufficientCapacity`: 累计剩余工时始终不足（带累计值与缺口）
    #[instrument(skip(self), fields(process = %process_name, end = %end_date))]
    pub fn compute_start_date(
        &self,
        process_name: &str,
        end_date: NaiveDate,
        required_work_hours: f64,
        min_remaining_hours: f64,
    ) -> SchedulingResult<NaiveDate> {
        validate_required(required_work_hours)?;
        validate_threshold(min_remaining_hours)?;
        let records = self.scan(process_name, end_date)?;

        match accumulate(&records, required_work_hours, min_remaining_hours) {
            Ok(days) => Ok(start_of(&days, end_date)),
            Err(shortfall) => Err(insufficient(
                process_name,
                end_date,
                required_work_hours,
                shortfall.accumulated_hours,
            )),
        }
    }

    /// 单次倒序扫描同时求结束日、开始日与逐日消耗
    ///
    /// 与先后调用 compute_end_date / compute_start_date 结果一致
    #[instrument(skip(self, request), fields(
        process = %request.process_name,
        due = %request.due_date,
        required = request.required_work_hours
    ))]
    pub fn allocate_window(&self, request: &SchedulingRequest) -> SchedulingResult<AllocationWindow> {
        validate_required(request.required_work_hours)?;
        validate_threshold(request.min_remaining_hours)?;

        let records = self.scan(&request.process_name, request.due_date)?;
        let end_idx = find_end_index(&records, request.min_remaining_hours).ok_or_else(|| {
            no_feasible_backward(&request.process_name, request.due_date, request.min_remaining_hours)
        })?;
        let end_date = records[end_idx].plan_date;

        let days = accumulate(
            &records[end_idx..],
            request.required_work_hours,
            request.min_remaining_hours,
        )
        .map_err(|shortfall| {
            insufficient(
                &request.process_name,
                end_date,
                request.required_work_hours,
                shortfall.accumulated_hours,
            )
        })?;

        let window = AllocationWindow {
            process_name: request.process_name.clone(),
            end_date,
            start_date: start_of(&days, end_date),
            required_hours: request.required_work_hours,
            days,
        };

        tracing::info!(
            start_date = %window.start_date,
            end_date = %window.end_date,
            day_count = window.days.len(),
            "倒排窗口计算完成"
        );

        Ok(window)
    }
}

// ==========================================
// 纯函数（输入均为日期降序的台账记录）
// ==========================================

fn find_end_index(records: &[CapacityRecord], min_remaining_hours: f64) -> Option<usize> {
    records
        .iter()
        .position(|record| record.meets_threshold(min_remaining_hours))
}

/// 倒序累加合格日的剩余工时，返回逐日消耗（日期降序）
fn accumulate(
    records: &[CapacityRecord],
    required_work_hours: f64,
    min_remaining_hours: f64,
) -> Result<Vec<DayAllocation>, Shortfall> {
    let mut accumulated = 0.0;
    let mut days = Vec::new();

    for record in records.iter().filter(|r| r.meets_threshold(min_remaining_hours)) {
        let still_needed = required_work_hours - accumulated;
        let allocated = record.remaining_hours.min(still_needed);
        accumulated += record.remaining_hours;

        if allocated > HOURS_EPSILON {
            days.push(DayAllocation {
                date: record.plan_date,
                remaining_hours: record.remaining_hours,
                allocated_hours: allocated,
            });
        }

        if accumulated + HOURS_EPSILON >= required_work_hours {
            return Ok(days);
        }
    }

    Err(Shortfall {
        accumulated_hours: accumulated,
    })
}

fn start_of(days: &[DayAllocation], end_date: NaiveDate) -> NaiveDate {
    days.last().map(|day| day.date).unwrap_or(end_date)
}

fn validate_required(required_work_hours: f64) -> SchedulingResult<()> {
    if !required_work_hours.is_finite() || required_work_hours <= 0.0 {
        return Err(SchedulingError::InvalidInput(format!(
            "需求工时必须为正数: {}",
            required_work_hours
        )));
    }
    Ok(())
}

pub(crate) fn validate_threshold(min_remaining_hours: f64) -> SchedulingResult<()> {
    if !min_remaining_hours.is_finite() {
        return Err(SchedulingError::InvalidInput(format!(
            "剩余工时阈值非法: {}",
            min_remaining_hours
        )));
    }
    Ok(())
}

fn no_feasible_backward(process_name: &str, anchor: NaiveDate, threshold: f64) -> SchedulingError {
    SchedulingError::NoFeasibleDate {
        process_name: process_name.to_string(),
        direction: SearchDirection::Backward,
        anchor,
        ceiling: None,
        threshold,
    }
}

fn insufficient(process_name: &str, end_date: NaiveDate, required: f64, accumulated: f64) -> SchedulingError {
    SchedulingError::InsufficientCapacity {
        process_name: process_name.to_string(),
        end_date,
        required_hours: required,
        accumulated_hours: accumulated,
        shortfall_hours: required - accumulated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{d, seed_pack_fixture, setup_repos};

    fn allocator() -> BackwardAllocator {
        let repos = setup_repos();
        seed_pack_fixture(&repos);
        BackwardAllocator::new(repos.capacity_repo.clone())
    }

    #[test]
    fn test_end_date_on_due_date_when_usable() {
        assert_eq!(allocator().compute_end_date("Pack", d(5), 0.5).unwrap(), d(5));
    }

    #[test]
    fn test_end_date_rolls_back_past_sliver() {
        // 01-03 剩余 0.3 < 0.5，回退到 01-02
        assert_eq!(allocator().compute_end_date("Pack", d(3), 0.5).unwrap(), d(2));
    }

    #[test]
    fn test_end_date_exhausted_history() {
        let err = allocator().compute_end_date("Pack", d(1), 0.5).unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::NoFeasibleDate {
                direction: SearchDirection::Backward,
                ..
            }
        ));
    }

    #[test]
    fn test_start_date_accumulates_latest_first() {
        // 1 -> 6 -> 8，在 01-02 达到 7
        assert_eq!(allocator().compute_start_date("Pack", d(5), 7.0, 0.5).unwrap(), d(2));
        assert_eq!(allocator().compute_start_date("Pack", d(5), 1.0, 0.5).unwrap(), d(5));
        assert_eq!(allocator().compute_start_date("Pack", d(5), 6.0, 0.5).unwrap(), d(4));
    }

    #[test]
    fn test_start_date_insufficient_capacity() {
        let err = allocator().compute_start_date("Pack", d(5), 9.0, 0.5).unwrap_err();
        match err {
            SchedulingError::InsufficientCapacity {
                accumulated_hours,
                shortfall_hours,
                ..
            } => {
                assert!((accumulated_hours - 8.0).abs() < 1e-9);
                assert!((shortfall_hours - 1.0).abs() < 1e-9);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_start_date_rejects_non_positive_requirement() {
        assert!(matches!(
            allocator().compute_start_date("Pack", d(5), 0.0, 0.5),
            Err(SchedulingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_allocate_window_matches_two_scans() {
        let allocator = allocator();
        let request = SchedulingRequest::new("Pack", 7.0, d(5));
        let window = allocator.allocate_window(&request).unwrap();

        assert_eq!(window.end_date, allocator.compute_end_date("Pack", d(5), 0.5).unwrap());
        assert_eq!(
            window.start_date,
            allocator.compute_start_date("Pack", window.end_date, 7.0, 0.5).unwrap()
        );

        let consumed: Vec<(NaiveDate, f64)> = window.days.iter().map(|day| (day.date, day.allocated_hours)).collect();
        assert_eq!(consumed, vec![(d(5), 1.0), (d(4), 5.0), (d(2), 1.0)]);
    }

    #[test]
    fn test_horizon_bounds_scan() {
        let repos = setup_repos();
        seed_pack_fixture(&repos);
        let allocator = BackwardAllocator::new(repos.capacity_repo.clone()).with_horizon_days(1);

        // 仅扫描 01-04..01-05：1 + 5 = 6 < 7
        assert!(matches!(
            allocator.compute_start_date("Pack", d(5), 7.0, 0.5),
            Err(SchedulingError::InsufficientCapacity { .. })
        ));
    }
}
