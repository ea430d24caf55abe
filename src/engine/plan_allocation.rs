// ==========================================
// 工序产能排程系统 - 计划分配服务
// ==========================================
// 职责: 工序计划行的增删改 + 同步台账占用
// 工序名为参数，所有工序共用一个服务实例
// ==========================================
// 红线: 台账只经 LedgerMutator 写入
// 红线: 分配失败时回滚本次写入的计划行，并重算涉及单元格
// ==========================================

use crate::domain::plan_row::{PlanRow, SchedulingRequest};
use crate::domain::types::HOURS_EPSILON;
use crate::engine::backward_allocator::BackwardAllocator;
use crate::engine::daily_aggregator::DailyAggregator;
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::forward_allocator::ForwardAllocator;
use crate::engine::ledger_mutator::{CellRecalcOutcome, LedgerMutator};
use crate::engine::repositories::LedgerRepositories;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

/// 排程结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPlan {
    pub plan_id: String,
    pub process_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// 写入的计划行（日期升序）
    pub rows: Vec<PlanRow>,
}

impl ScheduledPlan {
    pub fn total_hours(&self) -> f64 {
        self.rows.iter().map(|row| row.scheduled_work_hours).sum()
    }
}

// ==========================================
// PlanAllocationService - 计划分配服务
// ==========================================
pub struct PlanAllocationService {
    repos: LedgerRepositories,
    backward: BackwardAllocator,
    forward: ForwardAllocator,
    aggregator: DailyAggregator,
    mutator: Arc<LedgerMutator>,
}

impl PlanAllocationService {
    pub fn new(repos: LedgerRepositories, mutator: Arc<LedgerMutator>) -> Self {
        let horizon_days = mutator.policy().backward_horizon_days;
        Self {
            backward: BackwardAllocator::new(repos.capacity_repo.clone()).with_horizon_days(horizon_days),
            forward: ForwardAllocator::new(repos.capacity_repo.clone()),
            aggregator: DailyAggregator::new(repos.capacity_repo.clone(), repos.plan_row_repo.clone()),
            repos,
            mutator,
        }
    }

    /// 倒排并落库
    ///
    /// 逐日消耗工时生成计划行，再逐行占用台账
    #[instrument(skip(self, request), fields(plan_id = %plan_id, process = %request.process_name))]
    pub fn schedule(&self, plan_id: &str, request: &SchedulingRequest) -> SchedulingResult<ScheduledPlan> {
        let window = self.backward.allocate_window(request)?;

        let mut rows = Vec::with_capacity(window.days.len());
        for day in window.days.iter().rev() {
            let ordinal = self.repos.plan_row_repo.next_ordinal(&request.process_name, day.date)?;
            rows.push(PlanRow::new(
                plan_id,
                request.process_name.clone(),
                day.date,
                day.allocated_hours,
                ordinal,
            ));
        }

        self.repos.plan_row_repo.insert_batch(&rows)?;
        self.commit_rows(&rows)?;

        tracing::info!(
            start_date = %window.start_date,
            end_date = %window.end_date,
            row_count = rows.len(),
            "计划排程完成"
        );

        Ok(ScheduledPlan {
            plan_id: plan_id.to_string(),
            process_name: request.process_name.clone(),
            start_date: window.start_date,
            end_date: window.end_date,
            rows,
        })
    }

    /// 在指定日期追加工时，超出当日可用部分顺延到之后的可用日
    ///
    /// # 参数
    /// - ceiling_date: 顺延上限（None 时为 date + forward_ceiling_days）
    ///
    /// # 错误
    /// - `NoFeasibleDate`: 上限内无法放下全部工时（本次写入全部回滚）
    #[instrument(skip(self), fields(plan_id = %plan_id, process = %process_name, date = %date))]
    pub fn add_row(
        &self,
        plan_id: &str,
        process_name: &str,
        date: NaiveDate,
        hours: f64,
        ceiling_date: Option<NaiveDate>,
    ) -> SchedulingResult<Vec<PlanRow>> {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(SchedulingError::InvalidInput(format!("追加工时必须为正数: {}", hours)));
        }

        let policy = self.mutator.policy();
        let ceiling = match ceiling_date {
            Some(ceiling) => ceiling,
            None => date
                .checked_add_signed(Duration::days(policy.forward_ceiling_days))
                .unwrap_or(NaiveDate::MAX),
        };

        let mut written: Vec<PlanRow> = Vec::new();
        let mut still_needed = hours;
        let mut current = date;

        loop {
            let available = self.aggregator.daily_available_hours(process_name, current, None)?;
            let take = still_needed.min(available.max(0.0));

            if take > HOURS_EPSILON {
                match self.write_row(plan_id, process_name, current, take) {
                    Ok(row) => written.push(row),
                    Err(err) => {
                        self.rollback_rows(&written);
                        return Err(err);
                    }
                }
                still_needed -= take;
            }

            if still_needed <= HOURS_EPSILON {
                break;
            }

            current = match self.forward.compute_next_schedule_date(
                process_name,
                current,
                ceiling,
                policy.min_remaining_hours,
            ) {
                Ok(next) => next,
                Err(err) => {
                    tracing::warn!(unplaced_hours = still_needed, %ceiling, "顺延失败，回滚本次追加");
                    self.rollback_rows(&written);
                    return Err(err);
                }
            };
            tracing::debug!(next_date = %current, still_needed, "剩余工时顺延");
        }

        Ok(written)
    }

    /// 删除计划实体，逐行释放台账占用
    ///
    /// 未配置的单元格视为无可释放；其余释放失败的单元格按现存计划行重算
    ///
    /// # 返回
    /// 被删除的计划行
    #[instrument(skip(self))]
    pub fn delete_plan(&self, plan_id: &str) -> SchedulingResult<Vec<PlanRow>> {
        let rows = self.repos.plan_row_repo.find_by_plan(plan_id)?;
        if rows.is_empty() {
            return Ok(rows);
        }

        self.repos.plan_row_repo.delete_by_plan(plan_id)?;

        // 单格释放失败不中断其余单元格；失败单元格改按现存计划行重算
        let mut failed_cells = BTreeSet::new();
        for row in &rows {
            match self
                .mutator
                .apply_delta(&row.process_name, row.schedule_date, -row.scheduled_work_hours)
            {
                Ok(_) => {}
                Err(SchedulingError::NotConfigured { .. }) => {
                    tracing::debug!(process = %row.process_name, date = %row.schedule_date, "单元格未配置，无需释放");
                }
                Err(err) => {
                    tracing::warn!(process = %row.process_name, date = %row.schedule_date, error = %err, "释放失败，改为重算");
                    failed_cells.insert((row.process_name.clone(), row.schedule_date));
                }
            }
        }

        let mut first_error = None;
        for (process_name, date) in failed_cells {
            match self.mutator.recalculate_cell(&process_name, date) {
                Ok(_) | Err(SchedulingError::NotConfigured { .. }) => {}
                Err(err) => {
                    tracing::error!(process = %process_name, %date, error = %err, "重算失败，单元格需全台账重置修复");
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        tracing::info!(row_count = rows.len(), "计划已删除，台账已释放");
        Ok(rows)
    }

    /// 修改计划行工时后按现存计划行重算单元格（批量编辑路径）
    #[instrument(skip(self))]
    pub fn edit_row_hours(&self, row_id: &str, hours: f64) -> SchedulingResult<CellRecalcOutcome> {
        if !hours.is_finite() || hours < 0.0 {
            return Err(SchedulingError::InvalidInput(format!("计划行工时不能为负: {}", hours)));
        }

        let row = self
            .repos
            .plan_row_repo
            .find_by_id(row_id)?
            .ok_or_else(|| SchedulingError::InvalidInput(format!("计划行不存在: {}", row_id)))?;

        self.repos.plan_row_repo.update_hours(row_id, hours)?;
        self.mutator.recalculate_cell(&row.process_name, row.schedule_date)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn write_row(&self, plan_id: &str, process_name: &str, date: NaiveDate, hours: f64) -> SchedulingResult<PlanRow> {
        let ordinal = self.repos.plan_row_repo.next_ordinal(process_name, date)?;
        let row = PlanRow::new(plan_id, process_name, date, hours, ordinal);
        self.repos.plan_row_repo.insert(&row)?;

        if let Err(err) = self.mutator.apply_delta(process_name, date, hours) {
            self.rollback_rows(std::slice::from_ref(&row));
            return Err(err);
        }
        Ok(row)
    }

    fn commit_rows(&self, rows: &[PlanRow]) -> SchedulingResult<()> {
        for row in rows {
            if let Err(err) = self
                .mutator
                .apply_delta(&row.process_name, row.schedule_date, row.scheduled_work_hours)
            {
                tracing::warn!(error = %err, "台账占用失败，回滚计划行");
                self.rollback_rows(rows);
                return Err(err);
            }
        }
        Ok(())
    }

    /// 删除计划行并按现存计划行重算涉及单元格（尽力而为）
    fn rollback_rows(&self, rows: &[PlanRow]) {
        let mut cells = BTreeSet::new();
        for row in rows {
            if let Err(err) = self.repos.plan_row_repo.delete_by_id(&row.row_id) {
                tracing::warn!(row_id = %row.row_id, error = %err, "回滚计划行失败");
            }
            cells.insert((row.process_name.clone(), row.schedule_date));
        }

        for (process_name, date) in cells {
            match self.mutator.recalculate_cell(&process_name, date) {
                Ok(_) | Err(SchedulingError::NotConfigured { .. }) => {}
                Err(err) => {
                    tracing::warn!(process = %process_name, %date, error = %err, "回滚后重算单元格失败");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerPolicy;
    use crate::engine::test_support::{d, seed, seed_pack_fixture, setup_repos};

    fn service(repos: &LedgerRepositories) -> PlanAllocationService {
        let mutator = Arc::new(LedgerMutator::new(repos.capacity_repo.clone(), LedgerPolicy::default()));
        PlanAllocationService::new(repos.clone(), mutator)
    }

    fn remaining(repos: &LedgerRepositories, day: u32) -> f64 {
        repos
            .capacity_repo
            .find_by_process_and_date("Pack", d(day))
            .unwrap()
            .unwrap()
            .remaining_hours
    }

    #[test]
    fn test_schedule_spreads_rows_and_commits_ledger() {
        let repos = setup_repos();
        seed_pack_fixture(&repos);
        let service = service(&repos);

        let plan = service
            .schedule("P1", &SchedulingRequest::new("Pack", 7.0, d(5)))
            .unwrap();
        assert_eq!(plan.start_date, d(2));
        assert_eq!(plan.end_date, d(5));
        assert!((plan.total_hours() - 7.0).abs() < 1e-9);

        let layout: Vec<(NaiveDate, f64)> = plan
            .rows
            .iter()
            .map(|row| (row.schedule_date, row.scheduled_work_hours))
            .collect();
        assert_eq!(layout, vec![(d(2), 1.0), (d(4), 5.0), (d(5), 1.0)]);

        assert_eq!(remaining(&repos, 5), 0.0);
        assert_eq!(remaining(&repos, 4), 0.0);
        assert_eq!(remaining(&repos, 2), 1.0);
        assert!((remaining(&repos, 3) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_insufficient_writes_nothing() {
        let repos = setup_repos();
        seed_pack_fixture(&repos);

        let err = service(&repos)
            .schedule("P1", &SchedulingRequest::new("Pack", 9.0, d(5)))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InsufficientCapacity { .. }));
        assert!(repos.plan_row_repo.find_by_plan("P1").unwrap().is_empty());
        assert_eq!(remaining(&repos, 5), 1.0);
    }

    #[test]
    fn test_delete_plan_restores_ledger() {
        let repos = setup_repos();
        seed_pack_fixture(&repos);
        let service = service(&repos);

        service
            .schedule("P1", &SchedulingRequest::new("Pack", 7.0, d(5)))
            .unwrap();
        let deleted = service.delete_plan("P1").unwrap();
        assert_eq!(deleted.len(), 3);

        assert_eq!(remaining(&repos, 5), 1.0);
        assert_eq!(remaining(&repos, 4), 5.0);
        assert_eq!(remaining(&repos, 2), 2.0);
        assert!(service.delete_plan("P1").unwrap().is_empty());
    }

    #[test]
    fn test_delete_plan_releases_remaining_cells_after_unconfigured_day() {
        let repos = setup_repos();
        seed(&repos, "Pack", &[(1, 4.0, 1), (2, 8.0, 1)]);
        let service = service(&repos);

        let plan = service
            .schedule("P1", &SchedulingRequest::new("Pack", 12.0, d(2)))
            .unwrap();
        assert_eq!(plan.rows.len(), 2);
        assert_eq!(remaining(&repos, 2), 0.0);

        // 01-01 的日历被移除后再删除计划
        repos.capacity_repo.clear_calendar_range("Pack", d(1), d(1)).unwrap();
        let deleted = service.delete_plan("P1").unwrap();
        assert_eq!(deleted.len(), 2);

        let day2 = repos
            .capacity_repo
            .find_by_process_and_date("Pack", d(2))
            .unwrap()
            .unwrap();
        assert_eq!(day2.occupied_hours, 0.0);
        assert_eq!(day2.remaining_hours, 8.0);
        assert!(repos.plan_row_repo.find_by_plan("P1").unwrap().is_empty());
    }

    #[test]
    fn test_add_row_rolls_forward_past_sliver() {
        let repos = setup_repos();
        seed(&repos, "Pack", &[(1, 8.0, 1), (2, 0.3, 1), (3, 8.0, 1)]);
        let service = service(&repos);

        let rows = service.add_row("P1", "Pack", d(1), 10.0, Some(d(3))).unwrap();
        let layout: Vec<(NaiveDate, f64)> = rows
            .iter()
            .map(|row| (row.schedule_date, row.scheduled_work_hours))
            .collect();
        assert_eq!(layout, vec![(d(1), 8.0), (d(3), 2.0)]);
        assert_eq!(remaining(&repos, 1), 0.0);
        assert_eq!(remaining(&repos, 3), 6.0);
    }

    #[test]
    fn test_add_row_beyond_ceiling_rolls_back() {
        let repos = setup_repos();
        seed(&repos, "Pack", &[(1, 8.0, 1), (2, 0.3, 1), (3, 8.0, 1)]);
        let service = service(&repos);

        let err = service.add_row("P1", "Pack", d(1), 10.0, Some(d(2))).unwrap_err();
        assert!(matches!(err, SchedulingError::NoFeasibleDate { .. }));
        assert!(repos.plan_row_repo.find_by_plan("P1").unwrap().is_empty());
        assert_eq!(remaining(&repos, 1), 8.0);
    }

    #[test]
    fn test_edit_row_hours_recalculates_cell() {
        let repos = setup_repos();
        seed(&repos, "Pack", &[(1, 8.0, 2)]);
        let service = service(&repos);

        let rows = service.add_row("P1", "Pack", d(1), 6.0, None).unwrap();
        let outcome = service.edit_row_hours(&rows[0].row_id, 2.0).unwrap();

        assert_eq!(outcome.record.occupied_hours, 2.0);
        assert_eq!(outcome.record.remaining_hours, 14.0);
        assert!(outcome.drift_detected());

        assert!(matches!(
            service.edit_row_hours("missing", 1.0),
            Err(SchedulingError::InvalidInput(_))
        ));
    }
}
