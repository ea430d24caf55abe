// ==========================================
// 工序产能排程系统 - 日产能汇总引擎
// ==========================================
// 职责: 计算 (工序, 日期) 的总工时 / 已排工时 / 可用工时
// 红线: 未配置 = 0 产能，不是错误
// 红线: 可用工时可为负（超排可见），不做截断
// ==========================================

use crate::domain::capacity::CapacityRecord;
use crate::engine::error::SchedulingResult;
use crate::repository::{CapacityLedgerRepository, PlanRowRepository};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// 单日产能快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCapacity {
    pub process_name: String,
    pub date: NaiveDate,
    pub total_hours: f64,
    pub scheduled_hours: f64,
    pub available_hours: f64,
    /// 台账中是否存在该单元格
    pub configured: bool,
}

// ==========================================
// DailyAggregator - 日产能汇总
// ==========================================
pub struct DailyAggregator {
    capacity_repo: Arc<CapacityLedgerRepository>,
    plan_row_repo: Arc<PlanRowRepository>,
}

impl DailyAggregator {
    pub fn new(capacity_repo: Arc<CapacityLedgerRepository>, plan_row_repo: Arc<PlanRowRepository>) -> Self {
        Self {
            capacity_repo,
            plan_row_repo,
        }
    }

    /// 当日总工时 = 班次工时 × 工位数；未配置返回 0
    pub fn daily_total_hours(&self, process_name: &str, date: NaiveDate) -> SchedulingResult<f64> {
        let record = self.capacity_repo.find_by_process_and_date(process_name, date)?;
        Ok(total_or_zero(process_name, date, record.as_ref()))
    }

    /// 当日已排工时（排除正在编辑的行）
    pub fn daily_scheduled_hours(
        &self,
        process_name: &str,
        date: NaiveDate,
        exclude_row_id: Option<&str>,
    ) -> SchedulingResult<f64> {
        let hours = self
            .plan_row_repo
            .sum_scheduled_hours(process_name, date, exclude_row_id)?;
        Ok(hours)
    }

    /// 当日可用工时 = 总工时 - 已排工时（可为负）
    pub fn daily_available_hours(
        &self,
        process_name: &str,
        date: NaiveDate,
        exclude_row_id: Option<&str>,
    ) -> SchedulingResult<f64> {
        Ok(self.daily_capacity(process_name, date, exclude_row_id)?.available_hours)
    }

    /// 单日产能快照
    #[instrument(skip(self), fields(process = %process_name, date = %date))]
    pub fn daily_capacity(
        &self,
        process_name: &str,
        date: NaiveDate,
        exclude_row_id: Option<&str>,
    ) -> SchedulingResult<DailyCapacity> {
        let record = self.capacity_repo.find_by_process_and_date(process_name, date)?;
        let total_hours = total_or_zero(process_name, date, record.as_ref());
        let scheduled_hours = self.daily_scheduled_hours(process_name, date, exclude_row_id)?;
        let available_hours = total_hours - scheduled_hours;

        if available_hours < 0.0 {
            tracing::debug!(total_hours, scheduled_hours, available_hours, "当日已超排");
        }

        Ok(DailyCapacity {
            process_name: process_name.to_string(),
            date,
            total_hours,
            scheduled_hours,
            available_hours,
            configured: record.is_some(),
        })
    }
}

fn total_or_zero(process_name: &str, date: NaiveDate, record: Option<&CapacityRecord>) -> f64 {
    match record {
        Some(record) => record.total_hours(),
        None => {
            tracing::debug!(process = %process_name, date = %date, "产能未配置，按 0 工时处理");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan_row::PlanRow;
    use crate::engine::test_support::{d, seed, setup_repos};

    #[test]
    fn test_daily_available_hours_excludes_current_row() {
        let repos = setup_repos();
        seed(&repos, "Pack", &[(5, 8.0, 2)]);

        let editing = PlanRow::new("P1", "Pack", d(5), 3.0, 1);
        repos
            .plan_row_repo
            .insert_batch(&[
                editing.clone(),
                PlanRow::new("P2", "Pack", d(5), 4.0, 2),
                PlanRow::new("P3", "Pack", d(5), 6.0, 3),
            ])
            .unwrap();

        let aggregator = DailyAggregator::new(repos.capacity_repo.clone(), repos.plan_row_repo.clone());

        assert_eq!(aggregator.daily_total_hours("Pack", d(5)).unwrap(), 16.0);
        assert_eq!(
            aggregator
                .daily_scheduled_hours("Pack", d(5), Some(&editing.row_id))
                .unwrap(),
            10.0
        );
        assert_eq!(
            aggregator
                .daily_available_hours("Pack", d(5), Some(&editing.row_id))
                .unwrap(),
            6.0
        );
        assert_eq!(aggregator.daily_available_hours("Pack", d(5), None).unwrap(), 3.0);
    }

    #[test]
    fn test_unconfigured_day_is_zero_capacity() {
        let repos = setup_repos();
        repos
            .plan_row_repo
            .insert(&PlanRow::new("P1", "Pack", d(7), 2.0, 1))
            .unwrap();

        let aggregator = DailyAggregator::new(repos.capacity_repo.clone(), repos.plan_row_repo.clone());
        let snapshot = aggregator.daily_capacity("Pack", d(7), None).unwrap();

        assert!(!snapshot.configured);
        assert_eq!(snapshot.total_hours, 0.0);
        assert_eq!(snapshot.available_hours, -2.0);
    }
}
