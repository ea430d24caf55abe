// ==========================================
// 工序产能排程系统 - 产能台账 API
// ==========================================
// 职责: 日产能查询、倒排/顺延日期计算、台账写入与对账
// 阈值参数为 None 时使用配置 min_remaining_hours
// ==========================================

use std::sync::Arc;

use chrono::NaiveDate;

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::capacity::{CalendarSeed, CapacityRecord};
use crate::domain::ledger_log::LedgerLog;
use crate::domain::plan_row::SchedulingRequest;
use crate::domain::types::ResetMode;
use crate::engine::{
    AllocationWindow, BackwardAllocator, DailyAggregator, DailyCapacity, ForwardAllocator, LedgerMutator,
    LedgerRepositories, ResetSummary,
};

// ==========================================
// CapacityApi - 产能台账 API
// ==========================================

/// 产能台账API
///
/// 职责：
/// 1. 日可用工时查询（排除当前编辑行）
/// 2. 结束日 / 开始日 / 顺延日计算
/// 3. 台账增量写入、单元格重算、全台账重置
/// 4. 日历播种与台账列表
pub struct CapacityApi {
    repos: LedgerRepositories,
    config_manager: Arc<ConfigManager>,
    aggregator: DailyAggregator,
    forward: ForwardAllocator,
    mutator: Arc<LedgerMutator>,
}

impl CapacityApi {
    /// 创建新的CapacityApi实例
    pub fn new(repos: LedgerRepositories, config_manager: Arc<ConfigManager>, mutator: Arc<LedgerMutator>) -> Self {
        Self {
            aggregator: DailyAggregator::new(repos.capacity_repo.clone(), repos.plan_row_repo.clone()),
            forward: ForwardAllocator::new(repos.capacity_repo.clone()),
            repos,
            config_manager,
            mutator,
        }
    }

    // ==========================================
    // 日产能查询
    // ==========================================

    /// 当日可用工时（总工时 - 已排工时，可为负）
    ///
    /// # 参数
    /// - exclude_row_id: 正在编辑的计划行（其旧工时不计入已排）
    pub fn get_daily_available_hours(
        &self,
        process_name: &str,
        date: NaiveDate,
        exclude_row_id: Option<&str>,
    ) -> ApiResult<f64> {
        validate_process_name(process_name)?;
        Ok(self
            .aggregator
            .daily_available_hours(process_name, date, exclude_row_id)?)
    }

    /// 单日产能快照
    pub fn get_daily_capacity(
        &self,
        process_name: &str,
        date: NaiveDate,
        exclude_row_id: Option<&str>,
    ) -> ApiResult<DailyCapacity> {
        validate_process_name(process_name)?;
        Ok(self.aggregator.daily_capacity(process_name, date, exclude_row_id)?)
    }

    // ==========================================
    // 日期计算
    // ==========================================

    /// 结束日：交期当天或之前剩余工时 >= 阈值的最近一天
    pub fn get_end_date(
        &self,
        process_name: &str,
        due_date: NaiveDate,
        min_remaining_hours: Option<f64>,
    ) -> ApiResult<NaiveDate> {
        validate_process_name(process_name)?;
        let threshold = self.resolve_threshold(min_remaining_hours)?;
        Ok(self.backward()?.compute_end_date(process_name, due_date, threshold)?)
    }

    /// 开始日：自结束日倒序累加剩余工时首次达到需求工时的日期
    pub fn get_start_date(
        &self,
        process_name: &str,
        end_date: NaiveDate,
        required_work_hours: f64,
        min_remaining_hours: Option<f64>,
    ) -> ApiResult<NaiveDate> {
        validate_process_name(process_name)?;
        let threshold = self.resolve_threshold(min_remaining_hours)?;
        Ok(self
            .backward()?
            .compute_start_date(process_name, end_date, required_work_hours, threshold)?)
    }

    /// 结束日 + 开始日 + 逐日消耗（单次扫描）
    pub fn get_allocation_window(
        &self,
        process_name: &str,
        due_date: NaiveDate,
        required_work_hours: f64,
        min_remaining_hours: Option<f64>,
    ) -> ApiResult<AllocationWindow> {
        validate_process_name(process_name)?;
        let threshold = self.resolve_threshold(min_remaining_hours)?;
        let request = SchedulingRequest::new(process_name, required_work_hours, due_date)
            .with_min_remaining_hours(threshold);
        Ok(self.backward()?.allocate_window(&request)?)
    }

    /// 顺延日：after 之后、不晚于 ceiling 的首个剩余工时 > 阈值的日期
    pub fn get_next_schedule_date(
        &self,
        process_name: &str,
        after_date: NaiveDate,
        ceiling_date: NaiveDate,
        min_remaining_hours: Option<f64>,
    ) -> ApiResult<NaiveDate> {
        validate_process_name(process_name)?;
        let threshold = self.resolve_threshold(min_remaining_hours)?;
        Ok(self
            .forward
            .compute_next_schedule_date(process_name, after_date, ceiling_date, threshold)?)
    }

    // ==========================================
    // 台账写入
    // ==========================================

    /// 台账增量写入（+ 占用 / - 释放）
    pub fn commit(&self, process_name: &str, date: NaiveDate, delta_hours: f64) -> ApiResult<CapacityRecord> {
        validate_process_name(process_name)?;
        Ok(self.mutator.apply_delta(process_name, date, delta_hours)?)
    }

    /// 按现存计划行重算单元格
    pub fn recalculate_cell(&self, process_name: &str, date: NaiveDate) -> ApiResult<CapacityRecord> {
        validate_process_name(process_name)?;
        Ok(self.mutator.recalculate_cell(process_name, date)?.record)
    }

    /// 全台账重算（默认模式）
    pub fn reset_all(&self) -> ApiResult<ResetSummary> {
        self.reset_all_with_mode(ResetMode::default())
    }

    /// 全台账重置（指定模式）
    pub fn reset_all_with_mode(&self, mode: ResetMode) -> ApiResult<ResetSummary> {
        Ok(self.mutator.reset_all(mode)?)
    }

    // ==========================================
    // 日历与报表
    // ==========================================

    /// 台账列表（闭区间，日期升序）
    pub fn list_capacity(
        &self,
        process_name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ApiResult<Vec<CapacityRecord>> {
        validate_process_name(process_name)?;
        if start_date > end_date {
            return Err(ApiError::InvalidInput(format!(
                "日期范围非法: start={} > end={}",
                start_date, end_date
            )));
        }
        Ok(self
            .repos
            .capacity_repo
            .find_by_date_range(process_name, start_date, end_date)?)
    }

    /// 单元格台账写入历史
    pub fn get_cell_history(&self, process_name: &str, date: NaiveDate) -> ApiResult<Vec<LedgerLog>> {
        validate_process_name(process_name)?;
        Ok(self.repos.ledger_log_repo.find_by_cell(process_name, date)?)
    }

    /// 日历播种（外部日历/工位配置入口）
    pub fn seed_calendar(&self, seeds: &[CalendarSeed]) -> ApiResult<usize> {
        for seed in seeds {
            validate_process_name(&seed.process_name)?;
            if !seed.shift_hours.is_finite() || seed.shift_hours < 0.0 {
                return Err(ApiError::InvalidInput(format!(
                    "班次工时非法: process={}, date={}, shift_hours={}",
                    seed.process_name, seed.plan_date, seed.shift_hours
                )));
            }
            if seed.workstation_count < 0 {
                return Err(ApiError::InvalidInput(format!(
                    "工位数非法: process={}, date={}, workstation_count={}",
                    seed.process_name, seed.plan_date, seed.workstation_count
                )));
            }
        }

        let count = self.repos.capacity_repo.seed_calendar(seeds)?;
        tracing::info!(count, "日历播种完成");
        Ok(count)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn resolve_threshold(&self, min_remaining_hours: Option<f64>) -> ApiResult<f64> {
        resolve_min_remaining_hours(&self.config_manager, min_remaining_hours)
    }

    fn backward(&self) -> ApiResult<BackwardAllocator> {
        let horizon_days = self.config_manager.get_backward_horizon_days()?;
        Ok(BackwardAllocator::new(self.repos.capacity_repo.clone()).with_horizon_days(horizon_days))
    }
}

/// 调用方阈值优先（须为非负有限数），否则取配置阈值
pub(crate) fn resolve_min_remaining_hours(
    config_manager: &ConfigManager,
    min_remaining_hours: Option<f64>,
) -> ApiResult<f64> {
    match min_remaining_hours {
        Some(value) if !value.is_finite() || value < 0.0 => Err(ApiError::InvalidInput(format!(
            "剩余工时阈值非法: {}",
            value
        ))),
        Some(value) => Ok(value),
        None => Ok(config_manager.get_min_remaining_hours()?),
    }
}

pub(crate) fn validate_process_name(process_name: &str) -> ApiResult<()> {
    if process_name.trim().is_empty() {
        return Err(ApiError::InvalidInput("工序名称不能为空".to_string()));
    }
    Ok(())
}
