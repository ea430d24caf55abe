// ==========================================
// 工序产能排程系统 - 工序计划 API
// ==========================================
// 职责: 计划排程、追加/修改计划行、删除计划
// 红线: 所有台账变更经计划分配服务 -> 台账写入引擎
// ==========================================

use std::sync::Arc;

use chrono::NaiveDate;

use crate::api::capacity_api::{resolve_min_remaining_hours, validate_process_name};
use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::plan_row::{PlanRow, SchedulingRequest};
use crate::engine::{CellRecalcOutcome, PlanAllocationService, ScheduledPlan};
use crate::repository::PlanRowRepository;

// ==========================================
// PlanApi - 工序计划 API
// ==========================================

/// 工序计划API
pub struct PlanApi {
    plan_row_repo: Arc<PlanRowRepository>,
    config_manager: Arc<ConfigManager>,
    allocation: Arc<PlanAllocationService>,
}

impl PlanApi {
    /// 创建新的PlanApi实例
    pub fn new(
        plan_row_repo: Arc<PlanRowRepository>,
        config_manager: Arc<ConfigManager>,
        allocation: Arc<PlanAllocationService>,
    ) -> Self {
        Self {
            plan_row_repo,
            config_manager,
            allocation,
        }
    }

    /// 按工时倒排计划并占用台账
    ///
    /// # 参数
    /// - min_remaining_hours: None 时使用配置阈值
    pub fn schedule_plan(
        &self,
        plan_id: &str,
        process_name: &str,
        required_work_hours: f64,
        due_date: NaiveDate,
        min_remaining_hours: Option<f64>,
    ) -> ApiResult<ScheduledPlan> {
        validate_plan_id(plan_id)?;
        validate_process_name(process_name)?;

        let threshold = resolve_min_remaining_hours(&self.config_manager, min_remaining_hours)?;
        let request =
            SchedulingRequest::new(process_name, required_work_hours, due_date).with_min_remaining_hours(threshold);
        Ok(self.allocation.schedule(plan_id, &request)?)
    }

    /// 按数量 / 产出速率倒排计划
    pub fn schedule_plan_by_quantity(
        &self,
        plan_id: &str,
        process_name: &str,
        quantity: f64,
        units_per_hour: f64,
        due_date: NaiveDate,
    ) -> ApiResult<ScheduledPlan> {
        validate_plan_id(plan_id)?;
        validate_process_name(process_name)?;

        let threshold = self.config_manager.get_min_remaining_hours()?;
        let request = SchedulingRequest::from_quantity(process_name, quantity, units_per_hour, due_date)
            .ok_or_else(|| {
                ApiError::InvalidInput(format!(
                    "无法由数量推导工时: quantity={}, units_per_hour={}",
                    quantity, units_per_hour
                ))
            })?
            .with_min_remaining_hours(threshold);
        Ok(self.allocation.schedule(plan_id, &request)?)
    }

    /// 追加计划行（超出当日可用部分顺延）
    pub fn add_plan_row(
        &self,
        plan_id: &str,
        process_name: &str,
        date: NaiveDate,
        hours: f64,
        ceiling_date: Option<NaiveDate>,
    ) -> ApiResult<Vec<PlanRow>> {
        validate_plan_id(plan_id)?;
        validate_process_name(process_name)?;
        Ok(self
            .allocation
            .add_row(plan_id, process_name, date, hours, ceiling_date)?)
    }

    /// 修改计划行工时
    pub fn edit_row_hours(&self, row_id: &str, hours: f64) -> ApiResult<CellRecalcOutcome> {
        Ok(self.allocation.edit_row_hours(row_id, hours)?)
    }

    /// 删除计划
    ///
    /// # 返回
    /// - Ok(usize): 删除的计划行数
    pub fn delete_plan(&self, plan_id: &str) -> ApiResult<usize> {
        validate_plan_id(plan_id)?;
        Ok(self.allocation.delete_plan(plan_id)?.len())
    }

    /// 查询计划的全部计划行
    pub fn list_plan_rows(&self, plan_id: &str) -> ApiResult<Vec<PlanRow>> {
        validate_plan_id(plan_id)?;
        Ok(self.plan_row_repo.find_by_plan(plan_id)?)
    }
}

fn validate_plan_id(plan_id: &str) -> ApiResult<()> {
    if plan_id.trim().is_empty() {
        return Err(ApiError::InvalidInput("计划ID不能为空".to_string()));
    }
    Ok(())
}
