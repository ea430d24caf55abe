// ==========================================
// 工序产能排程系统 - 工序计划行 / 排程请求
// ==========================================
// 工序名作为普通数据参数，不再按工序复制计划服务
// ==========================================

use crate::domain::types::DEFAULT_MIN_REMAINING_HOURS;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// PlanRow - 工序计划行
// ==========================================
// 台账 occupied_hours 的事实来源：
// 同一 (工序, 日期) 下所有现存计划行工时之和应等于该单元格的 occupied_hours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRow {
    pub row_id: String,            // 行ID
    pub plan_id: String,           // 所属计划实体ID
    pub process_name: String,      // 工序名称
    pub schedule_date: NaiveDate,  // 排程日期
    pub scheduled_work_hours: f64, // 排程工时
    pub row_ordinal: i32,          // 单元格内序号
}

impl PlanRow {
    /// 创建新计划行（自动生成 row_id）
    pub fn new(
        plan_id: impl Into<String>,
        process_name: impl Into<String>,
        schedule_date: NaiveDate,
        scheduled_work_hours: f64,
        row_ordinal: i32,
    ) -> Self {
        Self {
            row_id: Uuid::new_v4().to_string(),
            plan_id: plan_id.into(),
            process_name: process_name.into(),
            schedule_date,
            scheduled_work_hours,
            row_ordinal,
        }
    }
}

// ==========================================
// SchedulingRequest - 排程请求（不落库）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingRequest {
    pub process_name: String,
    pub required_work_hours: f64,
    pub due_date: NaiveDate,
    /// 剩余工时不高于该阈值的日期不参与分配
    pub min_remaining_hours: f64,
}

impl SchedulingRequest {
    /// 按所需工时创建请求，阈值使用默认值
    pub fn new(process_name: impl Into<String>, required_work_hours: f64, due_date: NaiveDate) -> Self {
        Self {
            process_name: process_name.into(),
            required_work_hours,
            due_date,
            min_remaining_hours: DEFAULT_MIN_REMAINING_HOURS,
        }
    }

    /// 按数量 / 产出速率推导所需工时
    ///
    /// # 返回
    /// - None: 速率非正或结果非有限值
    pub fn from_quantity(
        process_name: impl Into<String>,
        quantity: f64,
        units_per_hour: f64,
        due_date: NaiveDate,
    ) -> Option<Self> {
        if !(units_per_hour > 0.0) {
            return None;
        }
        let hours = quantity / units_per_hour;
        if !hours.is_finite() {
            return None;
        }
        Some(Self::new(process_name, hours, due_date))
    }

    /// 覆盖最小剩余工时阈值
    pub fn with_min_remaining_hours(mut self, min_remaining_hours: f64) -> Self {
        self.min_remaining_hours = min_remaining_hours;
        self
    }
}
