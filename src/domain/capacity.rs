// ==========================================
// 工序产能排程系统 - 产能台账领域模型
// ==========================================
// 键: (工序, 日期)
// 红线: remaining_* 只能随 occupied_hours 一起重算，不可单独写入
// 红线: remaining_hours 可为负（超排可见），不做截断
// ==========================================

use crate::domain::types::HOURS_EPSILON;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// CapacityRecord - 产能台账单元格
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRecord {
    // ===== 主键 =====
    pub process_name: String, // 工序名称
    pub plan_date: NaiveDate, // 日期（不含时刻）

    // ===== 产能参数（日历/工位配置提供）=====
    pub shift_hours: f64,       // 单工位班次工时
    pub workstation_count: i32, // 工位数

    // ===== 占用与派生 =====
    pub occupied_hours: f64,        // 已占用工时
    pub remaining_hours: f64,       // 剩余工时 = 总工时 - 已占用
    pub remaining_shift_equiv: f64, // 剩余班次当量 = 剩余工时 / 工位数

    // ===== 并发控制 =====
    pub revision: i64,
    pub updated_at: NaiveDateTime,
}

/// 计算派生字段 (remaining_hours, remaining_shift_equiv)
///
/// 工位数为 0 时班次当量记为 0
pub fn derive_remaining(shift_hours: f64, workstation_count: i32, occupied_hours: f64) -> (f64, f64) {
    let remaining = shift_hours * f64::from(workstation_count) - occupied_hours;
    let shift_equiv = if workstation_count > 0 {
        remaining / f64::from(workstation_count)
    } else {
        0.0
    };
    (remaining, shift_equiv)
}

impl CapacityRecord {
    /// 由日历配置创建空台账单元格（占用为 0）
    pub fn new(
        process_name: impl Into<String>,
        plan_date: NaiveDate,
        shift_hours: f64,
        workstation_count: i32,
        updated_at: NaiveDateTime,
    ) -> Self {
        let mut record = Self {
            process_name: process_name.into(),
            plan_date,
            shift_hours,
            workstation_count,
            occupied_hours: 0.0,
            remaining_hours: 0.0,
            remaining_shift_equiv: 0.0,
            revision: 0,
            updated_at,
        };
        record.recompute_derived();
        record
    }

    /// 当日总工时
    pub fn total_hours(&self) -> f64 {
        self.shift_hours * f64::from(self.workstation_count)
    }

    /// 按当前 occupied_hours 重算派生字段
    pub fn recompute_derived(&mut self) {
        let (remaining, shift_equiv) =
            derive_remaining(self.shift_hours, self.workstation_count, self.occupied_hours);
        self.remaining_hours = remaining;
        self.remaining_shift_equiv = shift_equiv;
    }

    /// 写入新的占用工时并同步派生字段
    pub fn with_occupied(&self, occupied_hours: f64) -> Self {
        let mut next = self.clone();
        next.occupied_hours = occupied_hours;
        next.recompute_derived();
        next
    }
}

// ==========================================
// Trait: SpareCapacity
// ==========================================
// 用途: 分配器的可用性判定接口
pub trait SpareCapacity {
    /// 剩余工时
    fn spare_hours(&self) -> f64;

    /// 剩余工时 >= 阈值（倒排使用）
    fn meets_threshold(&self, min_remaining_hours: f64) -> bool {
        self.spare_hours() >= min_remaining_hours
    }

    /// 剩余工时 > 阈值（顺延使用，严格大于）
    fn exceeds_threshold(&self, min_remaining_hours: f64) -> bool {
        self.spare_hours() > min_remaining_hours
    }

    /// 是否超排
    fn is_over_committed(&self) -> bool {
        self.spare_hours() < -HOURS_EPSILON
    }
}

impl SpareCapacity for CapacityRecord {
    fn spare_hours(&self) -> f64 {
        self.remaining_hours
    }
}

// ==========================================
// CalendarSeed - 日历/工位配置输入
// ==========================================
// 由外部日历配置提供方写入；只更新产能参数，保留已占用工时
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSeed {
    pub process_name: String,
    pub plan_date: NaiveDate,
    pub shift_hours: f64,
    pub workstation_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_new_record_derives_remaining() {
        let record = CapacityRecord::new("Pack", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 8.0, 2, ts());
        assert_eq!(record.total_hours(), 16.0);
        assert_eq!(record.remaining_hours, 16.0);
        assert_eq!(record.remaining_shift_equiv, 8.0);
    }

    #[test]
    fn test_over_commitment_is_not_clamped() {
        let record = CapacityRecord::new("Pack", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 8.0, 2, ts())
            .with_occupied(20.0);
        assert_eq!(record.remaining_hours, -4.0);
        assert_eq!(record.remaining_shift_equiv, -2.0);
        assert!(record.is_over_committed());
    }

    #[test]
    fn test_zero_workstations_yields_zero_shift_equiv() {
        let (remaining, equiv) = derive_remaining(8.0, 0, 3.0);
        assert_eq!(remaining, -3.0);
        assert_eq!(equiv, 0.0);
    }

    #[test]
    fn test_threshold_comparisons() {
        let record = CapacityRecord::new("Pack", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 0.5, 1, ts());
        assert!(record.meets_threshold(0.5));
        assert!(!record.exceeds_threshold(0.5));
    }
}
