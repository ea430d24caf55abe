// ==========================================
// 工序产能排程系统 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// 工时比较容差（小时）
///
/// 浮点累加（例如 0.1 + 0.2）与需求工时比较时使用
pub const HOURS_EPSILON: f64 = 1e-9;

/// 默认最小剩余工时阈值（小时）
///
/// 剩余工时不高于该值的日期视为“碎片”，不参与分配
pub const DEFAULT_MIN_REMAINING_HOURS: f64 = 0.5;

// ==========================================
// 台账动作 (Ledger Action)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerAction {
    Commit,  // 占用工时 (+delta)
    Release, // 释放工时 (-delta)
    Recalc,  // 单元格重算
    Reset,   // 全台账重置
}

impl LedgerAction {
    /// 从数据库字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "COMMIT" => Some(LedgerAction::Commit),
            "RELEASE" => Some(LedgerAction::Release),
            "RECALC" => Some(LedgerAction::Recalc),
            "RESET" => Some(LedgerAction::Reset),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            LedgerAction::Commit => "COMMIT",
            LedgerAction::Release => "RELEASE",
            LedgerAction::Recalc => "RECALC",
            LedgerAction::Reset => "RESET",
        }
    }

    /// 按增量符号选择占用/释放
    pub fn for_delta(delta_hours: f64) -> Self {
        if delta_hours < 0.0 {
            LedgerAction::Release
        } else {
            LedgerAction::Commit
        }
    }
}

impl fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 重置模式 (Reset Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetMode {
    /// 按现存工序计划行重算每个单元格
    #[default]
    Recalculate,
    /// 硬重置：所有单元格占用工时归零
    HardReset,
}

impl fmt::Display for ResetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetMode::Recalculate => write!(f, "RECALCULATE"),
            ResetMode::HardReset => write!(f, "HARD_RESET"),
        }
    }
}
