// ==========================================
// 工序产能排程系统 - 台账写入日志
// ==========================================
// 红线: 所有台账写入必须记录
// 用途: 漂移追踪、对账审计
// ==========================================

use crate::domain::types::LedgerAction;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerLog {
    pub log_id: String,
    pub action: LedgerAction,
    pub process_name: String,
    pub plan_date: NaiveDate,
    pub delta_hours: f64,     // 请求的增量（重算/重置为 after - before）
    pub occupied_before: f64,
    pub occupied_after: f64,
    pub drift_hours: f64,     // 重算发现的漂移 / 释放截断量
    pub detail: Option<String>,
    pub created_at: NaiveDateTime,
}

/// 台账写入意图（由引擎给出，仓储在同一事务内补齐前后值并落库）
#[derive(Debug, Clone)]
pub struct LedgerLogDraft {
    pub action: LedgerAction,
    pub delta_hours: f64,
}

impl LedgerLogDraft {
    pub fn new(action: LedgerAction, delta_hours: f64) -> Self {
        Self { action, delta_hours }
    }
}
