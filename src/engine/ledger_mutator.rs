// ==========================================
// 工序产能排程系统 - 台账写入引擎
// ==========================================
// 红线: occupied_hours 的唯一写入口
// 红线: 释放下溢截断为 0 并记为漂移，绝不写成负数
// 红线: 单元格写入按键串行（IMMEDIATE 事务 + revision 条件更新）
// ==========================================
// 维护约束: reset_all 持有独占维护锁，期间 apply_delta / recalculate_cell 等待
// ==========================================

use crate::config::LedgerPolicy;
use crate::domain::capacity::CapacityRecord;
use crate::domain::ledger_log::LedgerLogDraft;
use crate::domain::types::{LedgerAction, ResetMode};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::repository::{CapacityLedgerRepository, OccupiedChange, RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::instrument;

/// 单元格重算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecalcOutcome {
    pub record: CapacityRecord,
    pub prior_occupied_hours: f64,
    /// 重算值 - 原存量（容差内记为 0）
    pub drift_hours: f64,
}

impl CellRecalcOutcome {
    pub fn drift_detected(&self) -> bool {
        self.drift_hours != 0.0
    }

    /// 漂移报告（仅用于日志/上报，不作为失败返回）
    pub fn drift_report(&self) -> Option<SchedulingError> {
        if !self.drift_detected() {
            return None;
        }
        Some(SchedulingError::DriftDetected {
            process_name: self.record.process_name.clone(),
            date: self.record.plan_date,
            stored_hours: self.prior_occupied_hours,
            recomputed_hours: self.record.occupied_hours,
        })
    }
}

/// 全台账重置汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub mode: ResetMode,
    pub total_records: usize,
    pub updated_count: usize,
    /// Σ(原占用 - 重算占用)
    pub total_released_hours: f64,
}

// ==========================================
// LedgerMutator - 台账写入
// ==========================================
pub struct LedgerMutator {
    capacity_repo: Arc<CapacityLedgerRepository>,
    policy: LedgerPolicy,
    maintenance: RwLock<()>,
}

impl LedgerMutator {
    pub fn new(capacity_repo: Arc<CapacityLedgerRepository>, policy: LedgerPolicy) -> Self {
        Self {
            capacity_repo,
            policy,
            maintenance: RwLock::new(()),
        }
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    // ==========================================
    // 增量写入
    // ==========================================

    /// 按带符号增量修改占用工时（+ 占用 / - 释放）
    ///
    /// # 错误
    /// - `NotConfigured`: 单元格不存在
    /// - `ConcurrencyConflict`: 自动重试后仍冲突
    #[instrument(skip(self), fields(process = %process_name, date = %date))]
    pub fn apply_delta(
        &self,
        process_name: &str,
        date: NaiveDate,
        delta_hours: f64,
    ) -> SchedulingResult<CapacityRecord> {
        let attempts = self.policy.commit_max_retries.saturating_add(1);
        self.apply_delta_inner(process_name, date, delta_hours, None, attempts)
    }

    /// 带 revision 期望的增量写入
    ///
    /// 调用方持有的 revision 已过期时直接返回 `ConcurrencyConflict`，由调用方重新读取后重试一次
    #[instrument(skip(self), fields(process = %process_name, date = %date))]
    pub fn apply_delta_expecting(
        &self,
        process_name: &str,
        date: NaiveDate,
        delta_hours: f64,
        expected_revision: i64,
    ) -> SchedulingResult<CapacityRecord> {
        self.apply_delta_inner(process_name, date, delta_hours, Some(expected_revision), 1)
    }

    fn apply_delta_inner(
        &self,
        process_name: &str,
        date: NaiveDate,
        delta_hours: f64,
        expected_revision: Option<i64>,
        max_attempts: u32,
    ) -> SchedulingResult<CapacityRecord> {
        if !delta_hours.is_finite() {
            return Err(SchedulingError::InvalidInput(format!("工时增量非法: {}", delta_hours)));
        }

        let _guard = self
            .maintenance
            .read()
            .map_err(|e| SchedulingError::MaintenanceLock(e.to_string()))?;

        let action = LedgerAction::for_delta(delta_hours);
        let write = self.with_retry(process_name, date, max_attempts, || {
            self.capacity_repo.update_occupied(
                process_name,
                date,
                LedgerLogDraft::new(action, delta_hours),
                expected_revision,
                |snap| release_floor(snap.record.occupied_hours, delta_hours),
            )
        })?;

        if write.drift_hours != 0.0 {
            tracing::warn!(
                delta_hours,
                occupied_before = write.before.occupied_hours,
                underflow_hours = -write.drift_hours,
                "释放工时超过已占用，截断为 0（台账漂移）"
            );
        }

        tracing::debug!(
            action = %action,
            delta_hours,
            occupied_after = write.after.occupied_hours,
            remaining_after = write.after.remaining_hours,
            "台账增量写入完成"
        );

        Ok(write.after)
    }

    // ==========================================
    // 重算
    // ==========================================

    /// 按现存计划行重算单元格占用工时（幂等）
    ///
    /// 发现漂移时仅记录 warn 与台账日志，不返回错误
    #[instrument(skip(self), fields(process = %process_name, date = %date))]
    pub fn recalculate_cell(&self, process_name: &str, date: NaiveDate) -> SchedulingResult<CellRecalcOutcome> {
        let _guard = self
            .maintenance
            .read()
            .map_err(|e| SchedulingError::MaintenanceLock(e.to_string()))?;

        let epsilon = self.policy.drift_epsilon;
        let attempts = self.policy.commit_max_retries.saturating_add(1);
        let write = self.with_retry(process_name, date, attempts, || {
            self.capacity_repo.update_occupied(
                process_name,
                date,
                LedgerLogDraft::new(LedgerAction::Recalc, 0.0),
                None,
                |snap| recalc_change(snap.record.occupied_hours, snap.live_plan_hours, epsilon),
            )
        })?;

        let outcome = CellRecalcOutcome {
            prior_occupied_hours: write.before.occupied_hours,
            drift_hours: write.drift_hours,
            record: write.after,
        };

        if let Some(report) = outcome.drift_report() {
            tracing::warn!(drift_hours = outcome.drift_hours, "{}", report);
        }

        Ok(outcome)
    }

    /// 全台账重置（维护操作，独占执行）
    ///
    /// # 模式
    /// - Recalculate: 每个单元格按现存计划行重算
    /// - HardReset: 全部归零
    #[instrument(skip(self))]
    pub fn reset_all(&self, mode: ResetMode) -> SchedulingResult<ResetSummary> {
        let _guard = self
            .maintenance
            .write()
            .map_err(|e| SchedulingError::MaintenanceLock(e.to_string()))?;

        tracing::info!(mode = %mode, "开始全台账重置");

        let epsilon = self.policy.drift_epsilon;
        let attempts = self.policy.commit_max_retries.saturating_add(1);
        let anchor = NaiveDate::MIN;
        let bulk = self.with_retry("*", anchor, attempts, || {
            self.capacity_repo.update_all_occupied(LedgerAction::Reset, |snap| {
                let target = match mode {
                    ResetMode::Recalculate => snap.live_plan_hours,
                    ResetMode::HardReset => 0.0,
                };
                let change = recalc_change(snap.record.occupied_hours, target, epsilon);
                if change.drift_hours == 0.0 {
                    None
                } else {
                    Some(change)
                }
            })
        })?;

        let total_released_hours = bulk
            .writes
            .iter()
            .map(|w| w.before.occupied_hours - w.after.occupied_hours)
            .sum();

        let summary = ResetSummary {
            mode,
            total_records: bulk.total_records,
            updated_count: bulk.writes.len(),
            total_released_hours,
        };

        tracing::info!(
            total_records = summary.total_records,
            updated_count = summary.updated_count,
            total_released_hours = summary.total_released_hours,
            "全台账重置完成"
        );

        Ok(summary)
    }

    // ==========================================
    // 重试
    // ==========================================

    /// 仅对瞬时冲突（乐观锁 / busy）重试
    fn with_retry<T, F>(&self, process_name: &str, date: NaiveDate, max_attempts: u32, mut op: F) -> SchedulingResult<T>
    where
        F: FnMut() -> RepositoryResult<T>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if attempt >= max_attempts {
                        tracing::warn!(attempt, error = %err, "台账写入冲突，放弃重试");
                        return Err(SchedulingError::ConcurrencyConflict {
                            process_name: process_name.to_string(),
                            date,
                            attempts: attempt,
                        });
                    }
                    tracing::debug!(attempt, error = %err, "台账写入冲突，重试");
                }
                Err(RepositoryError::NotFound { .. }) => {
                    return Err(SchedulingError::NotConfigured {
                        process_name: process_name.to_string(),
                        date,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

// ==========================================
// 纯函数
// ==========================================

/// 增量写入的新值：仅释放时下限为 0
fn release_floor(occupied_hours: f64, delta_hours: f64) -> OccupiedChange {
    let raw = occupied_hours + delta_hours;
    if delta_hours < 0.0 && raw < 0.0 {
        OccupiedChange {
            occupied_hours: 0.0,
            drift_hours: raw,
            detail: Some(format!("释放下溢截断: underflow={:.4}h", -raw)),
        }
    } else {
        OccupiedChange {
            occupied_hours: raw,
            ..Default::default()
        }
    }
}

/// 重算/重置的新值：容差外记为漂移
fn recalc_change(stored_hours: f64, target_hours: f64, epsilon: f64) -> OccupiedChange {
    let drift = target_hours - stored_hours;
    if drift.abs() > epsilon {
        OccupiedChange {
            occupied_hours: target_hours,
            drift_hours: drift,
            detail: Some(format!("漂移修正: stored={:.4}h, recomputed={:.4}h", stored_hours, target_hours)),
        }
    } else {
        OccupiedChange {
            occupied_hours: target_hours,
            ..Default::default()
        }
    }
}
