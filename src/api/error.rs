// ==========================================
// 工序产能排程系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将引擎/仓储错误转换为带原因的错误消息
// ==========================================

use crate::engine::error::SchedulingError;
use crate::repository::error::RepositoryError;
use chrono::NaiveDate;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 分配结果错误（调用方决定保持未排 / 转人工 / 顺延）
    // ==========================================
    #[error("无可行日期: {0}")]
    NoFeasibleDate(String),

    #[error("产能不足: process={process_name}, end_date={end_date}, accumulated={accumulated_hours}h, shortfall={shortfall_hours}h")]
    InsufficientCapacity {
        process_name: String,
        end_date: NaiveDate,
        accumulated_hours: f64,
        shortfall_hours: f64,
    },

    #[error("产能未配置: {0}")]
    NotConfigured(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    #[error("维护中: {0}")]
    MaintenanceInProgress(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::OptimisticLockFailure { cell, expected, actual } => {
                ApiError::OptimisticLockFailure(format!(
                    "单元格{}已被其他写入修改（期望revision={}，实际revision={}）",
                    cell, expected, actual
                ))
            }
            RepositoryError::DatabaseBusy(msg) => {
                ApiError::OptimisticLockFailure(format!("数据库繁忙: {}", msg))
            }

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
        }
    }
}

// ==========================================
// 从 SchedulingError 转换
// ==========================================
impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::NotConfigured { process_name, date } => {
                ApiError::NotConfigured(format!("process={}, date={}", process_name, date))
            }
            err @ SchedulingError::NoFeasibleDate { .. } => ApiError::NoFeasibleDate(err.to_string()),
            SchedulingError::InsufficientCapacity {
                process_name,
                end_date,
                accumulated_hours,
                shortfall_hours,
                ..
            } => ApiError::InsufficientCapacity {
                process_name,
                end_date,
                accumulated_hours,
                shortfall_hours,
            },
            err @ SchedulingError::ConcurrencyConflict { .. } => {
                ApiError::OptimisticLockFailure(err.to_string())
            }
            err @ SchedulingError::DriftDetected { .. } => ApiError::BusinessRuleViolation(err.to_string()),
            SchedulingError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            SchedulingError::MaintenanceLock(msg) => ApiError::MaintenanceInProgress(msg),
            SchedulingError::Repository(err) => err.into(),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::SearchDirection;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "PlanRow".to_string(),
            id: "R001".to_string(),
        };
        match ApiError::from(repo_err) {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("PlanRow"));
                assert!(msg.contains("R001"));
            }
            other => panic!("Expected NotFound, got {other:?}"),
        }

        let repo_err = RepositoryError::OptimisticLockFailure {
            cell: "Pack@2026-01-05".to_string(),
            expected: 1,
            actual: 2,
        };
        match ApiError::from(repo_err) {
            ApiError::OptimisticLockFailure(msg) => assert!(msg.contains("Pack@2026-01-05")),
            other => panic!("Expected OptimisticLockFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_scheduling_error_conversion() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();

        let err = SchedulingError::InsufficientCapacity {
            process_name: "Pack".to_string(),
            end_date: date,
            required_hours: 9.0,
            accumulated_hours: 8.0,
            shortfall_hours: 1.0,
        };
        assert!(matches!(
            ApiError::from(err),
            ApiError::InsufficientCapacity { shortfall_hours, .. } if shortfall_hours == 1.0
        ));

        let err = SchedulingError::NoFeasibleDate {
            process_name: "Pack".to_string(),
            direction: SearchDirection::Backward,
            anchor: date,
            ceiling: None,
            threshold: 0.5,
        };
        match ApiError::from(err) {
            ApiError::NoFeasibleDate(msg) => assert!(msg.contains("BACKWARD")),
            other => panic!("Expected NoFeasibleDate, got {other:?}"),
        }

        let err = SchedulingError::Repository(RepositoryError::LockError("poisoned".to_string()));
        assert!(matches!(ApiError::from(err), ApiError::DatabaseConnectionError(_)));
    }
}
