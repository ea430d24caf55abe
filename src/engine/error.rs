// ==========================================
// 工序产能排程系统 - 引擎层错误类型
// ==========================================
// 传播: 分配类错误返回给调用方（计划服务）自行决定
//       保持未排 / 转人工 / 调用顺延分配
// 重试: 仅台账写入的瞬时冲突允许自动重试
// ==========================================

use crate::repository::error::RepositoryError;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// 日期搜索方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    /// 自锚点向前（日期递减）
    Backward,
    /// 自锚点向后（日期递增）
    Forward,
}

impl fmt::Display for SearchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchDirection::Backward => write!(f, "BACKWARD"),
            SearchDirection::Forward => write!(f, "FORWARD"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SchedulingError {
    /// 单元格未配置（汇总时按 0 产能处理，仅写入台账时报错）
    #[error("产能未配置: process={process_name}, date={date}")]
    NotConfigured { process_name: String, date: NaiveDate },

    /// 搜索耗尽仍未满足阈值（不自动重试）
    #[error("无可行日期: process={process_name}, direction={direction}, anchor={anchor}, ceiling={ceiling:?}, threshold={threshold}h")]
    NoFeasibleDate {
        process_name: String,
        direction: SearchDirection,
        anchor: NaiveDate,
        ceiling: Option<NaiveDate>,
        threshold: f64,
    },

    /// 倒排累计剩余工时始终不足
    #[error("产能不足: process={process_name}, end_date={end_date}, required={required_hours}h, accumulated={accumulated_hours}h, shortfall={shortfall_hours}h")]
    InsufficientCapacity {
        process_name: String,
        end_date: NaiveDate,
        required_hours: f64,
        accumulated_hours: f64,
        shortfall_hours: f64,
    },

    /// 台账写入乐观锁冲突（重试后仍失败）
    #[error("台账并发冲突: process={process_name}, date={date}, attempts={attempts}")]
    ConcurrencyConflict {
        process_name: String,
        date: NaiveDate,
        attempts: u32,
    },

    /// 重算结果与存量不一致（仅用于报告，不中断流程）
    #[error("台账漂移: process={process_name}, date={date}, stored={stored_hours}h, recomputed={recomputed_hours}h")]
    DriftDetected {
        process_name: String,
        date: NaiveDate,
        stored_hours: f64,
        recomputed_hours: f64,
    },

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("维护锁获取失败: {0}")]
    MaintenanceLock(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result 类型别名
pub type SchedulingResult<T> = Result<T, SchedulingError>;
