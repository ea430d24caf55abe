// ==========================================
// 工序产能排程系统 - API 层
// ==========================================
// 职责: 对外业务接口，统一参数校验与错误转换
// ==========================================

pub mod capacity_api;
pub mod error;
pub mod plan_api;

// 重导出核心类型
pub use capacity_api::CapacityApi;
pub use error::{ApiError, ApiResult};
pub use plan_api::PlanApi;
