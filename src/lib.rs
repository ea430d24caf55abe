// ==========================================
// 工序产能排程系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 按 (工序, 日期) 维护产能台账，支撑倒排/顺延排程
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 汇总 / 分配 / 台账写入
pub mod engine;

// 配置层 - 台账策略
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{LedgerAction, ResetMode};

// 领域实体
pub use domain::{CalendarSeed, CapacityRecord, LedgerLog, PlanRow, SchedulingRequest};

// 引擎
pub use engine::{
    BackwardAllocator, DailyAggregator, ForwardAllocator, LedgerMutator, PlanAllocationService,
    SchedulingError,
};

// API
pub use api::{ApiError, CapacityApi, PlanApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "工序产能排程系统";
