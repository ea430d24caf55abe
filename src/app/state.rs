// ==========================================
// 工序产能排程系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{CapacityApi, PlanApi};
use crate::config::config_manager::ConfigManager;
use crate::engine::{LedgerMutator, LedgerRepositories, PlanAllocationService};

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 产能台账API
    pub capacity_api: Arc<CapacityApi>,

    /// 工序计划API
    pub plan_api: Arc<PlanApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 台账写入引擎（对账任务直接使用）
    pub ledger_mutator: Arc<LedgerMutator>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开连接并初始化 schema
    /// 2. 读取台账策略配置
    /// 3. 创建引擎与API实例（共享同一连接）
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::db::init_schema(&conn).map_err(|e| format!("初始化数据库结构失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let repos = LedgerRepositories::from_connection(conn.clone());
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn).map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let policy = config_manager
            .load_policy()
            .map_err(|e| format!("读取台账策略失败: {}", e))?;
        tracing::debug!(?policy, "台账策略已加载");

        let ledger_mutator = Arc::new(LedgerMutator::new(repos.capacity_repo.clone(), policy));
        let allocation = Arc::new(PlanAllocationService::new(repos.clone(), ledger_mutator.clone()));

        // ==========================================
        // 初始化API层
        // ==========================================
        let capacity_api = Arc::new(CapacityApi::new(
            repos.clone(),
            config_manager.clone(),
            ledger_mutator.clone(),
        ));
        let plan_api = Arc::new(PlanApi::new(
            repos.plan_row_repo.clone(),
            config_manager.clone(),
            allocation,
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            capacity_api,
            plan_api,
            config_manager,
            ledger_mutator,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 CAPACITY_APS_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("CAPACITY_APS_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./capacity_ledger_aps.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("capacity-ledger-aps-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("capacity-ledger-aps");
        }

        // 确保目录存在
        std::fs::create_dir_all(&path).ok();
        path = path.join("capacity_ledger_aps.db");
    }

    path.to_string_lossy().to_string()
}
