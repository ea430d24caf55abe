// 对账工具: 按现存计划行重算全部产能台账（或硬重置归零），输出 JSON 汇总。
//
// Usage:
//   cargo run --bin reconcile_capacity_ledger -- [db_path] [--hard]
//
// 未给出 db_path 时使用 CAPACITY_APS_DB_PATH 或用户数据目录下的默认库。

use anyhow::{anyhow, Context};
use capacity_ledger_aps::app::{get_default_db_path, AppState};
use capacity_ledger_aps::logging;
use capacity_ledger_aps::ResetMode;

fn main() -> anyhow::Result<()> {
    logging::init();

    let mut db_path: Option<String> = None;
    let mut mode = ResetMode::Recalculate;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--hard" => mode = ResetMode::HardReset,
            flag if flag.starts_with("--") => return Err(anyhow!("未知参数: {}", flag)),
            path => db_path = Some(path.to_string()),
        }
    }
    let db_path = db_path.unwrap_or_else(get_default_db_path);

    let state = AppState::new(db_path.clone()).map_err(|e| anyhow!(e))?;
    let summary = state
        .capacity_api
        .reset_all_with_mode(mode)
        .with_context(|| format!("台账对账失败: db={}", db_path))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
