// ==========================================
// 销售库存ETL系统 - 主入口
// ==========================================
// 职责: 初始化日志与配置,执行一次完整管道运行,输出摘要
// ==========================================

use sales_etl::config::EtlConfig;
use sales_etl::pipeline::{Pipeline, RunOutcome};
use sales_etl::logging;
use tracing::{error, info};

fn main() {
    // .env 可选,缺失时静默回退到进程环境变量
    let _ = dotenvy::dotenv();

    // 初始化日志系统
    logging::init();

    info!("==================================================");
    info!("{} - 增量批处理管道", sales_etl::APP_NAME);
    info!("系统版本: {}", sales_etl::VERSION);
    info!("==================================================");

    let config = match EtlConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "配置加载失败");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.ensure_dirs() {
        error!(error = %e, "运行目录创建失败");
        std::process::exit(1);
    }

    info!(inbox = %config.inbox_dir.display(), "收件目录");
    info!(source = %config.source_db_path.display(), "来源库");
    info!(target = %config.target_db_path.display(), "目标库");

    let pipeline = Pipeline::new(config);
    match pipeline.run() {
        Ok(summary) => {
            match summary.outcome {
                RunOutcome::NothingExtracted => info!("本次运行无新数据"),
                RunOutcome::NothingSurvived => info!("本次运行清洗后无存活数据"),
                RunOutcome::Completed => {
                    for (table, counts) in &summary.tables {
                        info!(
                            table = %table,
                            extracted = counts.extracted,
                            cleaned = counts.cleaned,
                            rejected = counts.rejected,
                            loaded = counts.loaded,
                            "运行计数"
                        );
                    }
                }
            }
            if let Ok(json) = serde_json::to_string(&summary) {
                info!(summary = %json, "运行摘要");
            }
            info!(run_id = %summary.run_id, "运行成功结束");
        }
        Err(e) => {
            // 致命错误: 水位线未推进,下次运行重试同批数据
            error!(error = %e, "运行失败");
            std::process::exit(1);
        }
    }
}
