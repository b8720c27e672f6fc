// ==========================================
// 销售库存ETL系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 单线程增量批处理管道
// 数据流: 抽取 → 改名规范化 → 清洗校验 → 装载 → 视图刷新
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 行/值/溯源
pub mod domain;

// 模式注册表 - 目标表结构与改名字典
pub mod schema;

// 审计日志汇
pub mod audit;

// 水位线存储
pub mod watermark;

// 抽取层 - 文件 + 来源库
pub mod extract;

// 清洗校验引擎
pub mod transform;

// 装载层
pub mod load;

// 目标库访问层
pub mod store;

// 运行编排
pub mod pipeline;

// 配置层
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 错误类型
pub mod error;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

pub use audit::{AuditLog, EventKind};
pub use config::EtlConfig;
pub use domain::{Provenance, Record, SourceBatch, Value};
pub use error::{EtlError, EtlResult};
pub use extract::Extractor;
pub use load::Loader;
pub use pipeline::{Pipeline, RunOutcome, RunSummary, TableCounts};
pub use schema::{ColumnType, SchemaRegistry, TableSchema};
pub use store::TargetStore;
pub use transform::{TransformOutput, Transformer};
pub use watermark::WatermarkStore;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "销售库存ETL系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
