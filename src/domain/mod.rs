// ==========================================
// 销售库存ETL系统 - 领域层
// ==========================================
// 职责: 管道内流转的行/值/溯源类型
// ==========================================

pub mod record;
pub mod value;

pub use record::{Provenance, Record, SourceBatch};
pub use value::Value;
