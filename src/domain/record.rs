// ==========================================
// 销售库存ETL系统 - 行记录与溯源标签
// ==========================================
// 职责: 每行显式携带 (来源, 来源行号),贯穿全部处理阶段
// 约定: 溯源标签不参与任何比较/指纹/装载
// ==========================================

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::domain::value::Value;

/// 溯源标签: 来源标识 + 来源侧 1 起始行号
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Provenance {
    /// 来源标识（文件名或来源表名）
    pub source: String,
    /// 来源侧行号（1 起始,对来源稳定）
    pub row: usize,
}

impl Provenance {
    pub fn new(source: impl Into<String>, row: usize) -> Self {
        Self {
            source: source.into(),
            row,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.row)
    }
}

/// 单行记录: 溯源标签 + 列名到值的映射
#[derive(Debug, Clone)]
pub struct Record {
    pub provenance: Provenance,
    pub values: HashMap<String, Value>,
}

impl Record {
    pub fn new(provenance: Provenance) -> Self {
        Self {
            provenance,
            values: HashMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// 列名重命名（目标列已存在时覆盖）
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(v) = self.values.remove(from) {
            self.values.insert(to.to_string(), v);
        }
    }

    /// 整行指纹（列名排序后拼接,溯源标签不参与）
    pub fn fingerprint(&self) -> String {
        let mut cols: Vec<&String> = self.values.keys().collect();
        cols.sort_unstable();
        cols.iter()
            .map(|c| format!("{}={}", c, self.values[*c].fingerprint_piece()))
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// 同一来源的一批记录（保持抽取顺序）
pub type SourceBatch = Vec<Record>;
