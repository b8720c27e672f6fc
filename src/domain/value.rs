// ==========================================
// 销售库存ETL系统 - 单元格值类型
// ==========================================
// 职责: 类型化承载单元格值 + 字符串到目标类型的纠偏
// 约定: 纠偏失败产出 Null(不中断),由后续禁止值校验裁决
// ==========================================

use chrono::NaiveDate;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::Serialize;
use std::fmt;

use crate::schema::{ColumnType, DATE_FORMAT};

/// 单元格值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// 按声明类型纠偏
    ///
    /// - 已是目标类型的值原样保留
    /// - 文本值按目标类型解析,解析失败产出 Null
    /// - Integer 列接受 "3" 与 "3.0"(小数部分为零)两种写法
    pub fn coerce(self, ty: ColumnType) -> Value {
        match ty {
            ColumnType::Text => match self {
                Value::Text(_) | Value::Null => self,
                other => Value::Text(other.to_string()),
            },
            ColumnType::Integer => match self {
                Value::Integer(_) | Value::Null => self,
                Value::Float(f) if f.fract() == 0.0 => Value::Integer(f as i64),
                Value::Float(_) => Value::Null,
                Value::Text(s) => parse_integer(&s),
                Value::Date(_) => Value::Null,
            },
            ColumnType::Float => match self {
                Value::Float(_) | Value::Null => self,
                Value::Integer(i) => Value::Float(i as f64),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .unwrap_or(Value::Null),
                Value::Date(_) => Value::Null,
            },
            ColumnType::Date => match self {
                Value::Date(_) | Value::Null => self,
                Value::Text(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                    .map(Value::Date)
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
        }
    }

    /// 数值是否为负（非数值恒为 false）
    pub fn is_negative(&self) -> bool {
        match self {
            Value::Integer(i) => *i < 0,
            Value::Float(f) => *f < 0.0,
            _ => false,
        }
    }

    /// 日期值是否晚于给定日期（非日期恒为 false）
    pub fn is_after(&self, date: NaiveDate) -> bool {
        match self {
            Value::Date(d) => *d > date,
            _ => false,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// 集合成员运算用的规范键串（Null 无键）
    ///
    /// 前缀区分类型,避免 "1"(文本) 与 1(整数) 误撞。
    pub fn key_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(format!("t:{}", s)),
            Value::Integer(i) => Some(format!("i:{}", i)),
            Value::Float(f) if f.fract() == 0.0 => Some(format!("i:{}", *f as i64)),
            Value::Float(f) => Some(format!("f:{}", f)),
            Value::Date(d) => Some(format!("d:{}", d.format(DATE_FORMAT))),
        }
    }

    /// 整行指纹的组成片段（Null 也要可区分）
    pub fn fingerprint_piece(&self) -> String {
        self.key_string().unwrap_or_else(|| "∅".to_string())
    }
}

/// 整数解析，兼容 "3.0" 写法
fn parse_integer(s: &str) -> Value {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Integer(i);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 => Value::Integer(f as i64),
        _ => Value::Null,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Text(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
            Value::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
            Value::Integer(i) => Ok(ToSqlOutput::from(*i)),
            Value::Float(f) => Ok(ToSqlOutput::from(*f)),
            Value::Date(d) => Ok(ToSqlOutput::from(d.format(DATE_FORMAT).to_string())),
        }
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(_) => Value::Null,
        }
    }
}
