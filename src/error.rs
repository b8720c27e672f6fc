// ==========================================
// 销售库存ETL系统 - 管道错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 行级错误不走此类型(记入审计日志后继续),
//       此类型仅承载中断本次运行的致命错误
// ==========================================

use thiserror::Error;

/// ETL 管道错误类型
#[derive(Error, Debug)]
pub enum EtlError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("文件归档失败 ({file}): {message}")]
    ArchiveError { file: String, message: String },

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 配置错误 =====
    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigError { key: String, message: String },

    // ===== 数据库错误 =====
    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("目标库建库失败: {0}")]
    ProvisionError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    // ===== 水位线错误 =====
    #[error("水位线写入失败 (table: {table}): {message}")]
    WatermarkWriteError { table: String, message: String },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> Self {
        EtlError::FileReadError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for EtlError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE") {
                    EtlError::UniqueConstraintViolation(msg)
                } else if msg.contains("FOREIGN KEY") {
                    EtlError::ForeignKeyViolation(msg)
                } else {
                    EtlError::DatabaseQueryError(msg)
                }
            }
            _ => EtlError::DatabaseQueryError(err.to_string()),
        }
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for EtlError {
    fn from(err: csv::Error) -> Self {
        EtlError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for EtlError {
    fn from(err: calamine::Error) -> Self {
        EtlError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type EtlResult<T> = Result<T, EtlError>;
