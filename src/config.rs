// ==========================================
// 销售库存ETL系统 - 运行配置
// ==========================================
// 职责: 启动时一次性构建不可变配置对象,显式传递给各组件
// 来源: 环境变量 (.env 可选) + 默认数据目录
// ==========================================

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EtlError, EtlResult};

/// 默认数据根目录名（位于系统数据目录下）
const DEFAULT_DATA_DIR: &str = "sales-etl";

/// ETL 运行配置
///
/// 一次构建后不再变更，组件持有只读引用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// 待处理文件收件目录（CSV / Excel）
    pub inbox_dir: PathBuf,

    /// 已处理文件归档目录
    pub archive_dir: PathBuf,

    /// 运行状态目录（水位线文件 + 审计日志）
    pub state_dir: PathBuf,

    /// 报表导出目录（库存快照 CSV）
    pub export_dir: PathBuf,

    /// 嵌入式来源库路径（SQLite）
    pub source_db_path: PathBuf,

    /// 中央目标库路径（SQLite）
    pub target_db_path: PathBuf,
}

impl EtlConfig {
    /// 从环境变量构建配置
    ///
    /// # 环境变量
    /// - DATA_IN:        收件目录
    /// - DATA_ARCHIVE:   归档目录
    /// - DATA_STATE:     状态目录（水位线 + 审计日志）
    /// - DATA_EXPORT:    导出目录
    /// - SOURCE_DB_PATH: 来源库 SQLite 文件
    /// - TARGET_DB_PATH: 目标库 SQLite 文件
    ///
    /// 未设置的变量回退到系统数据目录下的默认路径。
    /// 调用方应先行 dotenvy::dotenv() 以支持 .env 文件。
    pub fn from_env() -> EtlResult<Self> {
        let data_root = default_data_root()?;

        Ok(Self {
            inbox_dir: env_path("DATA_IN", data_root.join("in")),
            archive_dir: env_path("DATA_ARCHIVE", data_root.join("archive")),
            state_dir: env_path("DATA_STATE", data_root.join("state")),
            export_dir: env_path("DATA_EXPORT", data_root.join("export")),
            source_db_path: env_path("SOURCE_DB_PATH", data_root.join("source.db")),
            target_db_path: env_path("TARGET_DB_PATH", data_root.join("central.db")),
        })
    }

    /// 确保运行所需目录存在（收件/归档/状态/导出）
    pub fn ensure_dirs(&self) -> EtlResult<()> {
        for dir in [
            &self.inbox_dir,
            &self.archive_dir,
            &self.state_dir,
            &self.export_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// 目标库是否已存在（判定是否需要建库）
    pub fn target_exists(&self) -> bool {
        self.target_db_path.exists()
    }
}

/// 读取路径型环境变量，未设置或为空时用默认值
fn env_path(key: &str, default: PathBuf) -> PathBuf {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => default,
    }
}

/// 系统数据目录下的默认根目录
fn default_data_root() -> EtlResult<PathBuf> {
    let base = dirs::data_dir().ok_or_else(|| EtlError::ConfigError {
        key: "data_dir".to_string(),
        message: "无法确定系统数据目录".to_string(),
    })?;
    Ok(base.join(DEFAULT_DATA_DIR))
}

/// 便捷构造：全部路径置于同一根目录下（测试与一次性运行使用）
pub fn config_under_root<P: AsRef<Path>>(root: P) -> EtlConfig {
    let root = root.as_ref();
    EtlConfig {
        inbox_dir: root.join("in"),
        archive_dir: root.join("archive"),
        state_dir: root.join("state"),
        export_dir: root.join("export"),
        source_db_path: root.join("source.db"),
        target_db_path: root.join("central.db"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_under_root_layout() {
        let config = config_under_root("/tmp/etl-root");
        assert_eq!(config.inbox_dir, PathBuf::from("/tmp/etl-root/in"));
        assert_eq!(config.target_db_path, PathBuf::from("/tmp/etl-root/central.db"));
    }

    #[test]
    fn test_ensure_dirs_creates_all() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_under_root(temp.path());
        config.ensure_dirs().unwrap();

        assert!(config.inbox_dir.is_dir());
        assert!(config.archive_dir.is_dir());
        assert!(config.state_dir.is_dir());
        assert!(config.export_dir.is_dir());
    }

    #[test]
    fn test_target_exists_false_before_provision() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_under_root(temp.path());
        assert!(!config.target_exists());
    }
}
