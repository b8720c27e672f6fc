// ==========================================
// 销售库存ETL系统 - 水位线存储
// ==========================================
// 职责: 按来源表持久化"最近已装载主键值",界定增量抽取下界
// 载体: 状态目录下每表一个纯文本文件 last_<table>_id.txt
// 约定: 只增不减;缺失或无法解析一律视为 0
// ==========================================

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{EtlError, EtlResult};

// ==========================================
// WatermarkStore - 文件水位线存储
// ==========================================
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    state_dir: PathBuf,
}

impl WatermarkStore {
    pub fn new<P: AsRef<Path>>(state_dir: P) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    fn file_for(&self, table: &str) -> PathBuf {
        self.state_dir.join(format!("last_{}_id.txt", table))
    }

    /// 读取水位线（文件缺失或内容无法解析 → 0）
    pub fn last_id(&self, table: &str) -> i64 {
        let path = self.file_for(table);
        match fs::read_to_string(&path) {
            Ok(content) => content.trim().parse::<i64>().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// 推进水位线（新值不大于当前值时不写）
    pub fn advance(&self, table: &str, last_id: i64) -> EtlResult<()> {
        let current = self.last_id(table);
        if last_id <= current {
            debug!(table = table, current = current, candidate = last_id, "水位线未推进");
            return Ok(());
        }

        fs::create_dir_all(&self.state_dir).map_err(|e| EtlError::WatermarkWriteError {
            table: table.to_string(),
            message: e.to_string(),
        })?;
        fs::write(self.file_for(table), last_id.to_string()).map_err(|e| {
            EtlError::WatermarkWriteError {
                table: table.to_string(),
                message: e.to_string(),
            }
        })?;
        debug!(table = table, last_id = last_id, "水位线已推进");
        Ok(())
    }

    /// 清空全部水位线文件（目标库重建时,历史口径作废）
    pub fn purge(&self) -> EtlResult<()> {
        let entries = match fs::read_dir(&self.state_dir) {
            Ok(e) => e,
            // 状态目录尚不存在等同于无水位线
            Err(_) => return Ok(()),
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("last_") && name.ends_with("_id.txt") {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}
