// ==========================================
// 销售库存ETL系统 - 运行编排器
// ==========================================
// 状态机(线性,不回跳):
//   目标库检查 → [建库] → 抽取 → 改名规范化 → 清洗
//   → (无存活即止) → 装载 → 派生视图刷新(尽力而为)
// ==========================================

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditLog, EventKind};
use crate::config::EtlConfig;
use crate::domain::SourceBatch;
use crate::error::EtlResult;
use crate::extract::Extractor;
use crate::load::Loader;
use crate::schema::SchemaRegistry;
use crate::store::TargetStore;
use crate::transform::Transformer;
use crate::watermark::WatermarkStore;

/// 运行终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// 完整跑完抽取/清洗/装载
    Completed,
    /// 两个抽取分支均无新数据
    NothingExtracted,
    /// 清洗后无任何存活行
    NothingSurvived,
}

/// 单表运行计数
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TableCounts {
    pub extracted: usize,
    pub cleaned: usize,
    pub rejected: usize,
    pub loaded: usize,
}

/// 运行摘要（按表计数,可追溯到审计日志）
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub outcome: RunOutcome,
    pub tables: BTreeMap<String, TableCounts>,
}

// ==========================================
// Pipeline - 编排器
// ==========================================
pub struct Pipeline {
    config: EtlConfig,
    registry: SchemaRegistry,
    audit: AuditLog,
    watermarks: WatermarkStore,
    store: TargetStore,
}

impl Pipeline {
    pub fn new(config: EtlConfig) -> Self {
        let audit = AuditLog::new(&config.state_dir);
        let watermarks = WatermarkStore::new(&config.state_dir);
        let store = TargetStore::new(&config.target_db_path);
        Self {
            config,
            registry: SchemaRegistry::new(),
            audit,
            watermarks,
            store,
        }
    }

    /// 执行一次完整运行
    ///
    /// 致命错误(建库失败/装载时目标库不可达)向上抛出,
    /// 水位线不推进,下次运行重试同一批数据。
    pub fn run(&self) -> EtlResult<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, "ETL 运行开始");
        let mut summary = RunSummary {
            run_id: run_id.clone(),
            outcome: RunOutcome::Completed,
            tables: BTreeMap::new(),
        };

        // === 步骤 0: 目标库检查与建库 ===
        if !self.store.exists() {
            info!("目标库不存在,清空水位线并建库");
            // 新库无历史,旧水位线口径作废
            self.watermarks.purge()?;
            if let Err(e) = self.store.provision() {
                self.audit
                    .record(EventKind::Fatal, "provision", &e.to_string());
                error!(error = %e, "建库失败");
                return Err(e);
            }
        }

        // === 步骤 1: 抽取 ===
        let extractor = Extractor::new(&self.config, &self.registry, &self.watermarks, &self.audit);
        let batches = extractor.extract();
        if batches.is_empty() {
            info!("无可抽取数据,运行终止");
            summary.outcome = RunOutcome::NothingExtracted;
            return Ok(summary);
        }

        // === 步骤 2: 表名/列名规范化 ===
        let batches = self.normalize(batches);
        for (table, rows) in &batches {
            self.audit.record(
                EventKind::Extract,
                table,
                &format!("{} lignes", rows.len()),
            );
            summary.tables.entry(table.clone()).or_default().extracted = rows.len();
        }

        // === 步骤 3: 清洗 ===
        let transformer = Transformer::new(&self.registry, &self.store, &self.audit);
        let output = transformer.transform(batches)?;
        for (table, rows) in &output.clean {
            self.audit.record(
                EventKind::Transform,
                table,
                &format!("{} lignes nettoyees", rows.len()),
            );
            summary.tables.entry(table.clone()).or_default().cleaned = rows.len();
        }
        for (table, provs) in &output.rejected {
            if !provs.is_empty() {
                warn!(table = %table, rejected = provs.len(), "存在被拒行(详见审计日志)");
                summary.tables.entry(table.clone()).or_default().rejected = provs.len();
            }
        }
        if output.clean.is_empty() {
            info!("清洗后无存活数据,运行终止");
            summary.outcome = RunOutcome::NothingSurvived;
            return Ok(summary);
        }

        // === 步骤 4: 装载 ===
        let loader = Loader::new(&self.registry, &self.store, &self.watermarks, &self.audit);
        let results = match loader.load(&output.clean) {
            Ok(r) => r,
            Err(e) => {
                self.audit.record(EventKind::Fatal, "load", &e.to_string());
                error!(error = %e, "装载失败");
                return Err(e);
            }
        };
        for (table, count) in &results {
            self.audit.record(
                EventKind::Load,
                table,
                &format!("{} lignes inserees", count),
            );
            summary.tables.entry(table.clone()).or_default().loaded = *count;
        }

        // === 步骤 5: 派生视图刷新 + 库存快照(尽力而为) ===
        self.post_load();

        info!(run_id = %run_id, "ETL 运行结束");
        Ok(summary)
    }

    /// 表名与列名规范化（嵌入式来源表 → 目标模式命名）
    fn normalize(&self, batches: HashMap<String, SourceBatch>) -> HashMap<String, SourceBatch> {
        let mut renamed = HashMap::new();
        for (source_name, mut rows) in batches {
            let canonical = self.registry.canonical_table_name(&source_name);
            if canonical != source_name {
                self.audit.record(
                    EventKind::Rename,
                    &source_name,
                    &format!("{} -> {}", source_name, canonical),
                );
            }

            let column_renames = self.registry.column_renames(&canonical);
            if !column_renames.is_empty() {
                for row in &mut rows {
                    for (&from, &to) in &column_renames {
                        row.rename_column(from, to);
                    }
                }
            }
            renamed.insert(canonical, rows);
        }
        renamed
    }

    /// 装载后外部协作步骤,失败只记录不上抛
    fn post_load(&self) {
        if let Err(e) = self.store.refresh_views() {
            self.audit.record(EventKind::PostLoad, "views", &e.to_string());
            warn!(error = %e, "派生视图刷新失败");
            return;
        }
        match self.store.export_stock_snapshot(&self.config.export_dir) {
            Ok((path, negative)) => {
                if negative > 0 {
                    self.audit.record(
                        EventKind::PostLoad,
                        "stock",
                        &format!("{} produit(s) avec stock negatif", negative),
                    );
                    warn!(count = negative, "检测到负库存产品");
                }
                self.audit.record(
                    EventKind::PostLoad,
                    "global",
                    &format!("Vues a jour, snapshot: {}", path.display()),
                );
            }
            Err(e) => {
                self.audit.record(EventKind::PostLoad, "stock", &e.to_string());
                warn!(error = %e, "库存快照导出失败");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_under_root;

    #[test]
    fn test_run_with_no_data_terminates_early() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_under_root(temp.path());
        config.ensure_dirs().unwrap();

        let pipeline = Pipeline::new(config);
        let summary = pipeline.run().unwrap();

        assert_eq!(summary.outcome, RunOutcome::NothingExtracted);
        assert!(summary.tables.is_empty());
    }

    #[test]
    fn test_fresh_store_purges_watermarks() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_under_root(temp.path());
        config.ensure_dirs().unwrap();
        // 残留的旧水位线
        let watermarks = WatermarkStore::new(&config.state_dir);
        watermarks.advance("region", 42).unwrap();

        let pipeline = Pipeline::new(config.clone());
        pipeline.run().unwrap();

        assert!(config.target_db_path.exists());
        assert_eq!(watermarks.last_id("region"), 0);
    }
}
