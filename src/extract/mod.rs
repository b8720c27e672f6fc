// ==========================================
// 销售库存ETL系统 - 抽取层
// ==========================================
// 职责: 从收件文件与嵌入式来源库拉取新行,打溯源标签
// 分支: 文件批次(CSV/Excel) + 来源库(水位线增量)
// ==========================================

pub mod inbox;
pub mod source_db;

use std::collections::HashMap;
use tracing::info;

use crate::audit::{AuditLog, EventKind};
use crate::config::EtlConfig;
use crate::domain::SourceBatch;
use crate::schema::{SchemaRegistry, ORDERS_TABLE};
use crate::watermark::WatermarkStore;

// ==========================================
// Extractor - 双分支抽取器
// ==========================================
pub struct Extractor<'a> {
    config: &'a EtlConfig,
    registry: &'a SchemaRegistry,
    watermarks: &'a WatermarkStore,
    audit: &'a AuditLog,
}

impl<'a> Extractor<'a> {
    pub fn new(
        config: &'a EtlConfig,
        registry: &'a SchemaRegistry,
        watermarks: &'a WatermarkStore,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            config,
            registry,
            watermarks,
            audit,
        }
    }

    /// 执行抽取
    ///
    /// # 返回
    /// - 表名 → 批次。文件分支落在 "orders"(列名已规范化),
    ///   来源库分支按来源表名落键(改名在规范化阶段处理)。
    /// - 两个分支都无数据时返回空映射,由编排器判定终止。
    pub fn extract(&self) -> HashMap<String, SourceBatch> {
        let mut batches = HashMap::new();

        // → 分支 1: 收件文件
        let file_rows = inbox::extract_from_inbox(
            &self.config.inbox_dir,
            &self.config.archive_dir,
            self.registry,
            self.audit,
        );
        if !file_rows.is_empty() {
            info!(rows = file_rows.len(), "文件分支抽取完成");
            batches.insert(ORDERS_TABLE.to_string(), file_rows);
        }

        // → 分支 2: 嵌入式来源库
        let db_batches = source_db::extract_from_source_db(
            &self.config.source_db_path,
            self.registry,
            self.watermarks,
            self.audit,
        );
        for (table, rows) in db_batches {
            info!(table = %table, rows = rows.len(), "来源库分支抽取完成");
            batches.insert(table, rows);
        }

        if batches.is_empty() {
            self.audit.record(
                EventKind::Extract,
                "global",
                "Aucune donnee exploitable trouvee (fichiers + base source)",
            );
        }
        batches
    }
}
