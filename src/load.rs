// ==========================================
// 销售库存ETL系统 - 装载层
// ==========================================
// 装载顺序: regions → resellers → products → (产品重映射)
//           → orders → (订单重映射) → order_lines → production
// 约定: 逐行独立插入,单行失败记录后继续;
//       整批完成后按批内最大业务键推进水位线
// ==========================================

use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, EventKind};
use crate::domain::{Record, SourceBatch, Value};
use crate::error::EtlResult;
use crate::schema::SchemaRegistry;
use crate::store::TargetStore;
use crate::watermark::WatermarkStore;

// ==========================================
// Loader - 目标库装载器
// ==========================================
pub struct Loader<'a> {
    registry: &'a SchemaRegistry,
    store: &'a TargetStore,
    watermarks: &'a WatermarkStore,
    audit: &'a AuditLog,
}

impl<'a> Loader<'a> {
    pub fn new(
        registry: &'a SchemaRegistry,
        store: &'a TargetStore,
        watermarks: &'a WatermarkStore,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            registry,
            store,
            watermarks,
            audit,
        }
    }

    /// 装载全部清洗存活批次
    ///
    /// # 返回
    /// - 表名 → 成功插入行数（无行可插的表不出现在结果中）
    ///
    /// 目标库连接失败为致命错误;单行插入失败仅记录。
    pub fn load(&self, clean: &HashMap<String, SourceBatch>) -> EtlResult<HashMap<String, usize>> {
        let mut results = HashMap::new();
        let conn = self.store.connect()?;

        // === 1. 无依赖参照表 ===
        if let Some(rows) = clean.get("regions") {
            let count = self.insert_batch(&conn, "regions", &["id", "name"], rows, |r, c| {
                r.get(c).clone()
            });
            results.insert("regions".to_string(), count);
            self.advance_watermark("regions", max_key(rows, "id"))?;
        }

        if let Some(rows) = clean.get("resellers") {
            let count = self.insert_batch(
                &conn,
                "resellers",
                &["id", "name", "region_id"],
                rows,
                |r, c| r.get(c).clone(),
            );
            results.insert("resellers".to_string(), count);
            self.advance_watermark("resellers", max_key(rows, "id"))?;
        }

        if let Some(rows) = clean.get("products") {
            let count = self.insert_batch(
                &conn,
                "products",
                &["source_id", "name", "unit_cost"],
                rows,
                |r, c| r.get(c).clone(),
            );
            results.insert("products".to_string(), count);
            self.advance_watermark("products", max_key(rows, "source_id"))?;
        }

        // === 2. 产品重映射 (source_id → 代理键 id) ===
        let product_remap = TargetStore::key_remapping(&conn, "products", "source_id")?;
        debug!(entries = product_remap.len(), "产品重映射已构建");

        // === 3. 订单头 + 订单重映射 + 订单行 ===
        if let Some(rows) = clean.get("orders") {
            let headers = distinct_order_headers(rows);
            let count = self.insert_batch(
                &conn,
                "orders",
                &["order_number", "date", "reseller_id"],
                &headers,
                |r, c| r.get(c).clone(),
            );
            results.insert("orders".to_string(), count);

            let order_remap = TargetStore::key_remapping(&conn, "orders", "order_number")?;
            debug!(entries = order_remap.len(), "订单重映射已构建");

            // 订单行: order_number → order_id, product_id(业务键) → 代理键
            let count = self.insert_batch(
                &conn,
                "order_lines",
                &["order_id", "product_id", "quantity", "unit_price"],
                rows,
                |r, c| match c {
                    "order_id" => remap(&order_remap, r.get("order_number")),
                    "product_id" => remap(&product_remap, r.get("product_id")),
                    other => r.get(other).clone(),
                },
            );
            results.insert("order_lines".to_string(), count);
        }

        // === 4. 生产记录 (product_id → 代理键) ===
        if let Some(rows) = clean.get("production") {
            let count = self.insert_batch(
                &conn,
                "production",
                &["id", "product_id", "quantity", "date"],
                rows,
                |r, c| match c {
                    "product_id" => remap(&product_remap, r.get("product_id")),
                    other => r.get(other).clone(),
                },
            );
            results.insert("production".to_string(), count);
            self.advance_watermark("production", max_key(rows, "id"))?;
        }

        info!(tables = results.len(), "装载完成");
        Ok(results)
    }

    /// 逐行插入一批记录,返回成功行数
    ///
    /// 列值通过 value_of 回调取得,重映射在回调内完成。
    fn insert_batch<F>(
        &self,
        conn: &Connection,
        table: &str,
        columns: &[&str],
        rows: &[Record],
        value_of: F,
    ) -> usize
    where
        F: Fn(&Record, &str) -> Value,
    {
        let mut inserted = 0;
        for row in rows {
            let values: Vec<Value> = columns.iter().map(|c| value_of(row, c)).collect();
            let refs: Vec<&Value> = values.iter().collect();
            match TargetStore::insert_row(conn, table, columns, &refs) {
                Ok(()) => inserted += 1,
                Err(e) => {
                    // 单行失败不中断整批
                    self.audit.record(
                        EventKind::InsertError,
                        table,
                        &format!("Erreur ligne {}: {}", row.provenance, e),
                    );
                    warn!(table = table, provenance = %row.provenance, error = %e, "行插入失败");
                }
            }
        }
        inserted
    }

    /// 推进水位线（以来源表名寻址,批内无键则不动）
    fn advance_watermark(&self, canonical: &str, max_key: Option<i64>) -> EtlResult<()> {
        let Some(max_key) = max_key else {
            return Ok(());
        };
        let source_name = self.registry.source_table_name(canonical);
        self.watermarks.advance(&source_name, max_key)?;
        self.audit.record(
            EventKind::Watermark,
            canonical,
            &format!("derniere cle chargee: {}", max_key),
        );
        Ok(())
    }
}

/// 批内某整数键列的最大值
fn max_key(rows: &[Record], column: &str) -> Option<i64> {
    rows.iter().filter_map(|r| r.get(column).as_integer()).max()
}

/// 业务键经重映射换为代理键（缺失映射产出 Null,由目标库约束裁决）
fn remap(mapping: &HashMap<String, i64>, business: &Value) -> Value {
    business
        .key_string()
        .and_then(|k| mapping.get(&k))
        .map(|id| Value::Integer(*id))
        .unwrap_or(Value::Null)
}

/// 订单头去重: (order_number, date, reseller_id) 三元组保首次
fn distinct_order_headers(rows: &[Record]) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut headers = Vec::new();
    for row in rows {
        let triple = format!(
            "{}|{}|{}",
            row.get("order_number").fingerprint_piece(),
            row.get("date").fingerprint_piece(),
            row.get("reseller_id").fingerprint_piece()
        );
        if seen.insert(triple) {
            headers.push(row.clone());
        }
    }
    headers
}
