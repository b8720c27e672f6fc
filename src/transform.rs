// ==========================================
// 销售库存ETL系统 - 清洗与校验引擎
// ==========================================
// 流程: 文本标准化 → 结构校验 → 类型纠偏 → 禁止值校验
//       → 业务键去重(批内/库内) → 严格重复剔除 → 跨表外键求解
// 约定: 某步被拒的行不再进入后续步骤,每行至多记录一次拒绝
// ==========================================

use chrono::{Local, NaiveDate};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::audit::{AuditLog, EventKind};
use crate::domain::{Provenance, Record, SourceBatch, Value};
use crate::error::EtlResult;
use crate::schema::{SchemaRegistry, TableSchema};
use crate::store::TargetStore;

/// 清洗结果: 存活行 + 每表被拒行的溯源集合
pub struct TransformOutput {
    pub clean: HashMap<String, SourceBatch>,
    pub rejected: HashMap<String, HashSet<Provenance>>,
}

// ==========================================
// Transformer - 清洗引擎
// ==========================================
pub struct Transformer<'a> {
    registry: &'a SchemaRegistry,
    store: &'a TargetStore,
    audit: &'a AuditLog,
}

impl<'a> Transformer<'a> {
    pub fn new(registry: &'a SchemaRegistry, store: &'a TargetStore, audit: &'a AuditLog) -> Self {
        Self {
            registry,
            store,
            audit,
        }
    }

    /// 清洗全部批次
    ///
    /// 仅目标库不可达类错误向上抛出;行级问题记入审计后继续。
    pub fn transform(
        &self,
        batches: HashMap<String, SourceBatch>,
    ) -> EtlResult<TransformOutput> {
        let today = Local::now().date_naive();
        let mut clean: HashMap<String, SourceBatch> = HashMap::new();
        let mut rejected: HashMap<String, HashSet<Provenance>> = HashMap::new();

        // 表处理顺序固定,保证日志与行为可复现
        let mut table_names: Vec<String> = batches.keys().cloned().collect();
        table_names.sort();

        // === 步骤 1-6: 逐表清洗 ===
        for table_name in &table_names {
            let rows = batches[table_name].clone();
            if rows.is_empty() {
                continue;
            }
            let schema = match self.registry.table(table_name) {
                Some(s) => s,
                None => {
                    debug!(table = %table_name, "无模式声明,整批忽略");
                    continue;
                }
            };

            let table_rejected = rejected.entry(table_name.clone()).or_default();
            let survivors = self.clean_table(schema, rows, today, table_rejected)?;

            info!(
                table = %table_name,
                clean = survivors.len(),
                rejected = table_rejected.len(),
                "单表清洗完成"
            );
            if !survivors.is_empty() {
                clean.insert(table_name.clone(), survivors);
            }
        }

        // === 步骤 7: 跨表外键求解(需在全部表完成 1-6 之后) ===
        self.resolve_foreign_keys(&mut clean, &mut rejected)?;

        // 全部行被拒的表不进入产出
        clean.retain(|_, rows| !rows.is_empty());
        Ok(TransformOutput { clean, rejected })
    }

    /// 单表步骤 1-6
    fn clean_table(
        &self,
        schema: &TableSchema,
        mut rows: SourceBatch,
        today: NaiveDate,
        rejected: &mut HashSet<Provenance>,
    ) -> EtlResult<SourceBatch> {
        // === 步骤 1: 文本标准化(trim + 小写) ===
        for row in &mut rows {
            for col in schema.text_columns() {
                if let Value::Text(s) = row.get(col) {
                    let normalized = s.trim().to_lowercase();
                    row.set(col, Value::Text(normalized));
                }
            }
        }

        // === 步骤 2: 结构校验(必填列须出现在批次列并集中) ===
        let present: HashSet<&str> = rows
            .iter()
            .flat_map(|r| r.values.keys().map(|k| k.as_str()))
            .collect();
        let mut missing: Vec<&str> = schema
            .required
            .iter()
            .filter(|c| !present.contains(**c))
            .copied()
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            // 整批拒绝,只记一次
            self.audit.record(
                EventKind::Structure,
                schema.name,
                &format!("Colonnes manquantes: {:?}", missing),
            );
            rejected.extend(rows.into_iter().map(|r| r.provenance));
            return Ok(Vec::new());
        }

        // === 步骤 3: 类型纠偏(失败产出 Null;非空值纠偏失败即拒) ===
        let mut typed_columns: Vec<(&str, crate::schema::ColumnType)> =
            schema.columns.iter().map(|(c, t)| (*c, *t)).collect();
        typed_columns.sort_unstable_by_key(|(c, _)| *c);

        let mut survivors = Vec::new();
        'row: for mut row in rows {
            for (col, ty) in typed_columns.iter().copied() {
                let before = row.get(col).clone();
                let after = before.clone().coerce(ty);
                if !before.is_null() && after.is_null() {
                    self.reject(
                        rejected,
                        EventKind::Format,
                        &row.provenance,
                        &format!(
                            "Ligne {} : valeur invalide apres correction dans '{}'",
                            row.provenance.row, col
                        ),
                    );
                    continue 'row;
                }
                row.set(col, after);
            }
            survivors.push(row);
        }

        // === 步骤 4: 禁止值校验 ===
        let mut kept = Vec::new();
        for row in survivors {
            if let Some(detail) = forbidden_value(schema, &row, today) {
                self.reject(
                    rejected,
                    EventKind::ForbiddenValue,
                    &row.provenance,
                    &format!(
                        "Ligne {} rejetee (valeur interdite: {})",
                        row.provenance.row, detail
                    ),
                );
                continue;
            }
            kept.push(row);
        }

        // === 步骤 5: 业务键去重(批内保首次 + 库内已有键剔除) ===
        let mut deduped = Vec::new();
        if let (Some(key_col), true) = (schema.business_key, schema.key_dedup) {
            let store_keys = self.store.distinct_values(schema.name, key_col)?;
            let mut seen: HashSet<String> = HashSet::new();
            for row in kept {
                // 步骤 4 之后业务键必非空
                let key = match row.get(key_col).key_string() {
                    Some(k) => k,
                    None => continue,
                };
                if !seen.insert(key.clone()) {
                    self.reject(
                        rejected,
                        EventKind::Duplicate,
                        &row.provenance,
                        &format!(
                            "Ligne {} supprimee (doublon sur {})",
                            row.provenance.row, key_col
                        ),
                    );
                    continue;
                }
                if store_keys.contains(&key) {
                    self.reject(
                        rejected,
                        EventKind::DuplicateInStore,
                        &row.provenance,
                        &format!(
                            "Ligne {} supprimee (cle deja presente en base sur {})",
                            row.provenance.row, key_col
                        ),
                    );
                    continue;
                }
                deduped.push(row);
            }
        } else {
            deduped = kept;
        }

        // === 步骤 6: 严格重复剔除(整行指纹,保首次) ===
        let mut fingerprints: HashSet<String> = HashSet::new();
        let mut result = Vec::new();
        for row in deduped {
            if !fingerprints.insert(row.fingerprint()) {
                self.reject(
                    rejected,
                    EventKind::StrictDuplicate,
                    &row.provenance,
                    &format!(
                        "Ligne {} strictement identique supprimee",
                        row.provenance.row
                    ),
                );
                continue;
            }
            result.push(row);
        }
        Ok(result)
    }

    /// 步骤 7: 跨表外键求解
    ///
    /// 有效引用值 = 本轮被引表清洗存活值 ∪ 目标库已有去重值。
    fn resolve_foreign_keys(
        &self,
        clean: &mut HashMap<String, SourceBatch>,
        rejected: &mut HashMap<String, HashSet<Provenance>>,
    ) -> EtlResult<()> {
        let mut table_names: Vec<String> = clean.keys().cloned().collect();
        table_names.sort();

        for table_name in table_names {
            let schema = match self.registry.table(&table_name) {
                Some(s) => s,
                None => continue,
            };
            for fk in &schema.foreign_keys {
                // 批内同名列缺失则跳过该外键
                let column_present = clean[&table_name].iter().any(|r| r.has_column(fk.column));
                if !column_present {
                    continue;
                }

                let mut valid = batch_key_values(clean.get(fk.ref_table), fk.ref_column);
                valid.extend(self.store.distinct_values(fk.ref_table, fk.ref_column)?);

                let rows = clean.get_mut(&table_name).unwrap();
                let table_rejected = rejected.entry(table_name.clone()).or_default();
                rows.retain(|row| {
                    let ok = row
                        .get(fk.column)
                        .key_string()
                        .map(|k| valid.contains(&k))
                        .unwrap_or(false);
                    if !ok {
                        self.reject(
                            table_rejected,
                            EventKind::ForeignKey,
                            &row.provenance,
                            &format!(
                                "Ligne {} rejetee ({} absent de {})",
                                row.provenance.row, fk.column, fk.ref_table
                            ),
                        );
                    }
                    ok
                });
            }
        }
        Ok(())
    }

    /// 记一次拒绝(溯源集合去重,审计日志每行至多一条)
    fn reject(
        &self,
        rejected: &mut HashSet<Provenance>,
        kind: EventKind,
        provenance: &Provenance,
        message: &str,
    ) {
        if rejected.insert(provenance.clone()) {
            self.audit.record(kind, &provenance.source, message);
        }
    }
}

/// 禁止值判定: 负数值 / 必填空值 / 未来日期
///
/// 返回第一处命中的说明,无命中返回 None。
fn forbidden_value(schema: &TableSchema, row: &Record, today: NaiveDate) -> Option<String> {
    for col in schema.numeric_columns() {
        if row.get(col).is_negative() {
            return Some(format!("{} negatif", col));
        }
    }
    for col in &schema.required {
        if row.get(col).is_null() {
            return Some(format!("{} manquant", col));
        }
    }
    for col in schema.date_columns() {
        if row.get(col).is_after(today) {
            return Some(format!("{} dans le futur", col));
        }
    }
    None
}

/// 本轮清洗存活批次中某列的全部键串
fn batch_key_values(batch: Option<&SourceBatch>, column: &str) -> HashSet<String> {
    batch
        .map(|rows| {
            rows.iter()
                .filter_map(|r| r.get(column).key_string())
                .collect()
        })
        .unwrap_or_default()
}
