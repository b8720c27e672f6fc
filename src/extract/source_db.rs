// ==========================================
// 销售库存ETL系统 - 嵌入式来源库分支
// ==========================================
// 约定: 以水位线为下界增量取数 (主键 > last_id)
// 容错: 单表查询失败记录后跳过,其余表继续
// ==========================================

use rusqlite::params;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::audit::{AuditLog, EventKind};
use crate::db::open_sqlite_connection;
use crate::domain::{Provenance, Record, SourceBatch, Value};
use crate::error::EtlResult;
use crate::schema::{SchemaRegistry, SourceTable};
use crate::watermark::WatermarkStore;

/// 抽取来源库全部已知表的新行
///
/// 返回映射的键是来源表名（改名交由规范化阶段）。
/// 库文件缺失或连接失败记录后返回空,不中断运行。
pub fn extract_from_source_db(
    db_path: &Path,
    registry: &SchemaRegistry,
    watermarks: &WatermarkStore,
    audit: &AuditLog,
) -> HashMap<String, SourceBatch> {
    let mut batches = HashMap::new();

    if !db_path.exists() {
        audit.record(
            EventKind::SourceQueryError,
            &db_path.display().to_string(),
            "Base source introuvable",
        );
        return batches;
    }

    let conn = match open_sqlite_connection(db_path) {
        Ok(c) => c,
        Err(e) => {
            audit.record(
                EventKind::SourceQueryError,
                &db_path.display().to_string(),
                &format!("Erreur connexion: {}", e),
            );
            warn!(error = %e, "来源库连接失败");
            return batches;
        }
    };

    for table in registry.source_tables() {
        let last_id = watermarks.last_id(table.name);
        match read_new_rows(&conn, &table, last_id) {
            Ok(rows) => {
                audit.record(
                    EventKind::SourceQuery,
                    table.name,
                    &format!("{} lignes a traiter", rows.len()),
                );
                if !rows.is_empty() {
                    batches.insert(table.name.to_string(), rows);
                }
            }
            Err(e) => {
                // 单表失败不拖垮其余表
                audit.record(
                    EventKind::SourceQueryError,
                    table.name,
                    &format!("Erreur requete: {}", e),
                );
                warn!(table = table.name, error = %e, "来源表查询失败");
            }
        }
    }

    batches
}

/// 读取主键大于水位线的行
fn read_new_rows(
    conn: &rusqlite::Connection,
    table: &SourceTable,
    last_id: i64,
) -> EtlResult<SourceBatch> {
    // 表名/主键列名出自注册表静态声明,非外部输入
    let sql = format!(
        "SELECT * FROM {} WHERE {} > ?1 ORDER BY {}",
        table.name, table.id_column, table.id_column
    );
    let mut stmt = conn.prepare(&sql)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query(params![last_id])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Record::new(Provenance::new(table.name, records.len() + 1));
        for (idx, col) in column_names.iter().enumerate() {
            let value: Value = row.get_ref(idx)?.into();
            record.set(col.clone(), value);
        }
        records.push(record);
    }
    Ok(records)
}
