// ==========================================
// 销售库存ETL系统 - 中央目标库访问层
// ==========================================
// 红线: 不含业务逻辑,只做数据访问
// 约束: 所有插入使用参数化占位符,防止 SQL 注入
// 约定: 连接按工作单元开闭,不跨阶段长持
// ==========================================

use rusqlite::{params_from_iter, Connection};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::db::open_sqlite_connection;
use crate::domain::Value;
use crate::error::{EtlError, EtlResult};

/// 目标库建表 DDL
///
/// products / orders / order_lines 使用自增代理键,
/// 业务键(source_id / order_number)另列保存。
const PROVISION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS regions (
    id   INTEGER NOT NULL PRIMARY KEY,
    name TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS resellers (
    id        INTEGER NOT NULL PRIMARY KEY,
    name      TEXT    NOT NULL,
    region_id INTEGER NOT NULL REFERENCES regions(id)
);

CREATE TABLE IF NOT EXISTS products (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL,
    name      TEXT    NOT NULL,
    unit_cost REAL    NOT NULL
);

CREATE TABLE IF NOT EXISTS production (
    id         INTEGER NOT NULL PRIMARY KEY,
    product_id INTEGER NOT NULL REFERENCES products(id),
    quantity   INTEGER NOT NULL,
    date       TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    order_number TEXT    NOT NULL,
    date         TEXT    NOT NULL,
    reseller_id  INTEGER NOT NULL REFERENCES resellers(id)
);

CREATE TABLE IF NOT EXISTS order_lines (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id   INTEGER NOT NULL REFERENCES orders(id),
    product_id INTEGER NOT NULL REFERENCES products(id),
    quantity   INTEGER NOT NULL,
    unit_price REAL    NOT NULL
);
"#;

/// 派生视图 DDL（装载后重建）
const VIEWS_SQL: &str = r#"
DROP VIEW IF EXISTS v_stock;
CREATE VIEW v_stock AS
SELECT
    p.source_id AS product_source_id,
    p.name      AS product,
    COALESCE(prod.total_prod, 0) AS total_prod,
    COALESCE(cmd.total_cmds, 0)  AS total_cmds,
    COALESCE(prod.total_prod, 0) - COALESCE(cmd.total_cmds, 0) AS stock
FROM products AS p
LEFT JOIN (
    SELECT product_id, SUM(quantity) AS total_prod
    FROM production
    GROUP BY product_id
) AS prod ON prod.product_id = p.id
LEFT JOIN (
    SELECT product_id, SUM(quantity) AS total_cmds
    FROM order_lines
    GROUP BY product_id
) AS cmd ON cmd.product_id = p.id
ORDER BY p.source_id;

DROP VIEW IF EXISTS v_orders_by_region;
CREATE VIEW v_orders_by_region AS
SELECT
    r.name      AS region,
    p.source_id AS product_source_id,
    p.name      AS product,
    SUM(ol.quantity) AS total_ordered
FROM order_lines ol
JOIN orders    o  ON ol.order_id   = o.id
JOIN resellers re ON o.reseller_id = re.id
JOIN regions   r  ON re.region_id  = r.id
JOIN products  p  ON ol.product_id = p.id
GROUP BY r.name, p.source_id, p.name
ORDER BY r.name, p.source_id;

DROP VIEW IF EXISTS v_revenue_by_region;
CREATE VIEW v_revenue_by_region AS
SELECT
    r.id   AS region_id,
    r.name AS region,
    ROUND(SUM(ol.quantity * ol.unit_price), 2) AS revenue,
    COUNT(DISTINCT o.order_number) AS order_count
FROM order_lines AS ol
JOIN orders    AS o  ON ol.order_id   = o.id
JOIN resellers AS re ON o.reseller_id = re.id
JOIN regions   AS r  ON re.region_id  = r.id
GROUP BY r.id, r.name
ORDER BY r.name;
"#;

// ==========================================
// TargetStore - 目标库访问
// ==========================================
#[derive(Debug, Clone)]
pub struct TargetStore {
    db_path: PathBuf,
}

impl TargetStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    /// 目标库是否已存在
    pub fn exists(&self) -> bool {
        self.db_path.exists()
    }

    /// 打开一个工作单元连接
    pub fn connect(&self) -> EtlResult<Connection> {
        open_sqlite_connection(&self.db_path)
            .map_err(|e| EtlError::DatabaseConnectionError(e.to_string()))
    }

    /// 建库: 创建全部目标表
    pub fn provision(&self) -> EtlResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(PROVISION_SQL)
            .map_err(|e| EtlError::ProvisionError(e.to_string()))?;
        Ok(())
    }

    /// 查询某列已有的全部去重值（以规范键串表示）
    ///
    /// 清洗阶段的库内去重与外键求解共用此口径。
    pub fn distinct_values(&self, table: &str, column: &str) -> EtlResult<HashSet<String>> {
        let conn = self.connect()?;
        // 表/列名出自注册表静态声明
        let sql = format!("SELECT DISTINCT {} FROM {}", column, table);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut values = HashSet::new();
        while let Some(row) = rows.next()? {
            let value: Value = row.get_ref(0)?.into();
            if let Some(key) = value.key_string() {
                values.insert(key);
            }
        }
        Ok(values)
    }

    /// 单行参数化插入（独立提交,失败不波及同批其余行）
    pub fn insert_row(
        conn: &Connection,
        table: &str,
        columns: &[&str],
        values: &[&Value],
    ) -> EtlResult<()> {
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );
        conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    /// 业务键 → 代理键重映射（插入父表后立即构建）
    ///
    /// # 参数
    /// - key_column: 业务键列（products.source_id / orders.order_number）
    pub fn key_remapping(
        conn: &Connection,
        table: &str,
        key_column: &str,
    ) -> EtlResult<HashMap<String, i64>> {
        let sql = format!("SELECT id, {} FROM {}", key_column, table);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut mapping = HashMap::new();
        while let Some(row) = rows.next()? {
            let surrogate: i64 = row.get(0)?;
            let business: Value = row.get_ref(1)?.into();
            if let Some(key) = business.key_string() {
                mapping.insert(key, surrogate);
            }
        }
        Ok(mapping)
    }

    /// 重建派生视图
    pub fn refresh_views(&self) -> EtlResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(VIEWS_SQL)?;
        Ok(())
    }

    /// 读取 v_stock 并导出库存快照 CSV
    ///
    /// # 返回
    /// - (快照文件路径, 负库存产品数)
    pub fn export_stock_snapshot(&self, export_dir: &Path) -> EtlResult<(PathBuf, usize)> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT product_source_id, product, total_prod, total_cmds, stock FROM v_stock",
        )?;
        let mut rows = stmt.query([])?;

        std::fs::create_dir_all(export_dir)?;
        let ts = chrono::Local::now().format("%Y-%m-%d_%H-%M");
        let path = export_dir.join(format!("stock_state_{}.csv", ts));
        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| EtlError::FileReadError(e.to_string()))?;
        writer.write_record(["product_source_id", "product", "total_prod", "total_cmds", "stock"])?;

        let mut negative = 0usize;
        while let Some(row) = rows.next()? {
            let source_id: i64 = row.get(0)?;
            let product: String = row.get(1)?;
            let total_prod: i64 = row.get(2)?;
            let total_cmds: i64 = row.get(3)?;
            let stock: i64 = row.get(4)?;
            if stock < 0 {
                negative += 1;
            }
            writer.write_record([
                source_id.to_string(),
                product,
                total_prod.to_string(),
                total_cmds.to_string(),
                stock.to_string(),
            ])?;
        }
        writer
            .flush()
            .map_err(|e| EtlError::FileReadError(e.to_string()))?;
        Ok((path, negative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provisioned_store() -> (tempfile::TempDir, TargetStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = TargetStore::new(temp.path().join("central.db"));
        store.provision().unwrap();
        (temp, store)
    }

    #[test]
    fn test_provision_creates_all_tables() {
        let (_temp, store) = provisioned_store();
        let conn = store.connect().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
                 ('regions','resellers','products','production','orders','order_lines')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 6);
    }

    #[test]
    fn test_insert_row_and_distinct_values() {
        let (_temp, store) = provisioned_store();
        let conn = store.connect().unwrap();
        TargetStore::insert_row(
            &conn,
            "regions",
            &["id", "name"],
            &[&Value::Integer(1), &Value::Text("nord".to_string())],
        )
        .unwrap();

        let values = store.distinct_values("regions", "id").unwrap();
        assert!(values.contains(&Value::Integer(1).key_string().unwrap()));
    }

    #[test]
    fn test_insert_null_in_not_null_column_fails() {
        let (_temp, store) = provisioned_store();
        let conn = store.connect().unwrap();
        let result = TargetStore::insert_row(
            &conn,
            "regions",
            &["id", "name"],
            &[&Value::Integer(1), &Value::Null],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_key_remapping_products() {
        let (_temp, store) = provisioned_store();
        let conn = store.connect().unwrap();
        TargetStore::insert_row(
            &conn,
            "products",
            &["source_id", "name", "unit_cost"],
            &[
                &Value::Integer(101),
                &Value::Text("chaise".to_string()),
                &Value::Float(12.5),
            ],
        )
        .unwrap();

        let remap = TargetStore::key_remapping(&conn, "products", "source_id").unwrap();
        let surrogate = remap[&Value::Integer(101).key_string().unwrap()];
        assert!(surrogate >= 1);
    }

    #[test]
    fn test_refresh_views_and_stock_snapshot() {
        let (temp, store) = provisioned_store();
        let conn = store.connect().unwrap();
        TargetStore::insert_row(
            &conn,
            "products",
            &["source_id", "name", "unit_cost"],
            &[
                &Value::Integer(101),
                &Value::Text("chaise".to_string()),
                &Value::Float(12.5),
            ],
        )
        .unwrap();
        let remap = TargetStore::key_remapping(&conn, "products", "source_id").unwrap();
        let pid = remap[&Value::Integer(101).key_string().unwrap()];
        TargetStore::insert_row(
            &conn,
            "production",
            &["id", "product_id", "quantity", "date"],
            &[
                &Value::Integer(1),
                &Value::Integer(pid),
                &Value::Integer(40),
                &Value::Text("2025-06-01".to_string()),
            ],
        )
        .unwrap();

        store.refresh_views().unwrap();
        let (path, negative) = store.export_stock_snapshot(&temp.path().join("export")).unwrap();

        assert!(path.exists());
        assert_eq!(negative, 0);
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("101,chaise,40,0,40"));
    }
}
