// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 搭建临时运行环境(配置/来源库/收件文件)与目标库断言
// ==========================================

use rusqlite::Connection;
use sales_etl::config::{config_under_root, EtlConfig};
use std::fs;
use std::io::Write;
use tempfile::TempDir;

/// 创建临时运行环境(目录齐备,来源库已建表但为空)
pub fn create_test_env() -> (TempDir, EtlConfig) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let config = config_under_root(temp.path());
    config.ensure_dirs().expect("Failed to create dirs");

    let conn = Connection::open(&config.source_db_path).expect("Failed to open source db");
    conn.execute_batch(
        r#"
        CREATE TABLE region (
            region_id   INTEGER PRIMARY KEY,
            region_name TEXT NOT NULL
        );
        CREATE TABLE reseller (
            reseller_id   INTEGER PRIMARY KEY,
            reseller_name TEXT NOT NULL,
            region_id     INTEGER NOT NULL
        );
        CREATE TABLE product (
            product_id   INTEGER PRIMARY KEY,
            product_name TEXT NOT NULL,
            unit_cost    REAL NOT NULL
        );
        CREATE TABLE production (
            production_id   INTEGER PRIMARY KEY,
            product_id      INTEGER NOT NULL,
            quantity        INTEGER NOT NULL,
            date_production TEXT NOT NULL
        );
        "#,
    )
    .expect("Failed to init source schema");

    (temp, config)
}

/// 向来源库灌入一套基础参照数据
pub fn seed_reference_data(config: &EtlConfig) {
    let conn = Connection::open(&config.source_db_path).unwrap();
    conn.execute_batch(
        r#"
        INSERT INTO region VALUES (1, 'Nord'), (2, 'Sud');
        INSERT INTO reseller VALUES (3, 'Dupont SA', 1), (4, 'Martin SARL', 2);
        INSERT INTO product VALUES (101, 'Chaise', 12.5), (102, 'Table', 40.0);
        INSERT INTO production VALUES (11, 101, 50, '2025-06-01'), (12, 102, 30, '2025-06-02');
        "#,
    )
    .unwrap();
}

/// 写一个收件 CSV 文件
pub fn write_inbox_file(config: &EtlConfig, name: &str, content: &str) {
    let mut f = fs::File::create(config.inbox_dir.join(name)).unwrap();
    write!(f, "{}", content).unwrap();
}

/// 目标库某表行数
pub fn target_count(config: &EtlConfig, table: &str) -> i64 {
    let conn = Connection::open(&config.target_db_path).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .unwrap()
}

/// 当日审计日志全文（无文件时返回空串）
pub fn audit_content(config: &EtlConfig) -> String {
    let date = chrono::Local::now().format("%Y-%m-%d");
    let path = config.state_dir.join(format!("log_etl_{}.csv", date));
    fs::read_to_string(path).unwrap_or_default()
}
