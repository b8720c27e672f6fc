// ==========================================
// 管道端到端集成测试
// ==========================================
// 测试目标: 抽取 → 规范化 → 清洗 → 装载 全链路行为
// ==========================================

mod test_helpers;

use rusqlite::Connection;
use sales_etl::logging;
use sales_etl::pipeline::{Pipeline, RunOutcome};
use test_helpers::{
    audit_content, create_test_env, seed_reference_data, target_count, write_inbox_file,
};

const ORDERS_CSV: &str = "\
Numéro de Commande,Date de commande,revendeur,produit,Qté,prix unitaire\n\
CMD1,2025-07-01,3,101,5,10\n\
CMD1,2025-07-01,3,102,2,40\n\
CMD2,2025-07-02,4,101,1,10\n";

#[test]
fn test_full_run_loads_all_tables() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);
    write_inbox_file(&config, "commandes.csv", ORDERS_CSV);

    let summary = Pipeline::new(config.clone()).run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(target_count(&config, "regions"), 2);
    assert_eq!(target_count(&config, "resellers"), 2);
    assert_eq!(target_count(&config, "products"), 2);
    assert_eq!(target_count(&config, "production"), 2);
    // CMD1 两行共用一个订单头
    assert_eq!(target_count(&config, "orders"), 2);
    assert_eq!(target_count(&config, "order_lines"), 3);

    // 摘要计数与装载一致
    assert_eq!(summary.tables["orders"].loaded, 2);
    assert_eq!(summary.tables["order_lines"].loaded, 3);

    // 收件文件已归档
    assert!(!config.inbox_dir.join("commandes.csv").exists());
    assert!(config.archive_dir.join("commandes.csv").exists());
}

#[test]
fn test_foreign_keys_point_to_surrogates() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);
    write_inbox_file(&config, "commandes.csv", ORDERS_CSV);

    Pipeline::new(config.clone()).run().unwrap();

    // 所有订单行可经代理键连回订单与产品,无悬空引用
    let conn = Connection::open(&config.target_db_path).unwrap();
    let joined: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM order_lines ol
             JOIN orders o ON ol.order_id = o.id
             JOIN products p ON ol.product_id = p.id",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(joined, 3);

    let dangling: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM production pr
             LEFT JOIN products p ON pr.product_id = p.id
             WHERE p.id IS NULL",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(dangling, 0);
}

#[test]
fn test_second_run_is_idempotent() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);
    write_inbox_file(&config, "commandes.csv", ORDERS_CSV);

    Pipeline::new(config.clone()).run().unwrap();
    let counts_after_first = [
        target_count(&config, "regions"),
        target_count(&config, "products"),
        target_count(&config, "production"),
        target_count(&config, "orders"),
        target_count(&config, "order_lines"),
    ];

    // 无新数据的第二轮: 水位线 + 归档使抽取为空
    let summary = Pipeline::new(config.clone()).run().unwrap();
    assert_eq!(summary.outcome, RunOutcome::NothingExtracted);

    let counts_after_second = [
        target_count(&config, "regions"),
        target_count(&config, "products"),
        target_count(&config, "production"),
        target_count(&config, "orders"),
        target_count(&config, "order_lines"),
    ];
    assert_eq!(counts_after_first, counts_after_second);
}

#[test]
fn test_dangling_reseller_rejects_order_rows() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    // 来源库不灌数据: reseller_id=3 无处可解
    write_inbox_file(
        &config,
        "commandes.csv",
        "order_number,date,reseller_id,product_id,quantity,unit_price\n\
         CMD1,2025-07-01,3,101,5,10\n",
    );

    let summary = Pipeline::new(config.clone()).run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::NothingSurvived);
    assert_eq!(target_count(&config, "orders"), 0);
    assert_eq!(target_count(&config, "order_lines"), 0);

    let audit = audit_content(&config);
    assert!(audit.contains("foreign_key"));
    assert!(audit.contains("commandes.csv"));
}

#[test]
fn test_strict_duplicate_order_line_dropped() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);
    write_inbox_file(
        &config,
        "commandes.csv",
        "order_number,date,reseller_id,product_id,quantity,unit_price\n\
         CMD1,2025-07-01,3,101,5,10\n\
         CMD1,2025-07-01,3,101,5,10\n",
    );

    let summary = Pipeline::new(config.clone()).run().unwrap();

    // 第二行按严格重复剔除,只装载一行
    assert_eq!(target_count(&config, "order_lines"), 1);
    assert_eq!(summary.tables["orders"].rejected, 1);
    assert!(audit_content(&config).contains("strict_duplicate"));
}

#[test]
fn test_negative_quantity_rejected_despite_valid_fk() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);
    write_inbox_file(
        &config,
        "commandes.csv",
        "order_number,date,reseller_id,product_id,quantity,unit_price\n\
         CMD1,2025-07-01,3,101,-5,10\n",
    );

    Pipeline::new(config.clone()).run().unwrap();

    assert_eq!(target_count(&config, "order_lines"), 0);
    assert!(audit_content(&config).contains("forbidden_value"));
}

#[test]
fn test_rejection_trail_carries_provenance() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);
    // 第 2 行日期无效
    write_inbox_file(
        &config,
        "commandes.csv",
        "order_number,date,reseller_id,product_id,quantity,unit_price\n\
         CMD1,2025-07-01,3,101,5,10\n\
         CMD2,pas-une-date,3,101,1,10\n",
    );

    let summary = Pipeline::new(config.clone()).run().unwrap();

    assert_eq!(summary.tables["orders"].extracted, 2);
    assert_eq!(summary.tables["orders"].cleaned, 1);
    assert_eq!(summary.tables["orders"].rejected, 1);

    let audit = audit_content(&config);
    assert!(audit.contains("format"));
    // 审计可追溯到来源文件与行号
    assert!(audit.contains("commandes.csv"));
    assert!(audit.contains("Ligne 2"));
}

#[test]
fn test_views_refreshed_and_snapshot_exported() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);
    write_inbox_file(&config, "commandes.csv", ORDERS_CSV);

    Pipeline::new(config.clone()).run().unwrap();

    let conn = Connection::open(&config.target_db_path).unwrap();
    // 库存视图: 产品 101 产出 50,订购 5+1
    let stock: i64 = conn
        .query_row(
            "SELECT stock FROM v_stock WHERE product_source_id = 101",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stock, 44);

    // 营收视图按地区聚合
    let revenue: f64 = conn
        .query_row(
            "SELECT revenue FROM v_revenue_by_region WHERE region = 'nord'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!((revenue - 130.0).abs() < 1e-9);

    // 快照文件已导出
    let exported: Vec<_> = std::fs::read_dir(&config.export_dir)
        .unwrap()
        .flatten()
        .collect();
    assert_eq!(exported.len(), 1);
}

#[test]
fn test_structure_failure_rejects_whole_file_batch() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);
    // 缺 quantity / unit_price 列
    write_inbox_file(
        &config,
        "commandes.csv",
        "order_number,date,reseller_id\nCMD1,2025-07-01,3\n",
    );

    let summary = Pipeline::new(config.clone()).run().unwrap();

    assert_eq!(target_count(&config, "orders"), 0);
    assert_eq!(summary.tables["orders"].rejected, 1);
    assert!(audit_content(&config).contains("structure"));
    // 参照表不受订单批次结构问题影响
    assert_eq!(target_count(&config, "regions"), 2);
}
