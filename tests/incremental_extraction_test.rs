// ==========================================
// 增量抽取与水位线集成测试
// ==========================================
// 测试目标: 水位线单调推进 + 跨轮次增量语义
// ==========================================

mod test_helpers;

use rusqlite::Connection;
use sales_etl::logging;
use sales_etl::pipeline::{Pipeline, RunOutcome};
use sales_etl::watermark::WatermarkStore;
use test_helpers::{create_test_env, seed_reference_data, target_count};

#[test]
fn test_watermarks_advance_to_loaded_max() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);

    Pipeline::new(config.clone()).run().unwrap();

    let watermarks = WatermarkStore::new(&config.state_dir);
    assert_eq!(watermarks.last_id("region"), 2);
    assert_eq!(watermarks.last_id("reseller"), 4);
    assert_eq!(watermarks.last_id("product"), 102);
    assert_eq!(watermarks.last_id("production"), 12);
}

#[test]
fn test_second_run_extracts_nothing_above_watermark() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);

    Pipeline::new(config.clone()).run().unwrap();
    let summary = Pipeline::new(config.clone()).run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::NothingExtracted);
}

#[test]
fn test_new_source_rows_extracted_incrementally() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);

    Pipeline::new(config.clone()).run().unwrap();

    // 第二轮前来源库新增一个产品
    let conn = Connection::open(&config.source_db_path).unwrap();
    conn.execute(
        "INSERT INTO product VALUES (103, 'Bureau', 75.0)",
        [],
    )
    .unwrap();

    let summary = Pipeline::new(config.clone()).run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    // 只有新产品被抽取与装载
    assert_eq!(summary.tables["products"].extracted, 1);
    assert_eq!(summary.tables["products"].loaded, 1);
    assert_eq!(target_count(&config, "products"), 3);

    let watermarks = WatermarkStore::new(&config.state_dir);
    assert_eq!(watermarks.last_id("product"), 103);
}

#[test]
fn test_watermarks_never_decrease_across_runs() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);

    Pipeline::new(config.clone()).run().unwrap();
    let watermarks = WatermarkStore::new(&config.state_dir);
    let before = [
        watermarks.last_id("region"),
        watermarks.last_id("reseller"),
        watermarks.last_id("product"),
        watermarks.last_id("production"),
    ];

    Pipeline::new(config.clone()).run().unwrap();
    let after = [
        watermarks.last_id("region"),
        watermarks.last_id("reseller"),
        watermarks.last_id("product"),
        watermarks.last_id("production"),
    ];

    for (b, a) in before.iter().zip(after.iter()) {
        assert!(a >= b);
    }
}

#[test]
fn test_fresh_target_store_resets_history() {
    logging::init_test();
    let (_temp, config) = create_test_env();
    seed_reference_data(&config);

    Pipeline::new(config.clone()).run().unwrap();
    assert_eq!(target_count(&config, "products"), 2);

    // 目标库被删: 水位线随建库清零,同批数据重新装载
    std::fs::remove_file(&config.target_db_path).unwrap();
    let summary = Pipeline::new(config.clone()).run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(target_count(&config, "products"), 2);
}
