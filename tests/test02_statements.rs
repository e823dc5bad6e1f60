#![cfg(feature = "test-utils")]

use sql_pool_middleware::prelude::*;
use sql_pool_middleware::test_utils::{FailPoint, MockCall, MockDriver, mock_config};

const SELECT_ITEMS: &str = "SELECT ITEM, DESCR FROM ITEMS WHERE CLASS = ? AND QTY > ?";

async fn ready_db() -> (MockDriver, PooledDatabase<MockDriver>) {
    let driver = MockDriver::new();
    driver.script_query(
        SELECT_ITEMS,
        &["ITEM", "DESCR"],
        vec![
            vec![RowValues::Text("  ABC   ".into()), RowValues::Text("Widget   ".into())],
            vec![RowValues::Text("DEF".into()), RowValues::Null],
        ],
    );
    let db = PooledDatabase::new(driver.clone());
    db.initialize(mock_config(2)).await.unwrap();
    driver.clear_calls();
    (driver, db)
}

fn in_use(db: &PooledDatabase<MockDriver>) -> usize {
    db.status().map_or(0, |s| s.in_use)
}

#[tokio::test]
async fn query_binds_executes_and_marshals() -> Result<(), SqlPoolError> {
    let (driver, db) = ready_db().await;
    let params = [RowValues::Text("HW".into()), RowValues::Int(10)];

    let rows = db.execute_prepared_statement(SELECT_ITEMS, &params).await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_str("ITEM"), Some("ABC"));
    assert_eq!(rows[0].get_str("DESCR"), Some("Widget"));
    assert_eq!(rows[0].index(), 0);
    assert_eq!(rows[1].get("DESCR"), Some(None));
    assert_eq!(rows[1].index(), 1);

    assert_eq!(
        driver.calls(),
        vec![
            MockCall::SetDebug(false),
            MockCall::SetAutoCommit(true),
            MockCall::Prepare(SELECT_ITEMS.into()),
            MockCall::Bind(1, RowValues::Text("HW".into())),
            MockCall::Bind(2, RowValues::Int(10)),
            MockCall::ExecuteQuery,
            MockCall::CloseStatement,
        ]
    );
    assert_eq!(in_use(&db), 0);
    Ok(())
}

#[tokio::test]
async fn rows_serialize_to_plain_records() -> Result<(), SqlPoolError> {
    let (_driver, db) = ready_db().await;
    let rows = db
        .execute_prepared_statement(SELECT_ITEMS, &[RowValues::Null, RowValues::Null])
        .await?;
    let json = serde_json::to_value(&rows).unwrap();
    assert_eq!(
        json,
        serde_json::json!([
            {"ITEM": "ABC", "DESCR": "Widget", "index": 0},
            {"ITEM": "DEF", "DESCR": null, "index": 1}
        ])
    );
    Ok(())
}

#[tokio::test]
async fn absent_cursor_yields_empty_rows() -> Result<(), SqlPoolError> {
    let (_driver, db) = ready_db().await;
    let rows = db.execute_prepared_statement("CALL NOTHING", &[]).await?;
    assert!(rows.is_empty());
    Ok(())
}

#[tokio::test]
async fn binding_failure_aborts_and_releases() {
    let (driver, db) = ready_db().await;
    driver.fail(FailPoint::Bind);

    let err = db
        .execute_prepared_statement(SELECT_ITEMS, &[RowValues::Int(1), RowValues::Int(2)])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPoolError::ParameterBinding { position: 1, .. }));
    assert_eq!(driver.count(&MockCall::ExecuteQuery), 0);
    assert_eq!(driver.count(&MockCall::Bind(2, RowValues::Int(2))), 0);
    assert_eq!(driver.count(&MockCall::CloseStatement), 1);
    assert_eq!(in_use(&db), 0);
}

#[tokio::test]
async fn preparation_failure_releases_connection() {
    let (driver, db) = ready_db().await;
    driver.fail(FailPoint::Prepare);

    let err = db
        .execute_update_prepared_statement("UPDATE ITEMS SET QTY = 0", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPoolError::StatementPreparation(_)));
    assert_eq!(driver.count(&MockCall::CloseStatement), 0);
    assert_eq!(in_use(&db), 0);
}

#[tokio::test]
async fn execution_failure_carries_sql_state() {
    let (driver, db) = ready_db().await;
    driver.fail(FailPoint::Execute);

    let err = db
        .execute_prepared_statement(SELECT_ITEMS, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPoolError::Execution(_)));
    assert_eq!(err.sql_state(), Some("58000"));
    assert_eq!(driver.count(&MockCall::CloseStatement), 1);
    assert_eq!(in_use(&db), 0);
}

#[tokio::test]
async fn cursor_read_failure_discards_rows() {
    let (driver, db) = ready_db().await;
    driver.fail(FailPoint::ReadRow);

    let err = db
        .execute_prepared_statement(SELECT_ITEMS, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPoolError::ResultSet(_)));
    assert_eq!(in_use(&db), 0);
}

#[tokio::test]
async fn statement_close_failure_never_masks_result() -> Result<(), SqlPoolError> {
    let (driver, db) = ready_db().await;
    driver.fail(FailPoint::CloseStatement);

    let rows = db.execute_prepared_statement(SELECT_ITEMS, &[]).await?;
    assert_eq!(rows.len(), 2);

    driver.fail(FailPoint::Execute);
    let err = db
        .execute_prepared_statement(SELECT_ITEMS, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPoolError::Execution(_)));
    assert_eq!(in_use(&db), 0);
    Ok(())
}

#[tokio::test]
async fn update_runs_in_auto_commit_mode() -> Result<(), SqlPoolError> {
    let (driver, db) = ready_db().await;
    driver.script_update("DELETE FROM ITEMS WHERE ITEM = ?", 3);

    db.execute_update_prepared_statement("DELETE FROM ITEMS WHERE ITEM = ?", &["ABC".into()])
        .await?;
    assert_eq!(driver.count(&MockCall::SetAutoCommit(true)), 1);
    assert_eq!(driver.count(&MockCall::ExecuteUpdate), 1);
    assert_eq!(driver.count(&MockCall::Commit), 0);
    assert_eq!(in_use(&db), 0);
    Ok(())
}

#[tokio::test]
async fn operations_require_initialization() {
    let driver = MockDriver::new();
    let db = PooledDatabase::new(driver.clone());

    let err = db
        .execute_prepared_statement("SELECT 1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPoolError::NotInitialized));
    let err = db.execute_sql_string("SELECT 1").await.unwrap_err();
    assert!(matches!(err, SqlPoolError::NotInitialized));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn sql_string_initializes_lazily() -> Result<(), SqlPoolError> {
    let driver = MockDriver::new();
    driver.script_query("SELECT 1 FROM T", &["1"], vec![vec![RowValues::Int(1)]]);
    let db = PooledDatabase::with_config(driver.clone(), mock_config(1));
    assert!(!db.is_ready());

    let rows = db.execute_sql_string("SELECT 1 FROM T").await?;
    assert_eq!(rows[0].get_str("1"), Some("1"));
    assert!(db.is_ready());
    assert_eq!(driver.connects(), 1);

    db.execute_sql_string("SELECT 1 FROM T").await?;
    assert_eq!(db.pool().pool_generation(), 1);
    Ok(())
}

#[tokio::test]
async fn debug_mode_reaches_borrowed_connections() -> Result<(), SqlPoolError> {
    let (driver, db) = ready_db().await;
    db.set_debug_mode(true);
    db.execute_prepared_statement(SELECT_ITEMS, &[]).await?;
    db.set_debug_mode(false);
    db.execute_prepared_statement(SELECT_ITEMS, &[]).await?;

    let toggles: Vec<MockCall> = driver
        .calls()
        .into_iter()
        .filter(|c| matches!(c, MockCall::SetDebug(_)))
        .collect();
    assert_eq!(toggles, vec![MockCall::SetDebug(true), MockCall::SetDebug(false)]);
    Ok(())
}
