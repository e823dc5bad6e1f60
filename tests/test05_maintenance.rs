#![cfg(feature = "test-utils")]

use std::sync::Arc;

use sql_pool_middleware::prelude::*;
use sql_pool_middleware::test_utils::{MockCall, MockDriver, mock_config};

fn is_maintenance<T: std::fmt::Debug>(result: Result<T, SqlPoolError>) -> bool {
    matches!(result, Err(SqlPoolError::MaintenanceMode))
}

#[tokio::test]
async fn closed_gate_rejects_every_operation_without_touching_the_pool() {
    let driver = MockDriver::new();
    let db = PooledDatabase::new(driver.clone());
    db.initialize(mock_config(2)).await.unwrap();
    driver.clear_calls();
    let before = db.status();

    db.set_prevent_queries(true);
    assert!(db.prevent_queries());

    assert!(is_maintenance(db.execute_sql_string("SELECT 1").await));
    assert!(is_maintenance(db.execute_prepared_statement("SELECT 1", &[]).await));
    assert!(is_maintenance(
        db.execute_update_prepared_statement("DELETE FROM T", &[]).await
    ));
    assert!(is_maintenance(
        db.execute_stored_procedure("CALL P(?)", &[ProcedureParameter::input(1_i64)])
            .await
    ));
    assert!(is_maintenance(
        db.run_transaction(|tx| Box::pin(async move { tx.execute_update("DELETE FROM T", &[]).await }))
            .await
    ));

    assert_eq!(db.status(), before);
    assert!(driver.calls().is_empty());

    db.set_prevent_queries(false);
    db.execute_prepared_statement("SELECT 1", &[]).await.unwrap();
    assert_eq!(driver.count(&MockCall::Prepare("SELECT 1".into())), 1);
}

#[tokio::test]
async fn closed_gate_wins_over_uninitialized_pool() {
    let driver = MockDriver::new();
    let db = PooledDatabase::with_config(driver.clone(), mock_config(1));
    db.set_prevent_queries(true);

    assert!(is_maintenance(db.execute_sql_string("SELECT 1").await));
    assert!(is_maintenance(db.execute_prepared_statement("SELECT 1", &[]).await));
    // No lazy initialization happened behind the gate.
    assert!(!db.is_ready());
    assert_eq!(driver.connects(), 0);
}

#[tokio::test]
async fn in_transaction_update_checks_the_gate() {
    let driver = MockDriver::new();
    let db = PooledDatabase::new(driver.clone());
    db.initialize(mock_config(1)).await.unwrap();
    let outer = db.clone();

    let err = db
        .run_transaction(move |tx| {
            Box::pin(async move {
                outer.set_prevent_queries(true);
                outer
                    .execute_update_statement_in_transaction(tx.connection(), "DELETE FROM T", &[])
                    .await
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPoolError::MaintenanceMode));
    assert_eq!(driver.count(&MockCall::ExecuteUpdate), 0);
    assert_eq!(driver.count(&MockCall::Rollback), 1);
    assert_eq!(db.status().map(|s| s.in_use), Some(0));
}

#[tokio::test]
async fn shared_gate_switches_several_databases() {
    let gate = Arc::new(MaintenanceGate::new());
    let first = PooledDatabase::new(MockDriver::new()).with_gate(Arc::clone(&gate));
    let second = PooledDatabase::new(MockDriver::new()).with_gate(Arc::clone(&gate));
    first.initialize(mock_config(1)).await.unwrap();
    second.initialize(mock_config(1)).await.unwrap();

    first.set_prevent_queries(true);
    assert!(second.prevent_queries());
    assert!(is_maintenance(second.execute_prepared_statement("SELECT 1", &[]).await));

    gate.set_prevent_queries(false);
    assert!(first.execute_prepared_statement("SELECT 1", &[]).await.is_ok());
}

#[tokio::test]
async fn global_gate_reaches_every_database_using_it() {
    let db = PooledDatabase::new(MockDriver::new()).with_gate(MaintenanceGate::global());
    db.initialize(mock_config(1)).await.unwrap();

    MaintenanceGate::global().set_prevent_queries(true);
    let rejected = db.execute_prepared_statement("SELECT 1", &[]).await;
    MaintenanceGate::global().set_prevent_queries(false);

    assert!(is_maintenance(rejected));
    assert!(db.execute_prepared_statement("SELECT 1", &[]).await.is_ok());
}

#[tokio::test]
async fn lifecycle_stays_available_in_maintenance_mode() -> Result<(), SqlPoolError> {
    let driver = MockDriver::new();
    let db = PooledDatabase::new(driver.clone());
    db.set_prevent_queries(true);

    db.initialize(mock_config(1)).await?;
    db.reinitialize(mock_config(2)).await?;
    assert_eq!(db.status().map(|s| s.size), Some(2));
    db.close_all().await?;
    assert!(!db.is_ready());
    Ok(())
}
