//! Connection and result-set metadata decoding through the public API.

mod helpers;

use helpers::fake_environment;
use odbc_bridge::native::{FakeColumn, FakeConnectionMeta};
use odbc_bridge::{IsolationLevel, Nullability};

#[test]
fn test_connection_capabilities_decode() {
    let (engine, env) = fake_environment();
    engine.set_connection_meta(FakeConnectionMeta {
        dbms_name: "Microsoft SQL Server".to_string(),
        dbms_version: "15.00.4312".to_string(),
        driver_name: "msodbcsql18".to_string(),
        driver_version: "18.3".to_string(),
        max_concurrent_statements: 1,
        default_isolation: 1,
        supports_transactions: true,
        supports_batch: true,
        read_only: false,
    });

    let conn = env.connect("DSN=mssql").expect("connect");
    let caps = conn.capabilities().expect("capabilities");
    assert_eq!(caps.dbms_name, "Microsoft SQL Server");
    assert_eq!(caps.driver_name, "msodbcsql18");
    assert_eq!(caps.max_concurrent_statements, 1);
    assert_eq!(caps.default_isolation, IsolationLevel::ReadCommitted);
    assert!(caps.supports_transactions);
    assert!(caps.supports_batch);
    assert!(!caps.read_only);

    // The capability record and its strings went back to the engine.
    assert_eq!(engine.connection_meta_deletes(), 1);
    assert_eq!(engine.live_allocations(), 0);
}

#[test]
fn test_result_metadata_decode() {
    let (engine, env) = fake_environment();
    engine.set_columns(vec![
        FakeColumn {
            name: "id".to_string(),
            type_name: "BIGINT".to_string(),
            data_type: -5,
            column_size: 19,
            decimal_digits: 0,
            nullable: 0,
            is_auto_increment: true,
            is_case_sensitive: false,
            is_read_only: true,
            is_searchable: true,
        },
        FakeColumn {
            name: "preço".to_string(),
            type_name: "DECIMAL".to_string(),
            data_type: 3,
            column_size: 12,
            decimal_digits: 2,
            nullable: 1,
            is_auto_increment: false,
            is_case_sensitive: false,
            is_read_only: false,
            is_searchable: true,
        },
    ]);
    engine.push_result(vec![]);

    let conn = env.connect("DSN=shop").expect("connect");
    let stmt = conn.prepare("SELECT id, preço FROM produtos").expect("prepare");
    let mut cursor = stmt.execute().expect("execute").expect("cursor");

    let meta = cursor.metadata().expect("metadata");
    assert_eq!(meta.len(), 2);
    assert_eq!(meta[0].name, "id");
    assert_eq!(meta[0].nullable, Nullability::NotNullable);
    assert!(meta[0].is_auto_increment);
    assert_eq!(meta[1].name, "preço");
    assert_eq!(meta[1].type_name.as_deref(), Some("DECIMAL"));
    assert_eq!(meta[1].decimal_digits, 2);
    assert_eq!(meta[1].nullable, Nullability::Nullable);

    // Cached: a second access does not call back into the engine.
    cursor.metadata().expect("metadata");
    assert_eq!(engine.column_meta_deletes().len(), 1);
}

#[test]
fn test_metadata_failure_is_isolated() {
    let (engine, env) = fake_environment();
    engine.push_result(vec![]);
    engine.fail_operation("get_result_metadata", 4, 0, "HY010", "sequence error");

    let conn = env.connect("DSN=shop").expect("connect");
    let stmt = conn.prepare("SELECT 1").expect("prepare");
    let mut cursor = stmt.execute().expect("execute").expect("cursor");
    assert!(cursor.metadata().is_err());

    // The cursor itself stays usable for close.
    engine.clear_failure("get_result_metadata");
    cursor.close();
    assert_eq!(engine.live_allocations(), 0);
}
