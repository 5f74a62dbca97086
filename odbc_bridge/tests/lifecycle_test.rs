//! End-to-end handle lifecycle accounting: every native resource opened
//! during a query is released exactly once, in both the orderly and the
//! drop-everything paths.

mod helpers;

use helpers::fake_environment;
use odbc_bridge::native::FakeColumn;
use odbc_bridge::BridgeError;

fn two_columns() -> Vec<FakeColumn> {
    ["id", "name"]
        .iter()
        .map(|n| FakeColumn {
            name: n.to_string(),
            type_name: "VARCHAR".to_string(),
            data_type: 12,
            column_size: 64,
            decimal_digits: 0,
            nullable: 1,
            is_auto_increment: false,
            is_case_sensitive: false,
            is_read_only: false,
            is_searchable: true,
        })
        .collect()
}

#[test]
fn test_full_query_lifecycle_releases_every_handle_once() {
    let (engine, env) = fake_environment();
    engine.set_columns(two_columns());
    engine.push_result(vec![
        vec![Some("1".to_string()), Some("alice".to_string())],
        vec![Some("2".to_string()), None],
    ]);

    let conn = env.connect("DSN=orders;UID=app").expect("connect");
    let stmt = conn.prepare("SELECT id, name FROM users").expect("prepare");
    let mut cursor = stmt.execute().expect("execute").expect("cursor");

    let mut rows = Vec::new();
    while let Some(row) = cursor.fetch_row().expect("fetch") {
        rows.push(row);
    }
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][1].as_deref(), Some("alice"));
    assert_eq!(rows[1][1], None);

    cursor.close();
    stmt.close();
    conn.close();

    let opened = engine.opened_addresses();
    assert_eq!(opened.len(), 3);
    assert_eq!(opened[0], (0x1000, "connection"));
    assert_eq!(opened[1].1, "statement");
    assert_eq!(opened[2].1, "cursor");
    for (addr, _) in opened {
        assert_eq!(engine.release_count(addr), 1, "address {:#x}", addr);
    }
    assert_eq!(engine.double_release_count(), 0);
    assert_eq!(engine.live_handles(), 0);
    assert_eq!(engine.live_allocations(), 0);
}

#[test]
fn test_drop_order_backstops_release_everything() {
    let (engine, env) = fake_environment();
    engine.set_columns(two_columns());
    engine.push_result(vec![vec![Some("1".to_string()), Some("x".to_string())]]);

    {
        let conn = env.connect("DSN=orders").expect("connect");
        let stmt = conn.prepare("SELECT id, name FROM users").expect("prepare");
        let mut cursor = stmt.execute().expect("execute").expect("cursor");
        cursor.fetch_row().expect("fetch");
        // No explicit closes: Drop runs cursor, statement, connection in
        // reverse declaration order.
    }

    for (addr, _) in engine.opened_addresses() {
        assert_eq!(engine.release_count(addr), 1);
    }
    assert_eq!(engine.double_release_count(), 0);
    assert_eq!(engine.live_handles(), 0);
    assert_eq!(engine.live_allocations(), 0);
}

#[test]
fn test_update_path_row_count() {
    let (engine, env) = fake_environment();
    engine.push_no_result();
    engine.set_row_count(7);

    let conn = env.connect("DSN=orders").expect("connect");
    let stmt = conn
        .prepare("DELETE FROM users WHERE inactive = 1")
        .expect("prepare");
    assert!(stmt.execute().expect("execute").is_none());
    assert_eq!(stmt.row_count().expect("row_count"), 7);
}

#[test]
fn test_closed_connection_rejects_new_statements() {
    let (engine, env) = fake_environment();
    let conn = env.connect("DSN=orders").expect("connect");
    conn.close();
    match conn.prepare("SELECT 1") {
        Err(BridgeError::HandleState(kind)) => assert_eq!(kind, "connection"),
        other => panic!("Expected HandleState error, got {:?}", other.map(|_| ())),
    }
    assert_eq!(engine.live_handles(), 0);
}

#[test]
fn test_transaction_commit_and_drop_rollback() {
    let (engine, env) = fake_environment();
    engine.push_no_result();
    let conn = env.connect("DSN=orders").expect("connect");

    let tx = conn
        .begin_transaction(odbc_bridge::IsolationLevel::RepeatableRead)
        .expect("begin");
    let stmt = conn.prepare("UPDATE t SET v = 1").expect("prepare");
    stmt.execute().expect("execute");
    tx.commit().expect("commit");

    // An unresolved transaction rolls back when it goes out of scope.
    {
        let _tx = conn
            .begin_transaction(odbc_bridge::IsolationLevel::ReadCommitted)
            .expect("begin");
    }
    conn.close();
    assert_eq!(engine.live_handles(), 1); // statement still open
    drop(stmt);
    assert_eq!(engine.live_handles(), 0);
}
