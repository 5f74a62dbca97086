//! Driver and data-source enumeration against the instrumented fake:
//! decoded contents match what was scripted, and the record arrays go back
//! through the bulk deleter exactly once, including on decode failure.

mod helpers;

use helpers::fake_environment;
use odbc_bridge::BridgeError;

#[test]
fn test_driver_enumeration_round_trip() {
    let (engine, env) = fake_environment();
    engine.add_driver(
        "PostgreSQL Unicode",
        &[
            ("Driver", "/usr/lib/psqlodbcw.so"),
            ("Setup", "/usr/lib/libodbcpsqlS.so"),
            ("Threading", "2"),
        ],
    );
    engine.add_driver("SQLite3", &[("Driver", "/usr/lib/libsqlite3odbc.so")]);
    engine.add_driver("Firebird", &[]);

    let drivers = env.list_drivers().expect("list_drivers");
    assert_eq!(drivers.len(), 3);
    assert_eq!(drivers[0].name, "PostgreSQL Unicode");
    assert_eq!(drivers[0].attributes.len(), 3);
    assert_eq!(
        drivers[0].attributes[2],
        ("Threading".to_string(), "2".to_string())
    );
    assert_eq!(drivers[2].name, "Firebird");
    assert!(drivers[2].attributes.is_empty());

    let deletes = engine.driver_array_deletes();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].1, 3);
    assert_eq!(engine.live_allocations(), 0);
}

#[test]
fn test_data_source_enumeration_round_trip() {
    let (engine, env) = fake_environment();
    engine.add_data_source("vendas", "sales database", "PostgreSQL Unicode");
    engine.add_data_source("cache_local", "", "SQLite3");

    let sources = env.list_data_sources().expect("list_data_sources");
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].name, "vendas");
    assert_eq!(sources[0].driver.as_deref(), Some("PostgreSQL Unicode"));
    assert_eq!(sources[1].name, "cache_local");

    assert_eq!(engine.datasource_array_deletes().len(), 1);
    assert_eq!(engine.live_allocations(), 0);
}

#[test]
fn test_empty_enumerations() {
    let (engine, env) = fake_environment();
    assert!(env.list_drivers().expect("list_drivers").is_empty());
    assert!(env.list_data_sources().expect("list_data_sources").is_empty());
    // Null array with zero count means there is nothing to delete.
    assert!(engine.driver_array_deletes().is_empty());
    assert!(engine.datasource_array_deletes().is_empty());
    assert_eq!(engine.live_allocations(), 0);
}

#[test]
fn test_mid_walk_decode_failure_still_deletes_array_once() {
    let (engine, env) = fake_environment();
    engine.add_driver("First", &[("k1", "v1")]);
    engine.add_driver("Second", &[("k2", "v2")]);
    engine.add_driver_with_null_name();
    engine.add_driver("Never reached", &[]);

    match env.list_drivers() {
        Err(BridgeError::Marshal(msg)) => assert!(msg.contains("null name")),
        other => panic!("Expected Marshal error, got {:?}", other.map(|_| ())),
    }

    let deletes = engine.driver_array_deletes();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].1, 4);
    assert_eq!(engine.double_release_count(), 0);
    assert_eq!(engine.live_allocations(), 0);
}

#[test]
fn test_enumeration_failure_decodes_error_record() {
    let (engine, env) = fake_environment();
    engine.fail_operation("list_datasources", 23, 0, "IM002", "no sources configured");
    match env.list_data_sources() {
        Err(BridgeError::Native {
            code,
            sql_state,
            message,
            ..
        }) => {
            assert_eq!(code, 23);
            assert_eq!(sql_state, "IM002");
            assert_eq!(message, "no sources configured");
        }
        other => panic!("Expected Native error, got {:?}", other.map(|_| ())),
    }
    // The scripted error's strings came back to the engine.
    assert_eq!(engine.error_strings_allocated(), engine.error_strings_freed());
    assert_eq!(engine.live_allocations(), 0);
}
