//! Decoders for the engine's out-of-band metadata records.
//!
//! Each decoder copies every field into owned Rust data before handing the
//! record back to the engine's bulk deleter, so no raw pointer survives the
//! call. Deletion is guarded by a Drop type and therefore happens exactly
//! once even when a field in the middle fails to decode.

use crate::channel::with_error_check;
use crate::codec;
use crate::engine::transaction::IsolationLevel;
use crate::error::{BridgeError, Result};
use crate::native::types::{RawColumnMeta, RawConnectionMeta};
use crate::native::NativeEngine;
use serde::Serialize;

/// Column nullability as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Nullability {
    NotNullable,
    Nullable,
    Unknown,
}

impl Nullability {
    pub fn from_raw(raw: i16) -> Self {
        match raw {
            0 => Nullability::NotNullable,
            1 => Nullability::Nullable,
            _ => Nullability::Unknown,
        }
    }
}

/// Describes one column of a result set.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub type_name: Option<String>,
    pub data_type: i32,
    pub column_size: i64,
    pub decimal_digits: i32,
    pub nullable: Nullability,
    pub is_auto_increment: bool,
    pub is_case_sensitive: bool,
    pub is_read_only: bool,
    pub is_searchable: bool,
}

/// What the connected engine and driver can do.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionCapabilities {
    pub dbms_name: String,
    pub dbms_version: String,
    pub driver_name: String,
    pub driver_version: String,
    pub max_concurrent_statements: i32,
    pub default_isolation: IsolationLevel,
    pub supports_transactions: bool,
    pub supports_batch: bool,
    pub read_only: bool,
}

fn byte_flag(raw: u8) -> bool {
    raw != 0
}

struct ColumnArrayGuard<'e> {
    engine: &'e dyn NativeEngine,
    array: *mut RawColumnMeta,
    count: u32,
}

impl Drop for ColumnArrayGuard<'_> {
    fn drop(&mut self) {
        // Safety: the array came from get_result_metadata with this count
        // and is deleted here exactly once.
        unsafe { self.engine.delete_column_metadata(self.array, self.count) };
    }
}

struct ConnMetaGuard<'e> {
    engine: &'e dyn NativeEngine,
    record: *mut RawConnectionMeta,
}

impl Drop for ConnMetaGuard<'_> {
    fn drop(&mut self) {
        unsafe { self.engine.delete_connection_metadata(self.record) };
    }
}

unsafe fn decode_column(raw: &RawColumnMeta) -> Result<ColumnMetadata> {
    let name = codec::decode(raw.name)
        .ok_or_else(|| BridgeError::Marshal("column record with null name".to_string()))?;
    Ok(ColumnMetadata {
        name,
        type_name: codec::decode(raw.type_name),
        data_type: raw.data_type,
        column_size: raw.column_size,
        decimal_digits: raw.decimal_digits,
        nullable: Nullability::from_raw(raw.nullable),
        is_auto_increment: byte_flag(raw.is_auto_increment),
        is_case_sensitive: byte_flag(raw.is_case_sensitive),
        is_read_only: byte_flag(raw.is_read_only),
        is_searchable: byte_flag(raw.is_searchable),
    })
}

/// Fetches and decodes the column descriptions of a result set.
pub(crate) fn decode_result_metadata(
    engine: &dyn NativeEngine,
    cursor_addr: usize,
) -> Result<Vec<ColumnMetadata>> {
    let mut count: u32 = 0;
    let array = with_error_check(engine, |err| unsafe {
        engine.get_result_metadata(cursor_addr, &mut count, err)
    })?;
    if array.is_null() {
        return Ok(Vec::new());
    }
    let _guard = ColumnArrayGuard {
        engine,
        array,
        count,
    };
    let mut columns = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        // Safety: the engine guarantees `count` contiguous records at `array`.
        let raw = unsafe { &*array.add(i) };
        columns.push(unsafe { decode_column(raw) }?);
    }
    Ok(columns)
}

/// Fetches and decodes the connection capability record.
pub(crate) fn decode_connection_metadata(
    engine: &dyn NativeEngine,
    conn_addr: usize,
) -> Result<ConnectionCapabilities> {
    let record = with_error_check(engine, |err| unsafe {
        engine.get_connection_metadata(conn_addr, err)
    })?;
    if record.is_null() {
        return Err(BridgeError::Marshal(
            "engine returned no connection metadata".to_string(),
        ));
    }
    let _guard = ConnMetaGuard { engine, record };
    // Safety: guarded record, deleted after the copy below.
    let raw = unsafe { &*record };
    let field = |ptr, what: &str| unsafe {
        codec::decode(ptr)
            .ok_or_else(|| BridgeError::Marshal(format!("connection metadata missing {}", what)))
    };
    Ok(ConnectionCapabilities {
        dbms_name: field(raw.dbms_name, "dbms name")?,
        dbms_version: field(raw.dbms_version, "dbms version")?,
        driver_name: field(raw.driver_name, "driver name")?,
        driver_version: field(raw.driver_version, "driver version")?,
        max_concurrent_statements: raw.max_concurrent_statements,
        default_isolation: IsolationLevel::from_code(raw.default_isolation),
        supports_transactions: byte_flag(raw.supports_transactions),
        supports_batch: byte_flag(raw.supports_batch),
        read_only: byte_flag(raw.read_only),
    })
}
