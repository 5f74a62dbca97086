//! Fixed-layout records exchanged with the native engine.
//!
//! Conventions, applied uniformly across every record:
//! - all strings are engine-owned UTF-16LE wide strings with a NUL terminator;
//! - boolean flags are single bytes, nonzero == true;
//! - the nullability tri-state is a small integer: 0 = not nullable,
//!   1 = nullable, 2 = unknown.

/// Out-parameter error record passed as the trailing argument of every
/// native call.
///
/// `code == 0` means success. `message` and `sql_state` are allocated by the
/// engine on demand (possibly even on success, e.g. warnings) and must be
/// released through `clear_error` after every call, on every path.
#[repr(C)]
#[derive(Debug)]
pub struct RawErrorInfo {
    pub code: i32,
    pub category: i32,
    pub message: *mut u16,
    pub sql_state: *mut u16,
}

impl RawErrorInfo {
    pub fn empty() -> Self {
        Self {
            code: 0,
            category: 0,
            message: std::ptr::null_mut(),
            sql_state: std::ptr::null_mut(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// One entry of the driver enumeration array. `attributes` is a sub-array
/// of `attribute_count` records, released together with the outer array by
/// `delete_driver_array`.
#[repr(C)]
#[derive(Debug)]
pub struct RawDriverRecord {
    pub name: *mut u16,
    pub attribute_count: u32,
    pub attributes: *mut RawDriverAttribute,
}

#[repr(C)]
#[derive(Debug)]
pub struct RawDriverAttribute {
    pub key: *mut u16,
    pub value: *mut u16,
}

/// One entry of the data-source enumeration array.
#[repr(C)]
#[derive(Debug)]
pub struct RawDataSourceRecord {
    pub name: *mut u16,
    pub description: *mut u16,
    pub driver: *mut u16,
}

/// Per-column metadata record for a result cursor.
#[repr(C)]
#[derive(Debug)]
pub struct RawColumnMeta {
    pub name: *mut u16,
    pub type_name: *mut u16,
    pub data_type: i32,
    pub column_size: i64,
    pub decimal_digits: i32,
    /// Tri-state: 0 / 1 / 2.
    pub nullable: i16,
    /// Byte-as-boolean flags.
    pub is_auto_increment: u8,
    pub is_case_sensitive: u8,
    pub is_read_only: u8,
    pub is_searchable: u8,
}

/// Connection capability record.
#[repr(C)]
#[derive(Debug)]
pub struct RawConnectionMeta {
    pub dbms_name: *mut u16,
    pub dbms_version: *mut u16,
    pub driver_name: *mut u16,
    pub driver_version: *mut u16,
    pub max_concurrent_statements: i32,
    pub default_isolation: i32,
    /// Byte-as-boolean flags.
    pub supports_transactions: u8,
    pub supports_batch: u8,
    pub read_only: u8,
}
