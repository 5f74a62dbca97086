//! Dynamically loaded production backend.
//!
//! The engine ships as a shared library (`libodbcengine.so` / `.dylib` /
//! `odbcengine.dll`); symbols are resolved once at load time and copied into
//! a plain function-pointer table so calls pay no lookup cost.

use crate::error::{BridgeError, Result};
use crate::native::api::NativeEngine;
use crate::native::types::{
    RawColumnMeta, RawConnectionMeta, RawDataSourceRecord, RawDriverRecord, RawErrorInfo,
};
use libloading::Library;
use std::path::Path;

type OpenConnectionFn = unsafe extern "C" fn(*const u16, u32, *mut RawErrorInfo) -> usize;
type DisconnectFn = unsafe extern "C" fn(usize, *mut RawErrorInfo);
type PrepareFn = unsafe extern "C" fn(usize, *const u16, *mut RawErrorInfo) -> usize;
type BindTextFn = unsafe extern "C" fn(usize, u16, *const u16, *mut RawErrorInfo);
type ExecuteFn = unsafe extern "C" fn(usize, *mut RawErrorInfo) -> usize;
type RowCountFn = unsafe extern "C" fn(usize, *mut RawErrorInfo) -> i64;
type CancelFn = unsafe extern "C" fn(usize, *mut RawErrorInfo);
type CloseStatementFn = unsafe extern "C" fn(usize, *mut RawErrorInfo);
type FetchRowFn = unsafe extern "C" fn(usize, *mut RawErrorInfo) -> u8;
type GetCellTextFn = unsafe extern "C" fn(usize, u16, *mut RawErrorInfo) -> *mut u16;
type CloseResultFn = unsafe extern "C" fn(usize, *mut RawErrorInfo);
type SetIsolationFn = unsafe extern "C" fn(usize, i32, *mut RawErrorInfo);
type TxnFn = unsafe extern "C" fn(usize, *mut RawErrorInfo);
type ListDriversFn = unsafe extern "C" fn(*mut u32, *mut RawErrorInfo) -> *mut RawDriverRecord;
type DeleteDriverArrayFn = unsafe extern "C" fn(*mut RawDriverRecord, u32);
type ListDataSourcesFn =
    unsafe extern "C" fn(*mut u32, *mut RawErrorInfo) -> *mut RawDataSourceRecord;
type DeleteDataSourceArrayFn = unsafe extern "C" fn(*mut RawDataSourceRecord, u32);
type GetResultMetadataFn =
    unsafe extern "C" fn(usize, *mut u32, *mut RawErrorInfo) -> *mut RawColumnMeta;
type DeleteColumnMetadataFn = unsafe extern "C" fn(*mut RawColumnMeta, u32);
type GetConnectionMetadataFn =
    unsafe extern "C" fn(usize, *mut RawErrorInfo) -> *mut RawConnectionMeta;
type DeleteConnectionMetadataFn = unsafe extern "C" fn(*mut RawConnectionMeta);
type OpenStreamFn = unsafe extern "C" fn(usize, u16, *mut RawErrorInfo) -> usize;
type ReadStreamFn = unsafe extern "C" fn(usize, *mut u8, usize, *mut RawErrorInfo) -> i64;
type CloseStreamFn = unsafe extern "C" fn(usize, *mut RawErrorInfo);
type ClearErrorFn = unsafe extern "C" fn(*mut RawErrorInfo);
type FreeFn = unsafe extern "C" fn(usize);

struct EngineFns {
    open_connection: OpenConnectionFn,
    disconnect: DisconnectFn,
    prepare: PrepareFn,
    bind_text: BindTextFn,
    execute: ExecuteFn,
    row_count: RowCountFn,
    cancel: CancelFn,
    close_statement: CloseStatementFn,
    fetch_row: FetchRowFn,
    get_cell_text: GetCellTextFn,
    close_result: CloseResultFn,
    set_isolation: SetIsolationFn,
    begin_transaction: TxnFn,
    commit: TxnFn,
    rollback: TxnFn,
    list_drivers: ListDriversFn,
    delete_driver_array: DeleteDriverArrayFn,
    list_data_sources: ListDataSourcesFn,
    delete_data_source_array: DeleteDataSourceArrayFn,
    get_result_metadata: GetResultMetadataFn,
    delete_column_metadata: DeleteColumnMetadataFn,
    get_connection_metadata: GetConnectionMetadataFn,
    delete_connection_metadata: DeleteConnectionMetadataFn,
    open_stream: OpenStreamFn,
    read_stream: ReadStreamFn,
    close_stream: CloseStreamFn,
    clear_error: ClearErrorFn,
    free: FreeFn,
}

/// Production backend over the dynamically loaded engine library.
pub struct LibEngine {
    fns: EngineFns,
    // Keeps the library mapped for as long as the function pointers live.
    _lib: Library,
}

unsafe fn sym<T: Copy>(lib: &Library, name: &[u8]) -> Result<T> {
    let symbol = lib.get::<T>(name).map_err(|e| {
        BridgeError::LibraryLoad(format!(
            "missing symbol {}: {}",
            String::from_utf8_lossy(&name[..name.len() - 1]),
            e
        ))
    })?;
    Ok(*symbol)
}

impl LibEngine {
    /// Loads the engine library and resolves every symbol up front, so a
    /// truncated or mismatched library fails at load time instead of
    /// mid-operation.
    pub fn load(path: &Path) -> Result<Self> {
        // Safety: the engine library's initializers are limited to
        // registering its allocator; the symbol table is validated below.
        let lib = unsafe { Library::new(path) }
            .map_err(|e| BridgeError::LibraryLoad(format!("{}: {}", path.display(), e)))?;

        let fns = unsafe {
            EngineFns {
                open_connection: sym(&lib, b"odbc_connect\0")?,
                disconnect: sym(&lib, b"odbc_disconnect\0")?,
                prepare: sym(&lib, b"odbc_prepare\0")?,
                bind_text: sym(&lib, b"odbc_bind_text\0")?,
                execute: sym(&lib, b"odbc_execute\0")?,
                row_count: sym(&lib, b"odbc_row_count\0")?,
                cancel: sym(&lib, b"odbc_cancel\0")?,
                close_statement: sym(&lib, b"odbc_close_statement\0")?,
                fetch_row: sym(&lib, b"odbc_fetch_row\0")?,
                get_cell_text: sym(&lib, b"odbc_get_cell_text\0")?,
                close_result: sym(&lib, b"odbc_close_result\0")?,
                set_isolation: sym(&lib, b"odbc_set_isolation\0")?,
                begin_transaction: sym(&lib, b"odbc_begin_transaction\0")?,
                commit: sym(&lib, b"odbc_commit\0")?,
                rollback: sym(&lib, b"odbc_rollback\0")?,
                list_drivers: sym(&lib, b"odbc_list_drivers\0")?,
                delete_driver_array: sym(&lib, b"odbc_delete_driver_array\0")?,
                list_data_sources: sym(&lib, b"odbc_list_datasources\0")?,
                delete_data_source_array: sym(&lib, b"odbc_delete_datasource_array\0")?,
                get_result_metadata: sym(&lib, b"odbc_get_result_metadata\0")?,
                delete_column_metadata: sym(&lib, b"odbc_delete_column_metadata\0")?,
                get_connection_metadata: sym(&lib, b"odbc_get_connection_metadata\0")?,
                delete_connection_metadata: sym(&lib, b"odbc_delete_connection_metadata\0")?,
                open_stream: sym(&lib, b"odbc_open_stream\0")?,
                read_stream: sym(&lib, b"odbc_read_stream\0")?,
                close_stream: sym(&lib, b"odbc_close_stream\0")?,
                clear_error: sym(&lib, b"odbc_clear_error\0")?,
                free: sym(&lib, b"odbc_free\0")?,
            }
        };

        log::debug!("loaded native engine from {}", path.display());
        Ok(Self { fns, _lib: lib })
    }
}

unsafe impl NativeEngine for LibEngine {
    unsafe fn open_connection(
        &self,
        conn_str: *const u16,
        login_timeout_ms: u32,
        err: *mut RawErrorInfo,
    ) -> usize {
        (self.fns.open_connection)(conn_str, login_timeout_ms, err)
    }

    unsafe fn disconnect(&self, conn: usize, err: *mut RawErrorInfo) {
        (self.fns.disconnect)(conn, err)
    }

    unsafe fn prepare(&self, conn: usize, sql: *const u16, err: *mut RawErrorInfo) -> usize {
        (self.fns.prepare)(conn, sql, err)
    }

    unsafe fn bind_text(&self, stmt: usize, index: u16, value: *const u16, err: *mut RawErrorInfo) {
        (self.fns.bind_text)(stmt, index, value, err)
    }

    unsafe fn execute(&self, stmt: usize, err: *mut RawErrorInfo) -> usize {
        (self.fns.execute)(stmt, err)
    }

    unsafe fn row_count(&self, stmt: usize, err: *mut RawErrorInfo) -> i64 {
        (self.fns.row_count)(stmt, err)
    }

    unsafe fn cancel(&self, stmt: usize, err: *mut RawErrorInfo) {
        (self.fns.cancel)(stmt, err)
    }

    unsafe fn close_statement(&self, stmt: usize, err: *mut RawErrorInfo) {
        (self.fns.close_statement)(stmt, err)
    }

    unsafe fn fetch_row(&self, cursor: usize, err: *mut RawErrorInfo) -> u8 {
        (self.fns.fetch_row)(cursor, err)
    }

    unsafe fn get_cell_text(&self, cursor: usize, column: u16, err: *mut RawErrorInfo) -> *mut u16 {
        (self.fns.get_cell_text)(cursor, column, err)
    }

    unsafe fn close_result(&self, cursor: usize, err: *mut RawErrorInfo) {
        (self.fns.close_result)(cursor, err)
    }

    unsafe fn set_isolation(&self, conn: usize, level: i32, err: *mut RawErrorInfo) {
        (self.fns.set_isolation)(conn, level, err)
    }

    unsafe fn begin_transaction(&self, conn: usize, err: *mut RawErrorInfo) {
        (self.fns.begin_transaction)(conn, err)
    }

    unsafe fn commit(&self, conn: usize, err: *mut RawErrorInfo) {
        (self.fns.commit)(conn, err)
    }

    unsafe fn rollback(&self, conn: usize, err: *mut RawErrorInfo) {
        (self.fns.rollback)(conn, err)
    }

    unsafe fn list_drivers(
        &self,
        count_out: *mut u32,
        err: *mut RawErrorInfo,
    ) -> *mut RawDriverRecord {
        (self.fns.list_drivers)(count_out, err)
    }

    unsafe fn delete_driver_array(&self, array: *mut RawDriverRecord, count: u32) {
        (self.fns.delete_driver_array)(array, count)
    }

    unsafe fn list_data_sources(
        &self,
        count_out: *mut u32,
        err: *mut RawErrorInfo,
    ) -> *mut RawDataSourceRecord {
        (self.fns.list_data_sources)(count_out, err)
    }

    unsafe fn delete_data_source_array(&self, array: *mut RawDataSourceRecord, count: u32) {
        (self.fns.delete_data_source_array)(array, count)
    }

    unsafe fn get_result_metadata(
        &self,
        cursor: usize,
        count_out: *mut u32,
        err: *mut RawErrorInfo,
    ) -> *mut RawColumnMeta {
        (self.fns.get_result_metadata)(cursor, count_out, err)
    }

    unsafe fn delete_column_metadata(&self, array: *mut RawColumnMeta, count: u32) {
        (self.fns.delete_column_metadata)(array, count)
    }

    unsafe fn get_connection_metadata(
        &self,
        conn: usize,
        err: *mut RawErrorInfo,
    ) -> *mut RawConnectionMeta {
        (self.fns.get_connection_metadata)(conn, err)
    }

    unsafe fn delete_connection_metadata(&self, meta: *mut RawConnectionMeta) {
        (self.fns.delete_connection_metadata)(meta)
    }

    unsafe fn open_stream(&self, cursor: usize, column: u16, err: *mut RawErrorInfo) -> usize {
        (self.fns.open_stream)(cursor, column, err)
    }

    unsafe fn read_stream(
        &self,
        stream: usize,
        buf: *mut u8,
        len: usize,
        err: *mut RawErrorInfo,
    ) -> i64 {
        (self.fns.read_stream)(stream, buf, len, err)
    }

    unsafe fn close_stream(&self, stream: usize, err: *mut RawErrorInfo) {
        (self.fns.close_stream)(stream, err)
    }

    unsafe fn clear_error(&self, err: *mut RawErrorInfo) {
        (self.fns.clear_error)(err)
    }

    unsafe fn free(&self, addr: usize) {
        (self.fns.free)(addr)
    }
}
