//! The flat call surface of the native connectivity engine.
//!
//! Handles cross this boundary as raw addresses (`usize`); the address `0`
//! is the null sentinel. Addresses never leave the bridge layer - client
//! code only ever sees the typed wrappers in `crate::engine`.

use crate::native::types::{
    RawColumnMeta, RawConnectionMeta, RawDataSourceRecord, RawDriverRecord, RawErrorInfo,
};

/// Distinguished return value of `read_stream` signalling end-of-stream.
pub const STREAM_END: i64 = -1;

/// Abstraction over the engine's exported functions.
///
/// Implemented by [`LibEngine`](crate::native::LibEngine) for the real
/// dynamically loaded library and by the instrumented
/// [`FakeEngine`](crate::native::FakeEngine) in tests.
///
/// # Safety
///
/// Implementors must uphold the engine ABI contract: out-parameters are
/// written before returning, returned addresses stay valid until the
/// matching release call, and `clear_error` frees exactly the strings the
/// engine planted in the record. Callers must pass only addresses obtained
/// from this same engine instance and must not use an address after its
/// release call.
pub unsafe trait NativeEngine: Send + Sync {
    // ── lifecycle ──

    unsafe fn open_connection(
        &self,
        conn_str: *const u16,
        login_timeout_ms: u32,
        err: *mut RawErrorInfo,
    ) -> usize;
    unsafe fn disconnect(&self, conn: usize, err: *mut RawErrorInfo);
    unsafe fn prepare(&self, conn: usize, sql: *const u16, err: *mut RawErrorInfo) -> usize;
    unsafe fn bind_text(
        &self,
        stmt: usize,
        index: u16,
        value: *const u16,
        err: *mut RawErrorInfo,
    );
    /// Returns a result-cursor address, or 0 when the statement produced no
    /// result set (e.g. an update).
    unsafe fn execute(&self, stmt: usize, err: *mut RawErrorInfo) -> usize;
    unsafe fn row_count(&self, stmt: usize, err: *mut RawErrorInfo) -> i64;
    /// Issued from a different thread while `execute` blocks.
    unsafe fn cancel(&self, stmt: usize, err: *mut RawErrorInfo);
    unsafe fn close_statement(&self, stmt: usize, err: *mut RawErrorInfo);

    // ── cursor ──

    /// Returns 1 when positioned on a new row, 0 at end of data.
    unsafe fn fetch_row(&self, cursor: usize, err: *mut RawErrorInfo) -> u8;
    /// Returns an engine-owned wide string for the 1-based column, or null
    /// for SQL NULL. Freed by the caller through `free`.
    unsafe fn get_cell_text(
        &self,
        cursor: usize,
        column: u16,
        err: *mut RawErrorInfo,
    ) -> *mut u16;
    unsafe fn close_result(&self, cursor: usize, err: *mut RawErrorInfo);

    // ── transactions ──

    unsafe fn set_isolation(&self, conn: usize, level: i32, err: *mut RawErrorInfo);
    unsafe fn begin_transaction(&self, conn: usize, err: *mut RawErrorInfo);
    unsafe fn commit(&self, conn: usize, err: *mut RawErrorInfo);
    unsafe fn rollback(&self, conn: usize, err: *mut RawErrorInfo);

    // ── enumeration ──

    unsafe fn list_drivers(
        &self,
        count_out: *mut u32,
        err: *mut RawErrorInfo,
    ) -> *mut RawDriverRecord;
    unsafe fn delete_driver_array(&self, array: *mut RawDriverRecord, count: u32);
    unsafe fn list_data_sources(
        &self,
        count_out: *mut u32,
        err: *mut RawErrorInfo,
    ) -> *mut RawDataSourceRecord;
    unsafe fn delete_data_source_array(&self, array: *mut RawDataSourceRecord, count: u32);

    // ── metadata ──

    unsafe fn get_result_metadata(
        &self,
        cursor: usize,
        count_out: *mut u32,
        err: *mut RawErrorInfo,
    ) -> *mut RawColumnMeta;
    unsafe fn delete_column_metadata(&self, array: *mut RawColumnMeta, count: u32);
    unsafe fn get_connection_metadata(
        &self,
        conn: usize,
        err: *mut RawErrorInfo,
    ) -> *mut RawConnectionMeta;
    unsafe fn delete_connection_metadata(&self, meta: *mut RawConnectionMeta);

    // ── streams ──

    unsafe fn open_stream(&self, cursor: usize, column: u16, err: *mut RawErrorInfo) -> usize;
    /// Returns bytes read (>= 0) or [`STREAM_END`].
    unsafe fn read_stream(
        &self,
        stream: usize,
        buf: *mut u8,
        len: usize,
        err: *mut RawErrorInfo,
    ) -> i64;
    unsafe fn close_stream(&self, stream: usize, err: *mut RawErrorInfo);

    // ── raw memory ──

    /// Frees the error record's message strings and nulls them. Must be a
    /// no-op on an already-clear record.
    unsafe fn clear_error(&self, err: *mut RawErrorInfo);
    /// Frees a loose heap buffer the engine handed back (e.g. a cell
    /// string). Not for structured records, which have matching deletes.
    unsafe fn free(&self, addr: usize);
}
