//! Instrumented in-process engine for tests.
//!
//! Hands out real heap allocations for strings and record arrays so the
//! codec and the pointer-walking decoders run against genuine memory, and
//! counts every allocation, free, release, and bulk delete per address so
//! tests can assert the exactly-once properties.

use crate::native::api::{NativeEngine, STREAM_END};
use crate::native::types::{
    RawColumnMeta, RawConnectionMeta, RawDataSourceRecord, RawDriverAttribute, RawDriverRecord,
    RawErrorInfo,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// A scripted driver entry. `name: None` produces a null name pointer,
/// which the bridge must reject as a marshal error.
#[derive(Debug, Clone)]
pub struct FakeDriver {
    pub name: Option<String>,
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct FakeDataSource {
    pub name: String,
    pub description: String,
    pub driver: String,
}

#[derive(Debug, Clone)]
pub struct FakeColumn {
    pub name: String,
    pub type_name: String,
    pub data_type: i32,
    pub column_size: i64,
    pub decimal_digits: i32,
    pub nullable: i16,
    pub is_auto_increment: bool,
    pub is_case_sensitive: bool,
    pub is_read_only: bool,
    pub is_searchable: bool,
}

#[derive(Debug, Clone)]
pub struct FakeConnectionMeta {
    pub dbms_name: String,
    pub dbms_version: String,
    pub driver_name: String,
    pub driver_version: String,
    pub max_concurrent_statements: i32,
    pub default_isolation: i32,
    pub supports_transactions: bool,
    pub supports_batch: bool,
    pub read_only: bool,
}

impl Default for FakeConnectionMeta {
    fn default() -> Self {
        Self {
            dbms_name: "FakeDB".to_string(),
            dbms_version: "1.0".to_string(),
            driver_name: "fake-driver".to_string(),
            driver_version: "0.1".to_string(),
            max_concurrent_statements: 8,
            default_isolation: 1,
            supports_transactions: true,
            supports_batch: false,
            read_only: false,
        }
    }
}

#[derive(Debug, Clone)]
struct FakeFailure {
    code: i32,
    category: i32,
    sql_state: String,
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FakeHandleKind {
    Connection,
    Statement,
    Cursor,
    Stream,
}

impl FakeHandleKind {
    fn name(self) -> &'static str {
        match self {
            FakeHandleKind::Connection => "connection",
            FakeHandleKind::Statement => "statement",
            FakeHandleKind::Cursor => "cursor",
            FakeHandleKind::Stream => "stream",
        }
    }
}

enum Alloc {
    Wide { len: usize, cap: usize },
    DriverArray { len: usize, cap: usize },
    AttrArray { len: usize, cap: usize },
    DataSourceArray { len: usize, cap: usize },
    ColumnMetaArray { len: usize, cap: usize },
    ConnMeta,
}

struct CursorState {
    rows: Vec<Vec<Option<String>>>,
    /// 0 = before first row; n = positioned on row n.
    position: usize,
}

struct StreamState {
    data: Vec<u8>,
    offset: usize,
}

#[derive(Default)]
struct Counters {
    release_counts: HashMap<usize, u32>,
    free_counts: HashMap<usize, u32>,
    double_releases: u32,
    unknown_frees: u32,
    clear_error_calls: u64,
    error_strings_allocated: u64,
    error_strings_freed: u64,
    driver_array_deletes: Vec<(usize, u32)>,
    datasource_array_deletes: Vec<(usize, u32)>,
    column_meta_deletes: Vec<(usize, u32)>,
    connection_meta_deletes: u32,
    opened: Vec<(usize, &'static str)>,
}

struct FakeState {
    next_addr: usize,
    drivers: Vec<FakeDriver>,
    data_sources: Vec<FakeDataSource>,
    results: VecDeque<Option<Vec<Vec<Option<String>>>>>,
    stream_data: Vec<u8>,
    columns: Vec<FakeColumn>,
    connection_meta: FakeConnectionMeta,
    row_count: i64,
    failures: HashMap<String, FakeFailure>,
    plant_success_message: bool,
    handles: HashMap<usize, FakeHandleKind>,
    cursors: HashMap<usize, CursorState>,
    streams: HashMap<usize, StreamState>,
    allocs: HashMap<usize, Alloc>,
    counters: Counters,
}

impl FakeState {
    fn new() -> Self {
        Self {
            next_addr: 0x1000,
            drivers: Vec::new(),
            data_sources: Vec::new(),
            results: VecDeque::new(),
            stream_data: Vec::new(),
            columns: Vec::new(),
            connection_meta: FakeConnectionMeta::default(),
            row_count: 0,
            failures: HashMap::new(),
            plant_success_message: false,
            handles: HashMap::new(),
            cursors: HashMap::new(),
            streams: HashMap::new(),
            allocs: HashMap::new(),
            counters: Counters::default(),
        }
    }

    fn new_handle(&mut self, kind: FakeHandleKind) -> usize {
        let addr = self.next_addr;
        self.next_addr += 0x1000;
        self.handles.insert(addr, kind);
        self.counters.opened.push((addr, kind.name()));
        addr
    }

    fn alloc_wide(&mut self, s: &str) -> *mut u16 {
        let mut units: Vec<u16> = s.encode_utf16().collect();
        units.push(0);
        let (ptr, len, cap) = (units.as_mut_ptr(), units.len(), units.capacity());
        std::mem::forget(units);
        self.allocs.insert(ptr as usize, Alloc::Wide { len, cap });
        ptr
    }

    fn alloc_opt_wide(&mut self, s: Option<&str>) -> *mut u16 {
        match s {
            Some(s) => self.alloc_wide(s),
            None => std::ptr::null_mut(),
        }
    }

    fn alloc_array<T>(&mut self, mut v: Vec<T>, kind: fn(usize, usize) -> Alloc) -> *mut T {
        if v.is_empty() {
            return std::ptr::null_mut();
        }
        let (ptr, len, cap) = (v.as_mut_ptr(), v.len(), v.capacity());
        std::mem::forget(v);
        self.allocs.insert(ptr as usize, kind(len, cap));
        ptr
    }

    /// Reclaims a wide string previously handed out by `alloc_wide`.
    /// Returns false on unknown or already-freed addresses.
    fn free_wide(&mut self, addr: usize) -> bool {
        match self.allocs.remove(&addr) {
            Some(Alloc::Wide { len, cap }) => {
                *self.counters.free_counts.entry(addr).or_insert(0) += 1;
                // Safety: we created this buffer in alloc_wide with exactly
                // this length and capacity.
                unsafe {
                    drop(Vec::from_raw_parts(addr as *mut u16, len, cap));
                }
                true
            }
            Some(other) => {
                // Wrong deallocator for a structured record; put it back and
                // count the misuse.
                self.allocs.insert(addr, other);
                self.counters.unknown_frees += 1;
                false
            }
            None => {
                *self.counters.free_counts.entry(addr).or_insert(0) += 1;
                self.counters.unknown_frees += 1;
                false
            }
        }
    }

    fn release_handle(&mut self, addr: usize, kind: FakeHandleKind) {
        *self.counters.release_counts.entry(addr).or_insert(0) += 1;
        match self.handles.get(&addr) {
            Some(k) if *k == kind => {
                self.handles.remove(&addr);
                match kind {
                    FakeHandleKind::Cursor => {
                        self.cursors.remove(&addr);
                    }
                    FakeHandleKind::Stream => {
                        self.streams.remove(&addr);
                    }
                    _ => {}
                }
            }
            _ => {
                self.counters.double_releases += 1;
            }
        }
    }

    fn fill_error(&mut self, err: *mut RawErrorInfo, failure: &FakeFailure) {
        let message = self.alloc_wide(&failure.message);
        let sql_state = self.alloc_wide(&failure.sql_state);
        self.counters.error_strings_allocated += 2;
        // Safety: caller passes a valid record per the engine contract.
        unsafe {
            (*err).code = failure.code;
            (*err).category = failure.category;
            (*err).message = message;
            (*err).sql_state = sql_state;
        }
    }

    fn fill_success(&mut self, err: *mut RawErrorInfo) {
        let message = if self.plant_success_message {
            self.counters.error_strings_allocated += 1;
            self.alloc_wide("operation completed with info")
        } else {
            std::ptr::null_mut()
        };
        unsafe {
            (*err).code = 0;
            (*err).category = 0;
            (*err).message = message;
            (*err).sql_state = std::ptr::null_mut();
        }
    }

    /// Applies a scripted failure for `op` if present. Returns true when the
    /// call should fail.
    fn apply_outcome(&mut self, op: &str, err: *mut RawErrorInfo) -> bool {
        if let Some(failure) = self.failures.get(op).cloned() {
            self.fill_error(err, &failure);
            true
        } else {
            self.fill_success(err);
            false
        }
    }

    fn misuse(&mut self, err: *mut RawErrorInfo, message: &str) {
        let failure = FakeFailure {
            code: 100,
            category: 1,
            sql_state: "HY000".to_string(),
            message: message.to_string(),
        };
        self.fill_error(err, &failure);
    }
}

/// Instrumented fake native engine.
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake engine state poisoned")
    }

    // ── scripting ──

    pub fn add_driver(&self, name: &str, attributes: &[(&str, &str)]) {
        self.lock().drivers.push(FakeDriver {
            name: Some(name.to_string()),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    pub fn add_driver_with_null_name(&self) {
        self.lock().drivers.push(FakeDriver {
            name: None,
            attributes: Vec::new(),
        });
    }

    pub fn add_data_source(&self, name: &str, description: &str, driver: &str) {
        self.lock().data_sources.push(FakeDataSource {
            name: name.to_string(),
            description: description.to_string(),
            driver: driver.to_string(),
        });
    }

    /// Queues a result set for the next `execute`. Each row is a vector of
    /// cells, `None` meaning SQL NULL.
    pub fn push_result(&self, rows: Vec<Vec<Option<String>>>) {
        self.lock().results.push_back(Some(rows));
    }

    /// Queues a no-result outcome (e.g. an update) for the next `execute`.
    pub fn push_no_result(&self) {
        self.lock().results.push_back(None);
    }

    pub fn set_stream_data(&self, data: Vec<u8>) {
        self.lock().stream_data = data;
    }

    pub fn set_columns(&self, columns: Vec<FakeColumn>) {
        self.lock().columns = columns;
    }

    pub fn set_connection_meta(&self, meta: FakeConnectionMeta) {
        self.lock().connection_meta = meta;
    }

    pub fn set_row_count(&self, n: i64) {
        self.lock().row_count = n;
    }

    /// Makes every subsequent call of `op` fail with the given status until
    /// `clear_failure` is called.
    pub fn fail_operation(&self, op: &str, code: i32, category: i32, sql_state: &str, message: &str) {
        self.lock().failures.insert(
            op.to_string(),
            FakeFailure {
                code,
                category,
                sql_state: sql_state.to_string(),
                message: message.to_string(),
            },
        );
    }

    pub fn clear_failure(&self, op: &str) {
        self.lock().failures.remove(op);
    }

    /// When set, successful calls also plant an informational message in the
    /// error record, which the bridge must still free.
    pub fn plant_success_messages(&self, enabled: bool) {
        self.lock().plant_success_message = enabled;
    }

    // ── counters ──

    /// Every handle address ever created, in creation order, with its kind.
    pub fn opened_addresses(&self) -> Vec<(usize, &'static str)> {
        self.lock().counters.opened.clone()
    }

    /// How many times a native release (disconnect/close_*) ran for `addr`.
    pub fn release_count(&self, addr: usize) -> u32 {
        self.lock()
            .counters
            .release_counts
            .get(&addr)
            .copied()
            .unwrap_or(0)
    }

    /// How many times `free` (or the wide-string reclaim inside
    /// `clear_error`) ran for `addr`.
    pub fn free_count(&self, addr: usize) -> u32 {
        self.lock()
            .counters
            .free_counts
            .get(&addr)
            .copied()
            .unwrap_or(0)
    }

    /// Releases that hit an address no longer live (double-release attempts
    /// observed engine-side).
    pub fn double_release_count(&self) -> u32 {
        self.lock().counters.double_releases
    }

    /// Frees for unknown addresses or with the wrong deallocator.
    pub fn unknown_free_count(&self) -> u32 {
        self.lock().counters.unknown_frees
    }

    pub fn clear_error_calls(&self) -> u64 {
        self.lock().counters.clear_error_calls
    }

    pub fn error_strings_allocated(&self) -> u64 {
        self.lock().counters.error_strings_allocated
    }

    pub fn error_strings_freed(&self) -> u64 {
        self.lock().counters.error_strings_freed
    }

    /// Outstanding heap allocations (strings, arrays, records). Zero once
    /// every engine-owned buffer was returned.
    pub fn live_allocations(&self) -> usize {
        self.lock().allocs.len()
    }

    pub fn live_handles(&self) -> usize {
        self.lock().handles.len()
    }

    /// (address, count) pairs passed to `delete_driver_array`.
    pub fn driver_array_deletes(&self) -> Vec<(usize, u32)> {
        self.lock().counters.driver_array_deletes.clone()
    }

    pub fn datasource_array_deletes(&self) -> Vec<(usize, u32)> {
        self.lock().counters.datasource_array_deletes.clone()
    }

    pub fn column_meta_deletes(&self) -> Vec<(usize, u32)> {
        self.lock().counters.column_meta_deletes.clone()
    }

    pub fn connection_meta_deletes(&self) -> u32 {
        self.lock().counters.connection_meta_deletes
    }
}

unsafe impl NativeEngine for FakeEngine {
    unsafe fn open_connection(
        &self,
        conn_str: *const u16,
        _login_timeout_ms: u32,
        err: *mut RawErrorInfo,
    ) -> usize {
        let mut state = self.lock();
        if conn_str.is_null() {
            state.misuse(err, "null connection string");
            return 0;
        }
        if state.apply_outcome("connect", err) {
            return 0;
        }
        state.new_handle(FakeHandleKind::Connection)
    }

    unsafe fn disconnect(&self, conn: usize, err: *mut RawErrorInfo) {
        let mut state = self.lock();
        state.apply_outcome("disconnect", err);
        state.release_handle(conn, FakeHandleKind::Connection);
    }

    unsafe fn prepare(&self, conn: usize, sql: *const u16, err: *mut RawErrorInfo) -> usize {
        let mut state = self.lock();
        if sql.is_null() {
            state.misuse(err, "null statement text");
            return 0;
        }
        if state.handles.get(&conn) != Some(&FakeHandleKind::Connection) {
            state.misuse(err, "prepare on dead connection");
            return 0;
        }
        if state.apply_outcome("prepare", err) {
            return 0;
        }
        state.new_handle(FakeHandleKind::Statement)
    }

    unsafe fn bind_text(
        &self,
        stmt: usize,
        _index: u16,
        _value: *const u16,
        err: *mut RawErrorInfo,
    ) {
        let mut state = self.lock();
        if state.handles.get(&stmt) != Some(&FakeHandleKind::Statement) {
            state.misuse(err, "bind on dead statement");
            return;
        }
        state.apply_outcome("bind_text", err);
    }

    unsafe fn execute(&self, stmt: usize, err: *mut RawErrorInfo) -> usize {
        let mut state = self.lock();
        if state.handles.get(&stmt) != Some(&FakeHandleKind::Statement) {
            state.misuse(err, "execute on dead statement");
            return 0;
        }
        if state.apply_outcome("execute", err) {
            return 0;
        }
        match state.results.pop_front() {
            Some(Some(rows)) => {
                let cursor = state.new_handle(FakeHandleKind::Cursor);
                state.cursors.insert(cursor, CursorState { rows, position: 0 });
                cursor
            }
            Some(None) | None => 0,
        }
    }

    unsafe fn row_count(&self, stmt: usize, err: *mut RawErrorInfo) -> i64 {
        let mut state = self.lock();
        if state.handles.get(&stmt) != Some(&FakeHandleKind::Statement) {
            state.misuse(err, "row_count on dead statement");
            return 0;
        }
        state.apply_outcome("row_count", err);
        state.row_count
    }

    unsafe fn cancel(&self, stmt: usize, err: *mut RawErrorInfo) {
        let mut state = self.lock();
        if state.handles.get(&stmt) != Some(&FakeHandleKind::Statement) {
            state.misuse(err, "cancel on dead statement");
            return;
        }
        state.apply_outcome("cancel", err);
    }

    unsafe fn close_statement(&self, stmt: usize, err: *mut RawErrorInfo) {
        let mut state = self.lock();
        state.apply_outcome("close_statement", err);
        state.release_handle(stmt, FakeHandleKind::Statement);
    }

    unsafe fn fetch_row(&self, cursor: usize, err: *mut RawErrorInfo) -> u8 {
        let mut state = self.lock();
        if state.apply_outcome("fetch_row", err) {
            return 0;
        }
        match state.cursors.get_mut(&cursor) {
            Some(c) => {
                if c.position < c.rows.len() {
                    c.position += 1;
                    1
                } else {
                    0
                }
            }
            None => {
                state.misuse(err, "fetch on dead cursor");
                0
            }
        }
    }

    unsafe fn get_cell_text(
        &self,
        cursor: usize,
        column: u16,
        err: *mut RawErrorInfo,
    ) -> *mut u16 {
        let mut state = self.lock();
        if state.apply_outcome("get_cell_text", err) {
            return std::ptr::null_mut();
        }
        let cell = match state.cursors.get(&cursor) {
            Some(c) if c.position > 0 && c.position <= c.rows.len() => {
                let row = &c.rows[c.position - 1];
                match row.get(column as usize - 1) {
                    Some(cell) => cell.clone(),
                    None => {
                        state.misuse(err, "column index out of range");
                        return std::ptr::null_mut();
                    }
                }
            }
            _ => {
                state.misuse(err, "cell read without a fetched row");
                return std::ptr::null_mut();
            }
        };
        state.alloc_opt_wide(cell.as_deref())
    }

    unsafe fn close_result(&self, cursor: usize, err: *mut RawErrorInfo) {
        let mut state = self.lock();
        state.apply_outcome("close_result", err);
        state.release_handle(cursor, FakeHandleKind::Cursor);
    }

    unsafe fn set_isolation(&self, conn: usize, _level: i32, err: *mut RawErrorInfo) {
        let mut state = self.lock();
        if state.handles.get(&conn) != Some(&FakeHandleKind::Connection) {
            state.misuse(err, "set_isolation on dead connection");
            return;
        }
        state.apply_outcome("set_isolation", err);
    }

    unsafe fn begin_transaction(&self, conn: usize, err: *mut RawErrorInfo) {
        let mut state = self.lock();
        if state.handles.get(&conn) != Some(&FakeHandleKind::Connection) {
            state.misuse(err, "begin on dead connection");
            return;
        }
        state.apply_outcome("begin_transaction", err);
    }

    unsafe fn commit(&self, conn: usize, err: *mut RawErrorInfo) {
        let mut state = self.lock();
        if state.handles.get(&conn) != Some(&FakeHandleKind::Connection) {
            state.misuse(err, "commit on dead connection");
            return;
        }
        state.apply_outcome("commit", err);
    }

    unsafe fn rollback(&self, conn: usize, err: *mut RawErrorInfo) {
        let mut state = self.lock();
        if state.handles.get(&conn) != Some(&FakeHandleKind::Connection) {
            state.misuse(err, "rollback on dead connection");
            return;
        }
        state.apply_outcome("rollback", err);
    }

    unsafe fn list_drivers(
        &self,
        count_out: *mut u32,
        err: *mut RawErrorInfo,
    ) -> *mut RawDriverRecord {
        let mut state = self.lock();
        if state.apply_outcome("list_drivers", err) {
            *count_out = 0;
            return std::ptr::null_mut();
        }
        let drivers = state.drivers.clone();
        let mut records = Vec::with_capacity(drivers.len());
        for d in &drivers {
            let name = state.alloc_opt_wide(d.name.as_deref());
            let mut attrs = Vec::with_capacity(d.attributes.len());
            for (k, v) in &d.attributes {
                let key = state.alloc_wide(k);
                let value = state.alloc_wide(v);
                attrs.push(RawDriverAttribute { key, value });
            }
            let attribute_count = attrs.len() as u32;
            let attributes = state.alloc_array(attrs, |len, cap| Alloc::AttrArray { len, cap });
            records.push(RawDriverRecord {
                name,
                attribute_count,
                attributes,
            });
        }
        *count_out = records.len() as u32;
        state.alloc_array(records, |len, cap| Alloc::DriverArray { len, cap })
    }

    unsafe fn delete_driver_array(&self, array: *mut RawDriverRecord, count: u32) {
        let mut state = self.lock();
        let addr = array as usize;
        state.counters.driver_array_deletes.push((addr, count));
        let (len, cap) = match state.allocs.remove(&addr) {
            Some(Alloc::DriverArray { len, cap }) => (len, cap),
            other => {
                if let Some(a) = other {
                    state.allocs.insert(addr, a);
                }
                state.counters.double_releases += 1;
                return;
            }
        };
        // Safety: reclaiming the exact buffer produced by list_drivers.
        let records = Vec::from_raw_parts(array, len, cap);
        for rec in &records {
            if !rec.name.is_null() {
                state.free_wide(rec.name as usize);
            }
            if !rec.attributes.is_null() {
                let attr_addr = rec.attributes as usize;
                if let Some(Alloc::AttrArray { len, cap }) = state.allocs.remove(&attr_addr) {
                    let attrs = Vec::from_raw_parts(rec.attributes, len, cap);
                    for a in &attrs {
                        state.free_wide(a.key as usize);
                        state.free_wide(a.value as usize);
                    }
                }
            }
        }
    }

    unsafe fn list_data_sources(
        &self,
        count_out: *mut u32,
        err: *mut RawErrorInfo,
    ) -> *mut RawDataSourceRecord {
        let mut state = self.lock();
        if state.apply_outcome("list_datasources", err) {
            *count_out = 0;
            return std::ptr::null_mut();
        }
        let sources = state.data_sources.clone();
        let mut records = Vec::with_capacity(sources.len());
        for s in &sources {
            let name = state.alloc_wide(&s.name);
            let description = state.alloc_wide(&s.description);
            let driver = state.alloc_wide(&s.driver);
            records.push(RawDataSourceRecord {
                name,
                description,
                driver,
            });
        }
        *count_out = records.len() as u32;
        state.alloc_array(records, |len, cap| Alloc::DataSourceArray { len, cap })
    }

    unsafe fn delete_data_source_array(&self, array: *mut RawDataSourceRecord, count: u32) {
        let mut state = self.lock();
        let addr = array as usize;
        state.counters.datasource_array_deletes.push((addr, count));
        let (len, cap) = match state.allocs.remove(&addr) {
            Some(Alloc::DataSourceArray { len, cap }) => (len, cap),
            other => {
                if let Some(a) = other {
                    state.allocs.insert(addr, a);
                }
                state.counters.double_releases += 1;
                return;
            }
        };
        let records = Vec::from_raw_parts(array, len, cap);
        for rec in &records {
            state.free_wide(rec.name as usize);
            state.free_wide(rec.description as usize);
            state.free_wide(rec.driver as usize);
        }
    }

    unsafe fn get_result_metadata(
        &self,
        cursor: usize,
        count_out: *mut u32,
        err: *mut RawErrorInfo,
    ) -> *mut RawColumnMeta {
        let mut state = self.lock();
        if state.handles.get(&cursor) != Some(&FakeHandleKind::Cursor) {
            state.misuse(err, "metadata on dead cursor");
            *count_out = 0;
            return std::ptr::null_mut();
        }
        if state.apply_outcome("get_result_metadata", err) {
            *count_out = 0;
            return std::ptr::null_mut();
        }
        let columns = state.columns.clone();
        let mut records = Vec::with_capacity(columns.len());
        for c in &columns {
            let name = state.alloc_wide(&c.name);
            let type_name = state.alloc_wide(&c.type_name);
            records.push(RawColumnMeta {
                name,
                type_name,
                data_type: c.data_type,
                column_size: c.column_size,
                decimal_digits: c.decimal_digits,
                nullable: c.nullable,
                is_auto_increment: c.is_auto_increment as u8,
                is_case_sensitive: c.is_case_sensitive as u8,
                is_read_only: c.is_read_only as u8,
                is_searchable: c.is_searchable as u8,
            });
        }
        *count_out = records.len() as u32;
        state.alloc_array(records, |len, cap| Alloc::ColumnMetaArray { len, cap })
    }

    unsafe fn delete_column_metadata(&self, array: *mut RawColumnMeta, count: u32) {
        let mut state = self.lock();
        let addr = array as usize;
        state.counters.column_meta_deletes.push((addr, count));
        let (len, cap) = match state.allocs.remove(&addr) {
            Some(Alloc::ColumnMetaArray { len, cap }) => (len, cap),
            other => {
                if let Some(a) = other {
                    state.allocs.insert(addr, a);
                }
                state.counters.double_releases += 1;
                return;
            }
        };
        let records = Vec::from_raw_parts(array, len, cap);
        for rec in &records {
            state.free_wide(rec.name as usize);
            state.free_wide(rec.type_name as usize);
        }
    }

    unsafe fn get_connection_metadata(
        &self,
        conn: usize,
        err: *mut RawErrorInfo,
    ) -> *mut RawConnectionMeta {
        let mut state = self.lock();
        if state.handles.get(&conn) != Some(&FakeHandleKind::Connection) {
            state.misuse(err, "metadata on dead connection");
            return std::ptr::null_mut();
        }
        if state.apply_outcome("get_connection_metadata", err) {
            return std::ptr::null_mut();
        }
        let meta = state.connection_meta.clone();
        let record = RawConnectionMeta {
            dbms_name: state.alloc_wide(&meta.dbms_name),
            dbms_version: state.alloc_wide(&meta.dbms_version),
            driver_name: state.alloc_wide(&meta.driver_name),
            driver_version: state.alloc_wide(&meta.driver_version),
            max_concurrent_statements: meta.max_concurrent_statements,
            default_isolation: meta.default_isolation,
            supports_transactions: meta.supports_transactions as u8,
            supports_batch: meta.supports_batch as u8,
            read_only: meta.read_only as u8,
        };
        let boxed = Box::into_raw(Box::new(record));
        state.allocs.insert(boxed as usize, Alloc::ConnMeta);
        boxed
    }

    unsafe fn delete_connection_metadata(&self, meta: *mut RawConnectionMeta) {
        let mut state = self.lock();
        let addr = meta as usize;
        state.counters.connection_meta_deletes += 1;
        match state.allocs.remove(&addr) {
            Some(Alloc::ConnMeta) => {
                let record = Box::from_raw(meta);
                state.free_wide(record.dbms_name as usize);
                state.free_wide(record.dbms_version as usize);
                state.free_wide(record.driver_name as usize);
                state.free_wide(record.driver_version as usize);
            }
            other => {
                if let Some(a) = other {
                    state.allocs.insert(addr, a);
                }
                state.counters.double_releases += 1;
            }
        }
    }

    unsafe fn open_stream(&self, cursor: usize, _column: u16, err: *mut RawErrorInfo) -> usize {
        let mut state = self.lock();
        if state.handles.get(&cursor) != Some(&FakeHandleKind::Cursor) {
            state.misuse(err, "stream on dead cursor");
            return 0;
        }
        if state.apply_outcome("open_stream", err) {
            return 0;
        }
        let data = state.stream_data.clone();
        let stream = state.new_handle(FakeHandleKind::Stream);
        state.streams.insert(stream, StreamState { data, offset: 0 });
        stream
    }

    unsafe fn read_stream(
        &self,
        stream: usize,
        buf: *mut u8,
        len: usize,
        err: *mut RawErrorInfo,
    ) -> i64 {
        let mut state = self.lock();
        if state.apply_outcome("read_stream", err) {
            return 0;
        }
        match state.streams.get_mut(&stream) {
            Some(s) => {
                let remaining = s.data.len() - s.offset;
                if remaining == 0 {
                    return STREAM_END;
                }
                let n = remaining.min(len);
                std::ptr::copy_nonoverlapping(s.data.as_ptr().add(s.offset), buf, n);
                s.offset += n;
                n as i64
            }
            None => {
                state.misuse(err, "read on dead stream");
                0
            }
        }
    }

    unsafe fn close_stream(&self, stream: usize, err: *mut RawErrorInfo) {
        let mut state = self.lock();
        state.apply_outcome("close_stream", err);
        state.release_handle(stream, FakeHandleKind::Stream);
    }

    unsafe fn clear_error(&self, err: *mut RawErrorInfo) {
        let mut state = self.lock();
        state.counters.clear_error_calls += 1;
        let (message, sql_state) = ((*err).message, (*err).sql_state);
        if !message.is_null() {
            if state.free_wide(message as usize) {
                state.counters.error_strings_freed += 1;
            }
            (*err).message = std::ptr::null_mut();
        }
        if !sql_state.is_null() {
            if state.free_wide(sql_state as usize) {
                state.counters.error_strings_freed += 1;
            }
            (*err).sql_state = std::ptr::null_mut();
        }
        (*err).code = 0;
        (*err).category = 0;
    }

    unsafe fn free(&self, addr: usize) {
        if addr == 0 {
            return;
        }
        self.lock().free_wide(addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_engine_connect_assigns_increasing_addresses() {
        let engine = FakeEngine::new();
        let mut err = RawErrorInfo::empty();
        let conn_str = crate::codec::encode("DSN=fake");
        let a = unsafe { engine.open_connection(conn_str.as_ptr(), 0, &mut err) };
        let b = unsafe { engine.open_connection(conn_str.as_ptr(), 0, &mut err) };
        assert_eq!(a, 0x1000);
        assert_eq!(b, 0x2000);
        assert_eq!(engine.live_handles(), 2);
    }

    #[test]
    fn test_fake_engine_double_disconnect_counted() {
        let engine = FakeEngine::new();
        let mut err = RawErrorInfo::empty();
        let conn_str = crate::codec::encode("DSN=fake");
        let conn = unsafe { engine.open_connection(conn_str.as_ptr(), 0, &mut err) };
        unsafe { engine.disconnect(conn, &mut err) };
        unsafe { engine.disconnect(conn, &mut err) };
        assert_eq!(engine.release_count(conn), 2);
        assert_eq!(engine.double_release_count(), 1);
    }

    #[test]
    fn test_fake_engine_failure_injection_allocates_error_strings() {
        let engine = FakeEngine::new();
        engine.fail_operation("connect", 42, 3, "08001", "refused");
        let mut err = RawErrorInfo::empty();
        let conn_str = crate::codec::encode("DSN=fake");
        let conn = unsafe { engine.open_connection(conn_str.as_ptr(), 0, &mut err) };
        assert_eq!(conn, 0);
        assert_eq!(err.code, 42);
        assert_eq!(engine.error_strings_allocated(), 2);
        unsafe { engine.clear_error(&mut err) };
        assert_eq!(engine.error_strings_freed(), 2);
        assert!(err.message.is_null());
        assert_eq!(err.code, 0);
        assert_eq!(engine.live_allocations(), 0);
    }

    #[test]
    fn test_fake_engine_clear_error_idempotent() {
        let engine = FakeEngine::new();
        let mut err = RawErrorInfo::empty();
        unsafe { engine.clear_error(&mut err) };
        unsafe { engine.clear_error(&mut err) };
        assert_eq!(engine.clear_error_calls(), 2);
        assert_eq!(engine.unknown_free_count(), 0);
    }

    #[test]
    fn test_fake_engine_driver_array_roundtrip_frees_everything() {
        let engine = FakeEngine::new();
        engine.add_driver("PostgreSQL", &[("Driver", "psqlodbc.so"), ("Threading", "2")]);
        engine.add_driver("SQLite", &[]);
        let mut err = RawErrorInfo::empty();
        let mut count = 0u32;
        let array = unsafe { engine.list_drivers(&mut count, &mut err) };
        assert_eq!(count, 2);
        assert!(!array.is_null());
        assert!(engine.live_allocations() > 0);
        unsafe { engine.delete_driver_array(array, count) };
        assert_eq!(engine.live_allocations(), 0);
        assert_eq!(engine.driver_array_deletes().len(), 1);
    }

    #[test]
    fn test_fake_engine_empty_driver_list_returns_null() {
        let engine = FakeEngine::new();
        let mut err = RawErrorInfo::empty();
        let mut count = 99u32;
        let array = unsafe { engine.list_drivers(&mut count, &mut err) };
        assert!(array.is_null());
        assert_eq!(count, 0);
    }

    #[test]
    fn test_fake_engine_stream_reads_and_eos() {
        let engine = FakeEngine::new();
        engine.push_result(vec![vec![Some("x".to_string())]]);
        engine.set_stream_data(vec![1, 2, 3, 4, 5]);
        let mut err = RawErrorInfo::empty();
        let conn_str = crate::codec::encode("DSN=fake");
        let conn = unsafe { engine.open_connection(conn_str.as_ptr(), 0, &mut err) };
        let sql = crate::codec::encode("SELECT blob FROM t");
        let stmt = unsafe { engine.prepare(conn, sql.as_ptr(), &mut err) };
        let cursor = unsafe { engine.execute(stmt, &mut err) };
        let stream = unsafe { engine.open_stream(cursor, 1, &mut err) };
        assert_ne!(stream, 0);

        let mut buf = [0u8; 3];
        let n = unsafe { engine.read_stream(stream, buf.as_mut_ptr(), buf.len(), &mut err) };
        assert_eq!(n, 3);
        assert_eq!(&buf, &[1, 2, 3]);
        let n = unsafe { engine.read_stream(stream, buf.as_mut_ptr(), buf.len(), &mut err) };
        assert_eq!(n, 2);
        let n = unsafe { engine.read_stream(stream, buf.as_mut_ptr(), buf.len(), &mut err) };
        assert_eq!(n, STREAM_END);
    }

    #[test]
    fn test_fake_engine_cell_text_null_for_sql_null() {
        let engine = FakeEngine::new();
        engine.push_result(vec![vec![Some("a".to_string()), None]]);
        let mut err = RawErrorInfo::empty();
        let conn_str = crate::codec::encode("DSN=fake");
        let conn = unsafe { engine.open_connection(conn_str.as_ptr(), 0, &mut err) };
        let sql = crate::codec::encode("SELECT a, b FROM t");
        let stmt = unsafe { engine.prepare(conn, sql.as_ptr(), &mut err) };
        let cursor = unsafe { engine.execute(stmt, &mut err) };
        assert_eq!(unsafe { engine.fetch_row(cursor, &mut err) }, 1);

        let cell = unsafe { engine.get_cell_text(cursor, 1, &mut err) };
        assert!(!cell.is_null());
        assert_eq!(unsafe { crate::codec::decode(cell) }.as_deref(), Some("a"));
        unsafe { engine.free(cell as usize) };

        let null_cell = unsafe { engine.get_cell_text(cursor, 2, &mut err) };
        assert!(null_cell.is_null());
        assert_eq!(engine.live_allocations(), 0);
    }
}
