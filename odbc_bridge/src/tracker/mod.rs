//! Resource Tracker: scoped collector for transient native allocations.
//!
//! Operations that pull several engine-owned buffers (cell strings,
//! decoded text) track each address here; the tracker frees all of them
//! when its scope ends, on every exit path. Insertion has set semantics so
//! accidental double-tracking cannot turn into a double free.

use crate::native::NativeEngine;

pub struct ResourceTracker<'e> {
    engine: &'e dyn NativeEngine,
    addrs: Vec<usize>,
}

impl<'e> ResourceTracker<'e> {
    pub fn new(engine: &'e dyn NativeEngine) -> Self {
        Self {
            engine,
            addrs: Vec::new(),
        }
    }

    /// Records `addr` for bulk release and returns it for chaining. Null
    /// sentinels and duplicates are skipped.
    pub fn track(&mut self, addr: usize) -> usize {
        if addr != 0 && !self.addrs.contains(&addr) {
            self.addrs.push(addr);
        }
        addr
    }

    pub fn tracked(&self) -> usize {
        self.addrs.len()
    }

    /// Frees every tracked address through the engine and clears the set.
    pub fn release_all(&mut self) {
        for addr in self.addrs.drain(..) {
            // Safety: tracked addresses came from this engine and are only
            // drained once.
            unsafe { self.engine.free(addr) };
        }
    }
}

impl Drop for ResourceTracker<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::FakeEngine;
    use crate::native::types::RawErrorInfo;

    fn engine_with_cell(value: &str) -> (FakeEngine, usize) {
        let engine = FakeEngine::new();
        engine.push_result(vec![vec![Some(value.to_string())]]);
        let mut err = RawErrorInfo::empty();
        let conn_str = crate::codec::encode("DSN=fake");
        let conn = unsafe { engine.open_connection(conn_str.as_ptr(), 0, &mut err) };
        let sql = crate::codec::encode("SELECT v FROM t");
        let stmt = unsafe { engine.prepare(conn, sql.as_ptr(), &mut err) };
        let cursor = unsafe { engine.execute(stmt, &mut err) };
        unsafe { engine.fetch_row(cursor, &mut err) };
        (engine, cursor)
    }

    #[test]
    fn test_tracked_addresses_freed_on_drop() {
        let (engine, cursor) = engine_with_cell("hello");
        let mut err = RawErrorInfo::empty();
        let cell = unsafe { engine.get_cell_text(cursor, 1, &mut err) } as usize;
        assert_ne!(cell, 0);
        {
            let mut tracker = ResourceTracker::new(&engine);
            assert_eq!(tracker.track(cell), cell);
            assert_eq!(tracker.tracked(), 1);
        }
        assert_eq!(engine.free_count(cell), 1);
    }

    #[test]
    fn test_duplicate_track_is_single_free() {
        let (engine, cursor) = engine_with_cell("dup");
        let mut err = RawErrorInfo::empty();
        let cell = unsafe { engine.get_cell_text(cursor, 1, &mut err) } as usize;
        {
            let mut tracker = ResourceTracker::new(&engine);
            tracker.track(cell);
            tracker.track(cell);
            tracker.track(cell);
            assert_eq!(tracker.tracked(), 1);
        }
        assert_eq!(engine.free_count(cell), 1);
        assert_eq!(engine.unknown_free_count(), 0);
    }

    #[test]
    fn test_null_sentinel_not_tracked() {
        let engine = FakeEngine::new();
        let mut tracker = ResourceTracker::new(&engine);
        assert_eq!(tracker.track(0), 0);
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn test_release_all_clears_set() {
        let (engine, cursor) = engine_with_cell("abc");
        let mut err = RawErrorInfo::empty();
        let cell = unsafe { engine.get_cell_text(cursor, 1, &mut err) } as usize;
        let mut tracker = ResourceTracker::new(&engine);
        tracker.track(cell);
        tracker.release_all();
        assert_eq!(tracker.tracked(), 0);
        // Drop after an explicit release_all frees nothing further.
        drop(tracker);
        assert_eq!(engine.free_count(cell), 1);
    }

    #[test]
    fn test_release_on_unwind() {
        let (engine, cursor) = engine_with_cell("unwind");
        let mut err = RawErrorInfo::empty();
        let cell = unsafe { engine.get_cell_text(cursor, 1, &mut err) } as usize;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut tracker = ResourceTracker::new(&engine);
            tracker.track(cell);
            panic!("mid-operation failure");
        }));
        assert!(result.is_err());
        assert_eq!(engine.free_count(cell), 1);
    }
}
