use crate::channel::{with_error_check, with_error_logged};
use crate::codec;
use crate::engine::cursor::ResultCursor;
use crate::error::Result;
use crate::handles::{HandleKind, NativeHandle};
use crate::native::NativeEngine;
use std::sync::Arc;

/// A prepared statement. Parameters bind as wide text by 1-based index;
/// conversion to the column's native type is the engine's job.
pub struct Statement {
    handle: NativeHandle,
    engine: Arc<dyn NativeEngine>,
}

impl Statement {
    pub(crate) fn prepare(
        engine: Arc<dyn NativeEngine>,
        conn_addr: usize,
        sql: &str,
    ) -> Result<Self> {
        let wide = codec::encode(sql);
        let addr = with_error_check(&*engine, |err| unsafe {
            engine.prepare(conn_addr, wide.as_ptr(), err)
        })?;
        let handle = NativeHandle::new(HandleKind::Statement, addr)?;
        Ok(Self { handle, engine })
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }

    pub fn bind_text(&self, index: u16, value: &str) -> Result<()> {
        let addr = self.handle.addr()?;
        let wide = codec::encode(value);
        with_error_check(&*self.engine, |err| unsafe {
            self.engine.bind_text(addr, index, wide.as_ptr(), err)
        })
    }

    /// Executes the statement. `None` means no result set was produced
    /// (e.g. an update); use [`row_count`](Self::row_count) then.
    pub fn execute(&self) -> Result<Option<ResultCursor>> {
        let addr = self.handle.addr()?;
        let cursor_addr = with_error_check(&*self.engine, |err| unsafe {
            self.engine.execute(addr, err)
        })?;
        if cursor_addr == 0 {
            return Ok(None);
        }
        Ok(Some(ResultCursor::new(self.engine.clone(), cursor_addr)?))
    }

    /// Rows affected by the last execute.
    pub fn row_count(&self) -> Result<i64> {
        let addr = self.handle.addr()?;
        with_error_check(&*self.engine, |err| unsafe {
            self.engine.row_count(addr, err)
        })
    }

    /// Requests cancellation of an in-flight execute. The one operation
    /// meant to be issued from another thread while this statement blocks;
    /// it only reads the address and mutates no bridge-side state.
    pub fn cancel(&self) -> Result<()> {
        let addr = self.handle.addr()?;
        with_error_check(&*self.engine, |err| unsafe {
            self.engine.cancel(addr, err)
        })
    }

    /// Idempotent best-effort close.
    pub fn close(&self) {
        if let Some(addr) = self.handle.begin_release() {
            with_error_logged(&*self.engine, "close_statement", |err| unsafe {
                self.engine.close_statement(addr, err)
            });
        }
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if let Some(addr) = self.handle.begin_release() {
            log::warn!("statement dropped without close; releasing in backstop");
            with_error_logged(&*self.engine, "close_statement", |err| unsafe {
                self.engine.close_statement(addr, err)
            });
        }
    }
}
