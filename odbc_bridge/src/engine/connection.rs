use crate::channel::{with_error_check, with_error_logged};
use crate::codec;
use crate::engine::metadata::{self, ConnectionCapabilities};
use crate::engine::statement::Statement;
use crate::engine::transaction::{IsolationLevel, Transaction};
use crate::error::{BridgeError, Result};
use crate::handles::{HandleKind, NativeHandle};
use crate::native::NativeEngine;
use std::sync::Arc;

/// A live database connection owned by the native engine.
///
/// Not safe for concurrent use from two threads; the bridge performs no
/// internal locking on handles. The only cross-thread operation is the
/// release race between `close` and the Drop backstop, which the handle's
/// atomic flag arbitrates.
pub struct Connection {
    handle: NativeHandle,
    engine: Arc<dyn NativeEngine>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn connect(
        engine: Arc<dyn NativeEngine>,
        conn_str: &str,
        login_timeout_ms: u32,
    ) -> Result<Self> {
        if conn_str.is_empty() {
            return Err(BridgeError::EmptyConnectionString);
        }

        let wide = codec::encode(conn_str);
        let addr = with_error_check(&*engine, |err| {
            // Safety: the wide buffer outlives the call; the engine only
            // borrows it.
            unsafe { engine.open_connection(wide.as_ptr(), login_timeout_ms, err) }
        })?;
        let handle = NativeHandle::new(HandleKind::Connection, addr)?;
        Ok(Self { handle, engine })
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }

    pub(crate) fn raw_addr(&self) -> Result<usize> {
        self.handle.addr()
    }

    pub(crate) fn engine(&self) -> &Arc<dyn NativeEngine> {
        &self.engine
    }

    pub fn prepare(&self, sql: &str) -> Result<Statement> {
        Statement::prepare(self.engine.clone(), self.raw_addr()?, sql)
    }

    /// Decodes the engine's connection capability record.
    pub fn capabilities(&self) -> Result<ConnectionCapabilities> {
        metadata::decode_connection_metadata(&*self.engine, self.raw_addr()?)
    }

    pub fn set_isolation(&self, level: IsolationLevel) -> Result<()> {
        let addr = self.raw_addr()?;
        with_error_check(&*self.engine, |err| unsafe {
            self.engine.set_isolation(addr, level.code(), err)
        })
    }

    pub fn begin_transaction(&self, level: IsolationLevel) -> Result<Transaction<'_>> {
        Transaction::begin(self, level)
    }

    /// Explicit disconnect. Idempotent; release failures are logged, not
    /// raised - this is a best-effort terminal operation.
    pub fn close(&self) {
        if let Some(addr) = self.handle.begin_release() {
            with_error_logged(&*self.engine, "disconnect", |err| unsafe {
                self.engine.disconnect(addr, err)
            });
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(addr) = self.handle.begin_release() {
            log::warn!("connection dropped without close; releasing in backstop");
            with_error_logged(&*self.engine, "disconnect", |err| unsafe {
                self.engine.disconnect(addr, err)
            });
        }
    }
}
