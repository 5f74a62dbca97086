use crate::channel::{with_error_check, with_error_logged};
use crate::engine::connection::Connection;
use crate::error::Result;
use serde::Serialize;

/// Transaction isolation levels, in increasing strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Maps the engine's small-int encoding. Unknown values fall back to
    /// read committed, the common engine default.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => IsolationLevel::ReadUncommitted,
            1 => IsolationLevel::ReadCommitted,
            2 => IsolationLevel::RepeatableRead,
            3 => IsolationLevel::Serializable,
            _ => IsolationLevel::ReadCommitted,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            IsolationLevel::ReadUncommitted => 0,
            IsolationLevel::ReadCommitted => 1,
            IsolationLevel::RepeatableRead => 2,
            IsolationLevel::Serializable => 3,
        }
    }
}

/// An open transaction on a connection.
///
/// Must be resolved through [`commit`](Self::commit) or
/// [`rollback`](Self::rollback); a transaction dropped unresolved rolls
/// back best-effort so an unwinding caller never leaves the connection
/// holding locks.
pub struct Transaction<'c> {
    conn: &'c Connection,
    done: bool,
}

impl<'c> Transaction<'c> {
    pub(crate) fn begin(conn: &'c Connection, level: IsolationLevel) -> Result<Self> {
        conn.set_isolation(level)?;
        let addr = conn.raw_addr()?;
        let engine = conn.engine();
        with_error_check(&**engine, |err| unsafe {
            engine.begin_transaction(addr, err)
        })?;
        Ok(Self { conn, done: false })
    }

    pub fn commit(mut self) -> Result<()> {
        let addr = self.conn.raw_addr()?;
        let engine = self.conn.engine();
        with_error_check(&**engine, |err| unsafe { engine.commit(addr, err) })?;
        self.done = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        let addr = self.conn.raw_addr()?;
        let engine = self.conn.engine();
        with_error_check(&**engine, |err| unsafe { engine.rollback(addr, err) })?;
        self.done = true;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Ok(addr) = self.conn.raw_addr() else {
            // Connection already released; the engine rolled back with it.
            return;
        };
        log::warn!("transaction dropped unresolved; rolling back");
        let engine = self.conn.engine();
        with_error_logged(&**engine, "rollback", |err| unsafe {
            engine.rollback(addr, err)
        });
    }
}
