//! Handle Registry core: the state machine every native-owned resource
//! goes through.
//!
//! A handle is Live (address present, exactly one owner) or Released
//! (address cleared, native release already ran). The released *flag*
//! decides idempotency, never the address field, because release clears
//! the address and the two writes must not race into a second native free.
//! The flag is atomic: the Drop backstop can run on a different thread
//! than an explicit close.

use crate::error::{BridgeError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Connection,
    Statement,
    ResultCursor,
    BinaryStream,
    RawArray,
}

impl HandleKind {
    pub fn name(self) -> &'static str {
        match self {
            HandleKind::Connection => "connection",
            HandleKind::Statement => "statement",
            HandleKind::ResultCursor => "result cursor",
            HandleKind::BinaryStream => "binary stream",
            HandleKind::RawArray => "raw array",
        }
    }
}

/// Typed wrapper around a raw native address with a release obligation.
///
/// The address never leaves the bridge layer; owners in `crate::engine`
/// pair this with the matching native release function.
#[derive(Debug)]
pub struct NativeHandle {
    kind: HandleKind,
    addr: AtomicUsize,
    released: AtomicBool,
}

impl NativeHandle {
    /// Wraps a non-null address returned by an open/create call. A zero
    /// address with a success status is an engine contract violation.
    pub fn new(kind: HandleKind, addr: usize) -> Result<Self> {
        if addr == 0 {
            return Err(BridgeError::Marshal(format!(
                "engine returned null {} handle with success status",
                kind.name()
            )));
        }
        Ok(Self {
            kind,
            addr: AtomicUsize::new(addr),
            released: AtomicBool::new(false),
        })
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn is_live(&self) -> bool {
        !self.released.load(Ordering::Acquire)
    }

    /// The raw address for a normal (Live -> Live) operation.
    pub fn addr(&self) -> Result<usize> {
        if !self.is_live() {
            return Err(BridgeError::HandleState(self.kind.name()));
        }
        Ok(self.addr.load(Ordering::Acquire))
    }

    /// Atomically claims the release transition. Returns the address to
    /// free for the single winner; every later caller (explicit release,
    /// Drop backstop, racing thread) gets `None` and must do nothing.
    pub fn begin_release(&self) -> Option<usize> {
        if self
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        // Winner clears the address; it is read exactly once.
        Some(self.addr.swap(0, Ordering::AcqRel))
    }
}
