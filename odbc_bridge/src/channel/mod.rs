//! Error Channel: the check-then-clear protocol wrapped around every
//! native call.
//!
//! Native code cannot raise across the boundary; status and messages come
//! back through a trailing out-parameter record. The record may own
//! engine-allocated message strings even on success (warnings), so the
//! clear step must run on every exit path. That guarantee lives in a
//! clear-on-drop guard, not in caller discipline.

use crate::codec;
use crate::error::{BridgeError, ErrorCategory, Result};
use crate::native::types::RawErrorInfo;
use crate::native::NativeEngine;

struct ClearOnDrop<'e> {
    engine: &'e dyn NativeEngine,
    record: *mut RawErrorInfo,
}

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        // Safety: `record` outlives the guard (stack slot in the wrapper
        // functions below) and clear_error is a no-op on a clear record.
        unsafe { self.engine.clear_error(self.record) };
    }
}

/// Decodes a failed record into a structured error. Reads the message
/// strings without freeing them; the guard's clear call owns that.
fn decode_failure(record: &RawErrorInfo) -> BridgeError {
    // Safety: the engine hands back NUL-terminated wide strings (or null).
    let message = unsafe { codec::decode(record.message) }
        .unwrap_or_else(|| "native engine reported no message".to_string());
    let sql_state = unsafe { codec::decode(record.sql_state) }.unwrap_or_default();
    BridgeError::Native {
        code: record.code,
        category: ErrorCategory::from_code(record.category),
        sql_state,
        message,
    }
}

/// Runs one native call under the error-channel protocol: fresh record,
/// call, inspect, decode-then-clear. The record is cleared on success, on
/// structured failure, and on unwind.
pub fn with_error_check<T, F>(engine: &dyn NativeEngine, f: F) -> Result<T>
where
    F: FnOnce(*mut RawErrorInfo) -> T,
{
    let mut record = RawErrorInfo::empty();
    let guard = ClearOnDrop {
        engine,
        record: &mut record,
    };
    let out = f(guard.record);
    // Safety: nothing else aliases the record while the guard lives.
    let failed = unsafe { !(*guard.record).is_success() };
    if failed {
        let err = decode_failure(unsafe { &*guard.record });
        return Err(err);
    }
    Ok(out)
}

/// Best-effort variant for release paths: never raises. A non-zero status
/// is logged at warn and swallowed, because a failed terminal cleanup must
/// not mask the operation's real outcome or crash a finalizer.
pub fn with_error_logged<T, F>(engine: &dyn NativeEngine, what: &str, f: F) -> T
where
    F: FnOnce(*mut RawErrorInfo) -> T,
{
    let mut record = RawErrorInfo::empty();
    let guard = ClearOnDrop {
        engine,
        record: &mut record,
    };
    let out = f(guard.record);
    let failed = unsafe { !(*guard.record).is_success() };
    if failed {
        let err = decode_failure(unsafe { &*guard.record });
        log::warn!("{} failed during release: {}", what, err);
    }
    out
}
