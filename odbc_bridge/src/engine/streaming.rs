use crate::channel::{with_error_check, with_error_logged};
use crate::error::{BridgeError, Result};
use crate::handles::{HandleKind, NativeHandle};
use crate::native::{NativeEngine, STREAM_END};
use std::sync::Arc;

/// Chunked reader over one binary column of the current row.
///
/// The stream is forward-only and tied to the cursor position it was opened
/// at; advancing the cursor invalidates it engine-side.
pub struct BinaryStream {
    handle: NativeHandle,
    engine: Arc<dyn NativeEngine>,
}

impl BinaryStream {
    pub(crate) fn new(engine: Arc<dyn NativeEngine>, addr: usize) -> Result<Self> {
        let handle = NativeHandle::new(HandleKind::BinaryStream, addr)?;
        Ok(Self { handle, engine })
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_live()
    }

    /// Reads the next chunk into `buf`. `Ok(None)` is end of stream; a
    /// short read only means the engine had less ready, not exhaustion.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let addr = match self.handle.addr() {
            Ok(addr) => addr,
            Err(BridgeError::HandleState(_)) => return Err(BridgeError::StreamClosed),
            Err(e) => return Err(e),
        };
        let n = with_error_check(&*self.engine, |err| unsafe {
            self.engine.read_stream(addr, buf.as_mut_ptr(), buf.len(), err)
        })?;
        if n == STREAM_END {
            return Ok(None);
        }
        if n < 0 || n as usize > buf.len() {
            return Err(BridgeError::Marshal(format!(
                "stream read reported {} bytes into a {}-byte buffer",
                n,
                buf.len()
            )));
        }
        Ok(Some(n as usize))
    }

    /// Drains the stream into a single buffer using `chunk_len`-byte reads.
    pub fn read_to_end(&mut self, chunk_len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = vec![0u8; chunk_len.max(1)];
        while let Some(n) = self.read(&mut chunk)? {
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }

    /// Idempotent close; safe to call concurrently with Drop.
    pub fn close(&mut self) {
        if let Some(addr) = self.handle.begin_release() {
            with_error_logged(&*self.engine, "close_stream", |err| unsafe {
                self.engine.close_stream(addr, err)
            });
        }
    }
}

impl Drop for BinaryStream {
    fn drop(&mut self) {
        if let Some(addr) = self.handle.begin_release() {
            log::warn!("binary stream dropped without close; releasing in backstop");
            with_error_logged(&*self.engine, "close_stream", |err| unsafe {
                self.engine.close_stream(addr, err)
            });
        }
    }
}
