use crate::channel::{with_error_check, with_error_logged};
use crate::codec;
use crate::engine::metadata::{self, ColumnMetadata};
use crate::engine::streaming::BinaryStream;
use crate::error::Result;
use crate::handles::{HandleKind, NativeHandle};
use crate::native::NativeEngine;
use crate::tracker::ResourceTracker;
use std::sync::Arc;

/// Forward-only cursor over a result set.
///
/// Row width comes from the result metadata, which is fetched lazily on
/// first use and cached for the cursor's lifetime.
pub struct ResultCursor {
    handle: NativeHandle,
    engine: Arc<dyn NativeEngine>,
    meta: Option<Vec<ColumnMetadata>>,
}

impl ResultCursor {
    pub(crate) fn new(engine: Arc<dyn NativeEngine>, addr: usize) -> Result<Self> {
        let handle = NativeHandle::new(HandleKind::ResultCursor, addr)?;
        Ok(Self {
            handle,
            engine,
            meta: None,
        })
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }

    /// Column descriptions for this result set.
    pub fn metadata(&mut self) -> Result<&[ColumnMetadata]> {
        if self.meta.is_none() {
            let addr = self.handle.addr()?;
            self.meta = Some(metadata::decode_result_metadata(&*self.engine, addr)?);
        }
        Ok(self.meta.as_deref().unwrap_or_default())
    }

    pub fn column_count(&mut self) -> Result<usize> {
        Ok(self.metadata()?.len())
    }

    /// Advances to the next row and materializes every cell as text.
    /// `Ok(None)` means the result set is exhausted; `None` cells are
    /// SQL NULL.
    pub fn fetch_row(&mut self) -> Result<Option<Vec<Option<String>>>> {
        let width = self.column_count()?;
        let addr = self.handle.addr()?;
        let has_row = with_error_check(&*self.engine, |err| unsafe {
            self.engine.fetch_row(addr, err)
        })?;
        if has_row == 0 {
            return Ok(None);
        }

        // Cell buffers go into the tracker the moment the engine hands them
        // out, so they are returned even if a later cell errors.
        let mut tracker = ResourceTracker::new(&*self.engine);
        let mut cells: Vec<*mut u16> = Vec::with_capacity(width);
        for column in 1..=width as u16 {
            let cell = with_error_check(&*self.engine, |err| unsafe {
                self.engine.get_cell_text(addr, column, err)
            })?;
            tracker.track(cell as usize);
            cells.push(cell);
        }

        let row = cells
            .into_iter()
            .map(|cell| unsafe { codec::decode(cell) })
            .collect();
        Ok(Some(row))
    }

    /// Opens a chunked binary stream over the given 1-based column of the
    /// current row.
    pub fn open_stream(&mut self, column: u16) -> Result<BinaryStream> {
        let addr = self.handle.addr()?;
        let stream_addr = with_error_check(&*self.engine, |err| unsafe {
            self.engine.open_stream(addr, column, err)
        })?;
        BinaryStream::new(self.engine.clone(), stream_addr)
    }

    /// Idempotent best-effort close.
    pub fn close(&self) {
        if let Some(addr) = self.handle.begin_release() {
            with_error_logged(&*self.engine, "close_result", |err| unsafe {
                self.engine.close_result(addr, err)
            });
        }
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        if let Some(addr) = self.handle.begin_release() {
            log::warn!("result cursor dropped without close; releasing in backstop");
            with_error_logged(&*self.engine, "close_result", |err| unsafe {
                self.engine.close_result(addr, err)
            });
        }
    }
}
