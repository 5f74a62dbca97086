//! Native engine boundary: record layouts, the call-surface trait, the
//! dynamically loaded production backend, and the instrumented test fake.

mod api;
#[cfg(any(test, feature = "test-helpers"))]
mod fake;
mod library;
pub mod types;

pub use api::{NativeEngine, STREAM_END};
#[cfg(any(test, feature = "test-helpers"))]
pub use fake::{FakeColumn, FakeConnectionMeta, FakeDataSource, FakeDriver, FakeEngine};
pub use library::LibEngine;
