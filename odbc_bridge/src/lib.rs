pub mod channel;
pub mod codec;
pub mod config;
pub mod engine;
mod error;
mod handles;
pub mod native;
pub mod tracker;

pub use config::BridgeConfig;
pub use engine::{
    list_data_sources, list_drivers, BinaryStream, BridgeEnvironment, ColumnMetadata, Connection,
    ConnectionCapabilities, DataSourceInfo, DriverInfo, IsolationLevel, Nullability, ResultCursor,
    Statement, Transaction,
};
pub use error::{BridgeError, ErrorCategory, Result, StructuredError};
pub use handles::{HandleKind, NativeHandle};
