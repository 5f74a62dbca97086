pub mod catalog;
pub mod connection;
pub mod cursor;
pub mod environment;
pub mod metadata;
pub mod statement;
pub mod streaming;
pub mod transaction;

pub use catalog::{list_data_sources, list_drivers, DataSourceInfo, DriverInfo};
pub use connection::Connection;
pub use cursor::ResultCursor;
pub use environment::BridgeEnvironment;
pub use metadata::{ColumnMetadata, ConnectionCapabilities, Nullability};
pub use statement::Statement;
pub use streaming::BinaryStream;
pub use transaction::{IsolationLevel, Transaction};
