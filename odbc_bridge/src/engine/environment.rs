use crate::config::BridgeConfig;
use crate::engine::catalog::{self, DataSourceInfo, DriverInfo};
use crate::engine::connection::Connection;
use crate::error::Result;
use crate::native::{LibEngine, NativeEngine};
use std::sync::Arc;

/// Entry point of the bridge: owns the native engine backend and the
/// configuration every connection inherits.
pub struct BridgeEnvironment {
    engine: Arc<dyn NativeEngine>,
    config: BridgeConfig,
}

impl BridgeEnvironment {
    /// Loads the native connectivity library named by `config`.
    pub fn load(config: BridgeConfig) -> Result<Self> {
        let path = config.resolved_library_path();
        let engine = LibEngine::load(&path)?;
        Ok(Self {
            engine: Arc::new(engine),
            config,
        })
    }

    /// Builds an environment over an already-constructed backend. This is
    /// how tests plug in the instrumented fake.
    pub fn with_engine(engine: Arc<dyn NativeEngine>, config: BridgeConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<dyn NativeEngine> {
        self.engine.clone()
    }

    pub fn connect(&self, conn_str: &str) -> Result<Connection> {
        Connection::connect(
            self.engine.clone(),
            conn_str,
            self.config.login_timeout_ms,
        )
    }

    pub fn connect_with_timeout(&self, conn_str: &str, timeout_ms: u32) -> Result<Connection> {
        Connection::connect(self.engine.clone(), conn_str, timeout_ms)
    }

    pub fn list_drivers(&self) -> Result<Vec<DriverInfo>> {
        catalog::list_drivers(&*self.engine)
    }

    pub fn list_data_sources(&self) -> Result<Vec<DataSourceInfo>> {
        catalog::list_data_sources(&*self.engine)
    }
}
