use std::sync::Arc;

use odbc_bridge::native::FakeEngine;
use odbc_bridge::{BridgeConfig, BridgeEnvironment};

/// Loads `.env` and wires the log facade once per test binary.
pub fn init_logging() {
    dotenvy::dotenv().ok();
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A bridge environment over a fresh instrumented fake.
pub fn fake_environment() -> (Arc<FakeEngine>, BridgeEnvironment) {
    init_logging();
    let engine = Arc::new(FakeEngine::new());
    let env = BridgeEnvironment::with_engine(engine.clone(), BridgeConfig::default());
    (engine, env)
}
