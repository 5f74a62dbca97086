use crate::error::{BridgeError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_LOGIN_TIMEOUT_MS: u32 = 15_000;
const DEFAULT_STREAM_BUFFER_LEN: usize = 64 * 1024;

/// Bridge configuration. Loaded from JSON, overridable per-field through
/// `ODBC_BRIDGE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Path to the native connectivity library. `None` means the platform
    /// default name next to the executable / on the loader path.
    pub library_path: Option<PathBuf>,
    /// Login timeout forwarded to the engine on connect. 0 = engine default.
    pub login_timeout_ms: u32,
    /// Buffer length for chunked binary-stream reads.
    pub stream_buffer_len: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            login_timeout_ms: DEFAULT_LOGIN_TIMEOUT_MS,
            stream_buffer_len: DEFAULT_STREAM_BUFFER_LEN,
        }
    }
}

impl BridgeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| BridgeError::InternalError(format!("invalid config: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::InternalError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Applies `ODBC_BRIDGE_LIBRARY`, `ODBC_BRIDGE_LOGIN_TIMEOUT_MS` and
    /// `ODBC_BRIDGE_STREAM_BUFFER_LEN` on top of the current values.
    /// Unparseable numeric values are ignored, not fatal.
    pub fn apply_env(mut self) -> Self {
        if let Ok(path) = std::env::var("ODBC_BRIDGE_LIBRARY") {
            if !path.is_empty() {
                self.library_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(v) = std::env::var("ODBC_BRIDGE_LOGIN_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.login_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("ODBC_BRIDGE_STREAM_BUFFER_LEN") {
            if let Ok(len) = v.parse::<usize>() {
                if len > 0 {
                    self.stream_buffer_len = len;
                }
            }
        }
        self
    }

    /// The library path to load, with the platform default file name as
    /// fallback.
    pub fn resolved_library_path(&self) -> PathBuf {
        match &self.library_path {
            Some(p) => p.clone(),
            None => PathBuf::from(default_library_name()),
        }
    }
}

fn default_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "odbcengine.dll"
    } else if cfg!(target_os = "macos") {
        "libodbcengine.dylib"
    } else {
        "libodbcengine.so"
    }
}
