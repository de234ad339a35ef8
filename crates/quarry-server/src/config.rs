use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8417";

/// Default upload limit. Request bodies are buffered in memory.
pub const DEFAULT_MAX_OBJECT_SIZE: usize = 1024 * 1024 * 1024;

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory holding the objects (same layout as a filesystem mirror).
    pub root: PathBuf,
    /// Bearer token required on object routes. Never read from or written to
    /// the config file; the CLI takes it from the environment.
    #[serde(skip)]
    pub auth_token: Option<String>,
    /// Largest accepted upload in bytes.
    pub max_object_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8417)),
            root: PathBuf::from("."),
            auth_token: None,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
        }
    }
}

impl ServerConfig {
    /// Read a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| ServerError::Config(format!("{}: {}", path.display(), e.message())))
    }
}

// Keep the token out of logs.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("root", &self.root)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("max_object_size", &self.max_object_size)
            .finish()
    }
}
