//! Runtime configuration: lazy-read threshold, worker pool sizing,
//! transport timeouts, and the capability list advertised during fetch
//! negotiation. Discovered from `GIT_CORE_CONFIG` (a path to a TOML file)
//! or `./git-core.toml`, falling back to built-in defaults.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// objects above this declared size are read lazily rather than
    /// eagerly decompressed during a whole-pack load.
    pub lazy_read_threshold_bytes: u64,
    /// force every object in a pack to be read eagerly, ignoring the
    /// lazy threshold entirely.
    pub eager_whole_pack: bool,
    /// number of OS threads in the object-manager worker pool.
    pub worker_pool_capacity: usize,
    pub connect_timeout_ms: u64,
    pub client_capabilities: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            lazy_read_threshold_bytes: 1_048_576,
            eager_whole_pack: false,
            worker_pool_capacity: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            connect_timeout_ms: 10_000,
            client_capabilities: vec![
                "multi_ack".to_string(),
                "side-band-64k".to_string(),
                "ofs-delta".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| crate::error::GitError::object_broken(format!("invalid config: {e}")))
    }

    /// `GIT_CORE_CONFIG` env var, then `./git-core.toml`, then defaults.
    pub fn load_with_discovery() -> Result<Self> {
        if let Ok(path) = std::env::var("GIT_CORE_CONFIG") {
            let text = std::fs::read_to_string(&path)?;
            return Self::from_toml_str(&text);
        }
        let default_path = Path::new("git-core.toml");
        if default_path.exists() {
            let text = std::fs::read_to_string(default_path)?;
            return Self::from_toml_str(&text);
        }
        Ok(Config::default())
    }
}
