// ⚙️ Configuration - read once from the environment (and an optional .env file)

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DB_PATH: &str = "admissions.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_SCAN_CHUNK: usize = 500;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind_addr: String,
    /// Page size used when a listing asks for `offset` without `limit`
    pub page_size: usize,
    /// Rows fetched per round trip by the lazy membership cursor
    pub scan_chunk: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            scan_chunk: DEFAULT_SCAN_CHUNK,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build config from any key lookup; empty values count as unset and
    /// unparseable numbers fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: usize| {
            get(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };

        Config {
            db_path: get("ADMISSIONS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            bind_addr: get("ADMISSIONS_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            page_size: number("ADMISSIONS_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            scan_chunk: number("ADMISSIONS_SCAN_CHUNK", DEFAULT_SCAN_CHUNK),
            log_level: get("RUST_LOG")
                .or_else(|| get("ADMISSIONS_LOG"))
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }
}
