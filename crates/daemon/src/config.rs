// SPDX-License-Identifier: MIT

//! Daemon configuration, read from the environment so `qopd` needs no
//! config file of its own.

use std::env;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 9393;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub queue_path: PathBuf,
    pub persist_queue: bool,
    pub max_transfer: usize,
    pub max_convert: usize,
}

impl Config {
    /// Read from the environment, falling back to the same defaults a bare
    /// `QopDaemon()` construction would have used: port 9393, a queue file
    /// under the system temp dir, not persisted across restarts, pool sizes
    /// from `qop_engine::PoolConfig::default_for_host`.
    pub fn from_env() -> Self {
        let default_pool = qop_engine::PoolConfig::default_for_host();

        Self {
            port: env_parsed("QOP_PORT").unwrap_or(DEFAULT_PORT),
            queue_path: env::var("QOP_QUEUE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("qop-temp.sqlite3")),
            persist_queue: env_parsed("QOP_PERSIST_QUEUE").unwrap_or(false),
            max_transfer: env_parsed("QOP_MAX_TRANSFER").unwrap_or(default_pool.transfer_size),
            max_convert: env_parsed("QOP_MAX_CONVERT").unwrap_or(default_pool.convert_size),
        }
    }

    pub fn pool_config(&self) -> qop_engine::PoolConfig {
        qop_engine::PoolConfig {
            transfer_size: self.max_transfer,
            convert_size: self.max_convert,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
