//! Runtime configuration
//!
//! ## Configuration (Environment Variables)
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `REB_STACK_LIMIT` | `256` | Maximum eval depth before a stack-overflow error |
//! | `REB_TRACE` | off | `1`/`on` traces everything, `N` traces to depth N |
//! | `REB_REBIND_BODIES` | `false` | Rebind passes also rewrite user-function bodies |
//! | `REB_WAIT_POLL_MS` | `10` | Device poll interval used by `wait` |
//!
//! A TOML file with the same field names may be loaded first; environment
//! variables override it.
//!
//! ```toml
//! stack_limit = 512
//! trace = 0
//! rebind_function_bodies = false
//! wait_poll_ms = 5
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Trace depth meaning "every depth"
pub const TRACE_ALL: u32 = u32::MAX;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse runtime config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of live frames
    pub stack_limit: usize,
    /// 0 = off, `TRACE_ALL` = unlimited, otherwise the deepest traced frame
    pub trace: u32,
    /// Let rebind passes descend into user-function bodies
    pub rebind_function_bodies: bool,
    /// Device poll interval for `wait`, in milliseconds
    pub wait_poll_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_limit: 256,
            trace: 0,
            rebind_function_bodies: false,
            wait_poll_ms: 10,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse a TOML document; missing fields keep their defaults
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Read an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(limit) = env_parse::<usize>("REB_STACK_LIMIT").filter(|&v| v > 0) {
            self.stack_limit = limit;
        }

        if let Ok(raw) = std::env::var("REB_TRACE") {
            match parse_trace(&raw) {
                Some(depth) => self.trace = depth,
                None => warn!("REB_TRACE='{}' not recognized, ignoring", raw),
            }
        }

        if let Ok(raw) = std::env::var("REB_REBIND_BODIES") {
            match raw.to_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.rebind_function_bodies = true,
                "0" | "false" | "off" | "no" => self.rebind_function_bodies = false,
                _ => warn!("REB_REBIND_BODIES='{}' not recognized, ignoring", raw),
            }
        }

        if let Some(ms) = env_parse::<u64>("REB_WAIT_POLL_MS").filter(|&v| v > 0) {
            self.wait_poll_ms = ms;
        }
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace > 0
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("{}='{}' is not a valid number, ignoring", name, raw);
            None
        }
    }
}

fn parse_trace(raw: &str) -> Option<u32> {
    match raw.to_lowercase().as_str() {
        "" | "0" | "off" | "false" => Some(0),
        "on" | "true" | "all" => Some(TRACE_ALL),
        n => n.parse().ok(),
    }
}
