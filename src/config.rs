//! Configuration-string parsing.
//!
//! The crate accepts a key=value query-style string at database creation;
//! today the only recognised key selects the default engine kind, but the
//! grammar tolerates (and ignores) unknown keys so the format can grow
//! without breaking existing callers.

use crate::types::EngineKind;

/// Parsed database-wide configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbConfig {
    pub default_engine: EngineKind,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            default_engine: EngineKind::Ivf,
        }
    }
}

impl DbConfig {
    /// Parse a `key=value&key=value` string. Unparseable or absent input
    /// falls back to the default (IVF); unknown keys are silently ignored.
    pub fn parse(s: &str) -> Self {
        let mut config = Self::default();
        for pair in s.split('&') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            if key.trim() == "engine" {
                if let Some(kind) = EngineKind::parse(value.trim()) {
                    config.default_engine = kind;
                }
            }
        }
        config
    }
}
